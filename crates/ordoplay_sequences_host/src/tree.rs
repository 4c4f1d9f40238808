// SPDX-License-Identifier: MIT OR Apache-2.0
//! Text and JSON renderings of the sequence hierarchy.

use ordoplay_sequences::{BackingStore, NodeId, SequenceIndexer};
use serde::Serialize;
use std::fmt::Write as _;

/// One node of the rendered tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// Node ID
    pub id: String,
    /// Timeline ID
    pub timeline: String,
    /// Timeline name, `None` when the timeline is gone
    pub name: Option<String>,
    /// Structural kind
    pub kind: String,
    /// Validity flag labels, empty when valid
    pub flags: Vec<&'static str>,
    /// Children in structural order
    pub children: Vec<TreeNode>,
}

/// Whole hierarchy: compositions first, then detached subtrees
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tree {
    /// Rooted compositions
    pub roots: Vec<TreeNode>,
    /// Subtrees cut from a pruned parent
    pub detached: Vec<TreeNode>,
}

fn build_node<S: BackingStore + ?Sized>(
    indexer: &SequenceIndexer,
    store: &S,
    id: NodeId,
) -> Option<TreeNode> {
    let index = indexer.index();
    let node = index.node(id)?;
    let kind = index
        .kind(id)
        .map(|k| k.display_name())
        .unwrap_or("Sequence");
    Some(TreeNode {
        id: node.id.0.to_string(),
        timeline: node.backing.to_string(),
        name: store.name(node.backing),
        kind: kind.to_string(),
        flags: indexer.validity(id).labels(),
        children: node
            .children()
            .iter()
            .filter_map(|child| build_node(indexer, store, *child))
            .collect(),
    })
}

/// Snapshot the hierarchy for rendering
pub fn build_tree<S: BackingStore + ?Sized>(indexer: &SequenceIndexer, store: &S) -> Tree {
    let index = indexer.index();
    Tree {
        roots: index
            .roots()
            .filter_map(|n| build_node(indexer, store, n.id))
            .collect(),
        detached: index
            .detached()
            .filter_map(|n| build_node(indexer, store, n.id))
            .collect(),
    }
}

fn write_node(out: &mut String, node: &TreeNode, depth: usize) {
    let name = node.name.as_deref().unwrap_or("<missing>");
    let _ = write!(out, "{}{} [{}]", "  ".repeat(depth), name, node.kind);
    if !node.flags.is_empty() {
        let _ = write!(out, " ({})", node.flags.join(", "));
    }
    out.push('\n');
    for child in &node.children {
        write_node(out, child, depth + 1);
    }
}

/// Indented text listing
pub fn render_text(tree: &Tree) -> String {
    let mut out = String::new();
    if tree.roots.is_empty() && tree.detached.is_empty() {
        out.push_str("No sequences.\n");
        return out;
    }
    for root in &tree.roots {
        write_node(&mut out, root, 0);
    }
    if !tree.detached.is_empty() {
        out.push_str("Detached:\n");
        for node in &tree.detached {
            write_node(&mut out, node, 1);
        }
    }
    out
}

/// Pretty-printed JSON
pub fn render_json(tree: &Tree) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(tree)
}
