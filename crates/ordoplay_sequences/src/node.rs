// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequence nodes and the table that owns them.
//!
//! Nodes never own each other. Parent and children are [`NodeId`] links
//! into a [`NodeTable`], which is the only owner of node storage. All link
//! edits go through the table so that `parent` and `children` stay mirror
//! images of each other.

use crate::backing::{BackingRef, EditorialRef};
use crate::error::{IndexError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Unique identifier for a sequence node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural role of a node, derived from its position in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Root of a composition
    Master,
    /// Direct child of a master
    Sequence,
    /// Anything nested deeper
    Shot,
    /// Lost its parent when the parent's timeline vanished
    Detached,
}

impl NodeKind {
    /// Get display name for this kind
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeKind::Master => "Master Sequence",
            NodeKind::Sequence => "Sequence",
            NodeKind::Shot => "Shot",
            NodeKind::Detached => "Detached Sequence",
        }
    }
}

/// A single sequence in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceNode {
    /// Unique node ID
    pub id: NodeId,
    /// Timeline this node stands for
    pub backing: BackingRef,
    /// Clip in the parent timeline that embeds this one. `None` for roots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editorial: Option<EditorialRef>,
    parent: Option<NodeId>,
    #[serde(default)]
    children: Vec<NodeId>,
    /// Timeline of the parent this node lost during a prune
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detached_from: Option<BackingRef>,
}

impl SequenceNode {
    /// Create a parent-less node for a timeline
    pub fn new(backing: BackingRef) -> Self {
        Self {
            id: NodeId::new(),
            backing,
            editorial: None,
            parent: None,
            children: Vec::new(),
            detached_from: None,
        }
    }

    /// Parent node, if any
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in structural order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the node has at least one child
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether this node roots a composition
    pub fn is_root(&self) -> bool {
        self.parent.is_none() && self.detached_from.is_none()
    }

    /// Timeline of the pruned parent this node was cut from
    pub fn detached_from(&self) -> Option<BackingRef> {
        self.detached_from
    }

    pub(crate) fn retain_links(&mut self, keep: impl Fn(NodeId) -> bool) {
        self.parent = self.parent.filter(|p| keep(*p));
        self.children.retain(|c| keep(*c));
    }
}

/// Insertion-ordered arena of sequence nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTable {
    nodes: IndexMap<NodeId, SequenceNode>,
}

impl NodeTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Any links it carries are kept as-is
    pub fn insert(&mut self, node: SequenceNode) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&SequenceNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut SequenceNode> {
        self.nodes.get_mut(&id)
    }

    /// Get a node by insertion position
    pub fn get_index(&self, index: usize) -> Option<&SequenceNode> {
        self.nodes.get_index(index).map(|(_, node)| node)
    }

    /// Check if a node exists
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &SequenceNode> {
        self.nodes.values()
    }

    /// All node IDs in insertion order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Remove every node
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Remove a node, unlinking it from its parent and its children.
    ///
    /// Children keep existing and become parent-less. Order of the remaining
    /// nodes is preserved.
    pub fn remove(&mut self, id: NodeId) -> Option<SequenceNode> {
        let mut node = self.nodes.shift_remove(&id)?;
        if let Some(parent) = node.parent.take() {
            if let Some(parent) = self.nodes.get_mut(&parent) {
                parent.children.retain(|c| *c != id);
            }
        }
        for child in &node.children {
            if let Some(child) = self.nodes.get_mut(child) {
                if child.parent == Some(id) {
                    child.parent = None;
                }
            }
        }
        Some(node)
    }

    /// Whether `child` is currently linked under `parent`
    pub fn is_parent_of(&self, parent: NodeId, child: NodeId) -> bool {
        self.get(child).and_then(SequenceNode::parent) == Some(parent)
            && self.get(parent).is_some_and(|p| p.children.contains(&child))
    }

    /// Link `child` under `parent`, moving it away from any previous parent.
    ///
    /// The child is appended at the end of the parent's children unless it is
    /// already there. Returns false if either node is missing or the link
    /// would create a cycle.
    pub fn attach_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return false;
        }
        if self.ancestors(parent).contains(&child) {
            return false;
        }

        let previous = self.nodes.get(&child).and_then(|c| c.parent);
        if let Some(previous) = previous.filter(|p| *p != parent) {
            if let Some(previous) = self.nodes.get_mut(&previous) {
                previous.children.retain(|c| *c != child);
            }
        }

        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
            node.detached_from = None;
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            if !node.children.contains(&child) {
                node.children.push(child);
            }
        }
        true
    }

    /// Unlink one child. Grandchildren stay attached to the child
    pub fn detach_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(&parent) else {
            return false;
        };
        let before = node.children.len();
        node.children.retain(|c| *c != child);
        let removed = node.children.len() != before;

        if let Some(node) = self.nodes.get_mut(&child) {
            if node.parent == Some(parent) {
                node.parent = None;
            }
        }
        removed
    }

    /// Unlink every child of a node and return them in their former order
    pub fn detach_all_children(&mut self, parent: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get_mut(&parent) else {
            return Vec::new();
        };
        let children = std::mem::take(&mut node.children);
        for child in &children {
            if let Some(node) = self.nodes.get_mut(child) {
                if node.parent == Some(parent) {
                    node.parent = None;
                }
            }
        }
        children
    }

    pub(crate) fn mark_detached(&mut self, id: NodeId, from: BackingRef) {
        if let Some(node) = self.nodes.get_mut(&id) {
            if node.parent.is_none() {
                node.detached_from = Some(from);
            }
        }
    }

    /// Ancestors from the direct parent up to the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get(id).and_then(SequenceNode::parent);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            result.push(parent);
            current = self.get(parent).and_then(SequenceNode::parent);
        }
        result
    }

    /// Every node below `id`, depth-first pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut stack: Vec<NodeId> = self
            .get(id)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            result.push(next);
            if let Some(node) = self.get(next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        result
    }

    /// Distance to the top of the node's tree
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).len()
    }

    /// Structural kind of a node
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        let node = self.get(id)?;
        let ancestors = self.ancestors(id);
        let top_detached = match ancestors.last() {
            Some(top) => self.get(*top).is_some_and(|n| n.detached_from.is_some()),
            None => node.detached_from.is_some(),
        };
        if top_detached {
            return Some(NodeKind::Detached);
        }
        Some(match ancestors.len() {
            0 => NodeKind::Master,
            1 => NodeKind::Sequence,
            _ => NodeKind::Shot,
        })
    }

    /// Nodes without a parent, in insertion order
    pub fn roots(&self) -> impl Iterator<Item = &SequenceNode> {
        self.nodes.values().filter(|n| n.is_root())
    }

    /// Check that every link points at an existing node and is mirrored
    pub fn check_links(&self) -> std::result::Result<(), String> {
        for node in self.nodes.values() {
            if let Some(parent) = node.parent {
                let Some(parent_node) = self.nodes.get(&parent) else {
                    return Err(format!("{:?} points at missing parent {:?}", node.id, parent));
                };
                let count = parent_node.children.iter().filter(|c| **c == node.id).count();
                if count != 1 {
                    return Err(format!("{:?} listed {} times under {:?}", node.id, count, parent));
                }
            }
            for child in &node.children {
                match self.nodes.get(child) {
                    Some(child_node) if child_node.parent == Some(node.id) => {}
                    _ => return Err(format!("{:?} lists stray child {:?}", node.id, child)),
                }
            }
        }
        Ok(())
    }
}

/// Intent to create a sequence whose timeline does not exist yet.
///
/// Nothing is allocated until the draft is committed with a name through
/// [`crate::SequenceIndexer::create_sequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDraft {
    parent: Option<NodeId>,
}

impl NodeDraft {
    /// Draft a new master sequence
    pub fn root() -> Self {
        Self { parent: None }
    }

    /// Draft a new sequence under an existing node
    pub fn child_of(parent: NodeId) -> Self {
        Self { parent: Some(parent) }
    }

    /// Node the new sequence will be placed under
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// Check a user-supplied sequence name and return it trimmed
pub fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(IndexError::InvalidArgument("sequence name is empty".to_string()));
    }
    if trimmed.contains(['/', '\\']) {
        return Err(IndexError::InvalidArgument(format!(
            "sequence name {trimmed:?} contains a path separator"
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(count: usize) -> (NodeTable, Vec<NodeId>) {
        let mut table = NodeTable::new();
        let ids = (0..count)
            .map(|_| table.insert(SequenceNode::new(BackingRef::new())))
            .collect();
        (table, ids)
    }

    #[test]
    fn test_attach_keeps_links_symmetric() {
        let (mut table, ids) = table_with(3);
        assert!(table.attach_child(ids[0], ids[1]));
        assert!(table.attach_child(ids[0], ids[2]));
        assert!(table.attach_child(ids[0], ids[1]));

        assert_eq!(table.get(ids[0]).unwrap().children(), &[ids[1], ids[2]]);
        assert_eq!(table.get(ids[1]).unwrap().parent(), Some(ids[0]));
        assert!(table.check_links().is_ok());
    }

    #[test]
    fn test_attach_moves_from_previous_parent() {
        let (mut table, ids) = table_with(3);
        table.attach_child(ids[0], ids[2]);
        table.attach_child(ids[1], ids[2]);

        assert!(!table.get(ids[0]).unwrap().has_children());
        assert!(table.is_parent_of(ids[1], ids[2]));
        assert!(table.check_links().is_ok());
    }

    #[test]
    fn test_attach_refuses_cycles() {
        let (mut table, ids) = table_with(2);
        table.attach_child(ids[0], ids[1]);
        assert!(!table.attach_child(ids[1], ids[0]));
        assert!(!table.attach_child(ids[0], ids[0]));
    }

    #[test]
    fn test_detach_does_not_recurse() {
        let (mut table, ids) = table_with(3);
        table.attach_child(ids[0], ids[1]);
        table.attach_child(ids[1], ids[2]);

        assert!(table.detach_child(ids[0], ids[1]));
        assert_eq!(table.get(ids[1]).unwrap().parent(), None);
        assert!(table.is_parent_of(ids[1], ids[2]));
        assert!(!table.detach_child(ids[0], ids[1]));
    }

    #[test]
    fn test_detach_all_children() {
        let (mut table, ids) = table_with(3);
        table.attach_child(ids[0], ids[1]);
        table.attach_child(ids[0], ids[2]);

        assert_eq!(table.detach_all_children(ids[0]), vec![ids[1], ids[2]]);
        assert!(table.get(ids[1]).unwrap().is_root());
        assert!(table.check_links().is_ok());
    }

    #[test]
    fn test_kind_follows_depth() {
        let (mut table, ids) = table_with(4);
        table.attach_child(ids[0], ids[1]);
        table.attach_child(ids[1], ids[2]);
        table.attach_child(ids[2], ids[3]);

        assert_eq!(table.kind(ids[0]), Some(NodeKind::Master));
        assert_eq!(table.kind(ids[1]), Some(NodeKind::Sequence));
        assert_eq!(table.kind(ids[2]), Some(NodeKind::Shot));
        assert_eq!(table.kind(ids[3]), Some(NodeKind::Shot));
        assert_eq!(table.depth(ids[3]), 3);
    }

    #[test]
    fn test_remove_unlinks_both_sides() {
        let (mut table, ids) = table_with(3);
        table.attach_child(ids[0], ids[1]);
        table.attach_child(ids[1], ids[2]);

        let removed = table.remove(ids[1]).unwrap();
        assert_eq!(removed.children(), &[ids[2]]);
        assert!(!table.get(ids[0]).unwrap().has_children());
        assert_eq!(table.get(ids[2]).unwrap().parent(), None);
        assert!(table.check_links().is_ok());

        table.mark_detached(ids[2], removed.backing);
        assert_eq!(table.kind(ids[2]), Some(NodeKind::Detached));
        assert!(!table.get(ids[2]).unwrap().is_root());
    }

    #[test]
    fn test_descendants_pre_order() {
        let (mut table, ids) = table_with(5);
        table.attach_child(ids[0], ids[1]);
        table.attach_child(ids[1], ids[2]);
        table.attach_child(ids[0], ids[3]);
        table.attach_child(ids[3], ids[4]);

        assert_eq!(table.descendants(ids[0]), vec![ids[1], ids[2], ids[3], ids[4]]);
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Shot 010 ").unwrap(), "Shot 010");
        assert!(validate_name("   ").is_err());
        assert!(validate_name("a/b").is_err());
    }
}
