// SPDX-License-Identifier: MIT OR Apache-2.0
//! The sequence index: the node arena plus the backing-ref lookup.
//!
//! Nodes go through two states. `get_or_create` stages a node: it is in the
//! arena and can be linked, but lookups and listings do not see it and it is
//! never persisted. `register` publishes it. A traversal discards whatever it
//! staged and did not register.
//!
//! Every mutation persists the registered nodes to the cache file (when one
//! is configured) before emitting its event, so subscribers re-querying the
//! index from a callback observe the committed state.

use crate::backing::{BackingRef, BackingStore};
use crate::cache::CacheFile;
use crate::error::CacheError;
use crate::events::{EventBus, IndexEvent};
use crate::node::{NodeId, NodeKind, NodeTable, SequenceNode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "SequenceIndex")]
struct IndexSnapshot {
    nodes: Vec<SequenceNode>,
}

/// Registry of every known sequence node
#[derive(Debug, Default)]
pub struct SequenceIndex {
    table: NodeTable,
    staged: HashSet<NodeId>,
    by_backing: HashMap<BackingRef, NodeId>,
    cache: Option<CacheFile>,
    bus: EventBus<IndexEvent>,
}

impl SequenceIndex {
    /// Create an index that only lives in memory
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create an index persisted to `cache`
    pub fn with_cache(cache: CacheFile) -> Self {
        Self {
            cache: Some(cache),
            ..Self::default()
        }
    }

    /// Event bus notified of every committed change
    pub fn bus(&self) -> &EventBus<IndexEvent> {
        &self.bus
    }

    /// Cache file, if persistence is enabled
    pub fn cache(&self) -> Option<&CacheFile> {
        self.cache.as_ref()
    }

    /// Raw arena, including staged nodes
    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut NodeTable {
        &mut self.table
    }

    /// Node for `backing`, creating a staged one on first request.
    ///
    /// Asking twice for the same timeline returns the same node.
    pub fn get_or_create(&mut self, backing: BackingRef) -> NodeId {
        if let Some(id) = self.by_backing.get(&backing) {
            return *id;
        }
        let id = self.table.insert(SequenceNode::new(backing));
        self.staged.insert(id);
        self.by_backing.insert(backing, id);
        id
    }

    /// Registered node for `backing`
    pub fn find(&self, backing: BackingRef) -> Option<NodeId> {
        self.by_backing
            .get(&backing)
            .copied()
            .filter(|id| !self.staged.contains(id))
    }

    /// Staged or registered node for `backing`
    pub(crate) fn lookup(&self, backing: BackingRef) -> Option<NodeId> {
        self.by_backing.get(&backing).copied()
    }

    /// Registered node by ID
    pub fn node(&self, id: NodeId) -> Option<&SequenceNode> {
        if self.staged.contains(&id) {
            return None;
        }
        self.table.get(id)
    }

    /// Whether `id` is a registered node
    pub fn is_registered(&self, id: NodeId) -> bool {
        self.table.contains(id) && !self.staged.contains(&id)
    }

    /// Registered nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &SequenceNode> {
        self.table.iter().filter(|n| !self.staged.contains(&n.id))
    }

    /// Registered roots in insertion order
    pub fn roots(&self) -> impl Iterator<Item = &SequenceNode> {
        self.table.roots().filter(|n| !self.staged.contains(&n.id))
    }

    /// Registered nodes cut from a pruned parent
    pub fn detached(&self) -> impl Iterator<Item = &SequenceNode> {
        self.nodes()
            .filter(|n| n.parent().is_none() && n.detached_from().is_some())
    }

    /// Structural kind of a node
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.table.kind(id)
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.table.len() - self.staged.len()
    }

    /// Whether no node is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of staged nodes
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Publish a staged node. Returns false if it was not staged
    pub fn register(&mut self, id: NodeId) -> bool {
        if !self.staged.remove(&id) {
            return false;
        }
        self.persist();
        self.bus.emit(IndexEvent::Registered(id));
        true
    }

    /// Announce a change to a registered node. Returns false if it is not registered
    pub fn update(&mut self, id: NodeId) -> bool {
        if !self.is_registered(id) {
            return false;
        }
        self.persist();
        self.bus.emit(IndexEvent::Updated(id));
        true
    }

    /// Drop every staged node. Returns how many were dropped
    pub fn discard_staged(&mut self) -> usize {
        let staged: Vec<NodeId> = self.staged.drain().collect();
        for id in &staged {
            if let Some(node) = self.table.remove(*id) {
                self.by_backing.remove(&node.backing);
            }
        }
        staged.len()
    }

    /// Remove every registered node whose timeline no longer resolves.
    ///
    /// Walks the arena in reverse insertion order so removals never shift
    /// positions still to be visited. Children of a removed node are kept
    /// and marked as cut from it. Emits a single [`IndexEvent::Removed`]
    /// when anything was removed, and returns the count.
    pub fn prune<S: BackingStore + ?Sized>(&mut self, store: &S) -> usize {
        let mut removed = 0;
        let mut position = self.table.len();
        while position > 0 {
            position -= 1;
            let Some(node) = self.table.get_index(position) else {
                continue;
            };
            if store.resolves(node.backing) {
                continue;
            }

            let id = node.id;
            let was_staged = self.staged.remove(&id);
            let Some(node) = self.table.remove(id) else {
                continue;
            };
            self.by_backing.remove(&node.backing);
            for child in node.children() {
                self.table.mark_detached(*child, node.backing);
            }
            if !was_staged {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!("Pruned {} sequence nodes", removed);
            self.persist();
            self.bus.emit(IndexEvent::Removed);
        }
        removed
    }

    /// Remove registered nodes with one [`IndexEvent::Removed`].
    ///
    /// Links to and from them are cut. Unregistered IDs are skipped.
    pub fn remove_nodes(&mut self, ids: &[NodeId]) -> usize {
        let mut removed = 0;
        for id in ids {
            if !self.is_registered(*id) {
                continue;
            }
            if let Some(node) = self.table.remove(*id) {
                self.by_backing.remove(&node.backing);
                removed += 1;
            }
        }
        if removed > 0 {
            self.persist();
            self.bus.emit(IndexEvent::Removed);
        }
        removed
    }

    /// Remove a node and everything below it with one [`IndexEvent::Removed`]
    pub fn remove_subtree(&mut self, id: NodeId) -> usize {
        if !self.is_registered(id) {
            return 0;
        }
        let mut doomed = vec![id];
        doomed.extend(self.table.descendants(id));

        for node_id in doomed.iter().rev() {
            self.staged.remove(node_id);
            if let Some(node) = self.table.remove(*node_id) {
                self.by_backing.remove(&node.backing);
            }
        }

        self.persist();
        self.bus.emit(IndexEvent::Removed);
        doomed.len()
    }

    /// Empty the index and persist the empty state
    pub fn clear(&mut self) {
        self.unload();
        self.persist();
    }

    /// Empty the in-memory state without touching the cache file
    pub fn unload(&mut self) {
        self.table.clear();
        self.staged.clear();
        self.by_backing.clear();
    }

    /// Write the registered nodes to the cache file.
    ///
    /// Failures are logged and otherwise ignored: the cache can always be
    /// rebuilt from the backing store.
    pub fn persist(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.save(&self.snapshot()) {
            tracing::warn!("Failed to write sequence cache {:?}: {}", cache.path(), e);
        }
    }

    /// Replace the in-memory state with the cache file content.
    ///
    /// Returns false, leaving the index empty, when there is no cache or it
    /// cannot be trusted.
    pub fn load_cache(&mut self) -> bool {
        self.unload();
        let Some(cache) = &self.cache else {
            return false;
        };
        if !cache.exists() {
            return false;
        }

        let restored = cache
            .load::<IndexSnapshot>()
            .and_then(Self::restore);
        match restored {
            Ok((table, by_backing)) => {
                tracing::info!("Loaded {} sequence nodes from {:?}", table.len(), cache.path());
                self.table = table;
                self.by_backing = by_backing;
                true
            }
            Err(e) => {
                tracing::warn!("Ignoring sequence cache {:?}: {}", cache.path(), e);
                false
            }
        }
    }

    fn snapshot(&self) -> IndexSnapshot {
        let nodes = self
            .nodes()
            .map(|node| {
                let mut node = node.clone();
                node.retain_links(|link| self.is_registered(link));
                node
            })
            .collect();
        IndexSnapshot { nodes }
    }

    fn restore(
        snapshot: IndexSnapshot,
    ) -> Result<(NodeTable, HashMap<BackingRef, NodeId>), CacheError> {
        let mut table = NodeTable::new();
        let mut by_backing = HashMap::with_capacity(snapshot.nodes.len());
        for node in snapshot.nodes {
            if by_backing.insert(node.backing, node.id).is_some() {
                return Err(CacheError::Inconsistent(format!(
                    "timeline {} is indexed twice",
                    node.backing
                )));
            }
            if table.contains(node.id) {
                return Err(CacheError::Inconsistent(format!(
                    "node {:?} appears twice",
                    node.id
                )));
            }
            table.insert(node);
        }
        table.check_links().map_err(CacheError::Inconsistent)?;
        Ok((table, by_backing))
    }
}
