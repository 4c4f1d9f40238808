// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hierarchy discovery: walking editorial tracks from a timeline and
//! reconciling what was found with the index.
//!
//! [`traverse`] only stages and links nodes. [`reconcile`] then registers
//! the new ones, announces the existing ones and drops leftovers, which is
//! what makes a second pass over an unchanged timeline emit updates only.

use crate::backing::{BackingRef, BackingStore, EditorialRef};
use crate::index::SequenceIndex;
use crate::legacy::LegacyLayout;
use crate::node::NodeId;
use std::collections::{HashSet, VecDeque};

/// Nodes touched by one traversal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalOutcome {
    /// Visited nodes, the entry point first, in discovery order
    pub nodes: Vec<NodeId>,
    /// Former children that no editorial clip claims anymore and that
    /// still root a composition on their own
    pub released: Vec<NodeId>,
    /// Former children that no editorial clip claims and that would not be
    /// indexed by a fresh scan
    pub discarded: Vec<NodeId>,
}

/// Counts of the events a reconciliation produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Nodes registered for the first time
    pub registered: usize,
    /// Already registered nodes announced as updated
    pub updated: usize,
    /// Released nodes dropped from the index
    pub removed: usize,
}

impl ReconcileReport {
    /// Add another report's counts to this one
    pub fn merge(&mut self, other: ReconcileReport) {
        self.registered += other.registered;
        self.updated += other.updated;
        self.removed += other.removed;
    }

    /// Whether nothing was registered, updated or removed
    pub fn is_empty(&self) -> bool {
        self.registered == 0 && self.updated == 0 && self.removed == 0
    }
}

struct Walker<'a, S: ?Sized> {
    index: &'a mut SequenceIndex,
    store: &'a S,
    legacy: &'a dyn LegacyLayout,
    path: Vec<BackingRef>,
    released: Vec<NodeId>,
}

impl<S: BackingStore + ?Sized> Walker<'_, S> {
    fn visit(&mut self, backing: BackingRef, parent: Option<NodeId>) -> Vec<NodeId> {
        if self.path.contains(&backing) {
            tracing::warn!("Editorial cycle through timeline {}, not descending", backing);
            return Vec::new();
        }
        if !self.store.resolves(backing) {
            return Vec::new();
        }

        let tracks = self.store.editorial_tracks(backing);
        let existing_parent = self
            .index
            .lookup(backing)
            .and_then(|id| self.index.table().get(id))
            .and_then(|node| node.parent());
        if tracks.is_empty()
            && parent.is_none()
            && existing_parent.is_none()
            && !self.legacy.is_legacy_root(backing)
        {
            return Vec::new();
        }

        let id = self.index.get_or_create(backing);
        if let Some(parent) = parent {
            if !self.index.table_mut().attach_child(parent, id) {
                tracing::warn!("Cannot link timeline {} under {:?}", backing, parent);
                return Vec::new();
            }
        }
        let previous_children = self.index.table_mut().detach_all_children(id);
        self.released.extend(previous_children);

        let mut found = vec![id];
        self.path.push(backing);
        for track in &tracks {
            for clip in track.clips.iter().filter(|c| c.is_compatible()) {
                let editorial = EditorialRef::new(backing, clip.clip);
                let Some(target) = self.store.editorial_target(&editorial) else {
                    continue;
                };

                let nested = self.visit(target, Some(id));
                let Some(child) = nested.first().copied() else {
                    continue;
                };
                let table = self.index.table_mut();
                if let Some(node) = table.get_mut(child) {
                    node.editorial = Some(editorial);
                }
                if !table.is_parent_of(id, child) {
                    table.attach_child(id, child);
                }
                found.extend(nested);
            }
        }
        self.path.pop();
        found
    }
}

/// Walk the editorial tracks below `root`, staging and linking one node per
/// reachable timeline.
///
/// A timeline without editorial tracks, parent or legacy layout does not
/// root a composition and is skipped without touching the index.
pub fn traverse<S>(
    index: &mut SequenceIndex,
    store: &S,
    legacy: &dyn LegacyLayout,
    root: BackingRef,
) -> TraversalOutcome
where
    S: BackingStore + ?Sized,
{
    let mut walker = Walker {
        index,
        store,
        legacy,
        path: Vec::new(),
        released: Vec::new(),
    };
    let nodes = walker.visit(root, None);

    let visited: HashSet<NodeId> = nodes.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut queue: VecDeque<NodeId> = walker.released.into();
    let table = walker.index.table_mut();
    let mut released = Vec::new();
    let mut discarded = Vec::new();
    while let Some(id) = queue.pop_front() {
        if visited.contains(&id) || !seen.insert(id) {
            continue;
        }
        let Some(node) = table.get_mut(id).filter(|n| n.parent().is_none()) else {
            continue;
        };
        node.editorial = None;
        let backing = node.backing;

        // Same rule as the discard check in `visit`: without a parent, only
        // editorial tracks or a legacy layout keep a timeline indexed
        if store.editorial_tracks(backing).is_empty() && !legacy.is_legacy_root(backing) {
            queue.extend(table.detach_all_children(id));
            discarded.push(id);
        } else {
            released.push(id);
        }
    }

    TraversalOutcome {
        nodes,
        released,
        discarded,
    }
}

/// Publish the result of a traversal.
///
/// Unregistered nodes are registered in discovery order, so a parent is
/// always announced before its children. Registered ones and released
/// children are announced as updated. Discarded children leave the index
/// with one removal, and staged nodes left over are dropped.
pub fn reconcile(index: &mut SequenceIndex, outcome: &TraversalOutcome) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let mut seen = HashSet::new();

    for id in outcome.nodes.iter().filter(|id| seen.insert(**id)) {
        if index.is_registered(*id) {
            if index.update(*id) {
                report.updated += 1;
            }
        } else if index.register(*id) {
            report.registered += 1;
        }
    }
    for id in outcome.released.iter().filter(|id| seen.insert(**id)) {
        if index.update(*id) {
            report.updated += 1;
        }
    }

    report.removed = index.remove_nodes(&outcome.discarded);

    let dropped = index.discard_staged();
    if dropped > 0 {
        tracing::debug!("Dropped {} staged nodes", dropped);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::ClipKind;
    use crate::legacy::NoLegacyLayouts;
    use crate::memory_store::MemoryStore;

    fn walk(index: &mut SequenceIndex, store: &MemoryStore, root: BackingRef) -> ReconcileReport {
        let outcome = traverse(index, store, &NoLegacyLayouts, root);
        reconcile(index, &outcome)
    }

    #[test]
    fn test_builds_nested_hierarchy() {
        let mut store = MemoryStore::new();
        let a = store.add_timeline("A");
        let b = store.add_timeline("B");
        let c = store.add_timeline("C");
        let ab = store.nest(a, b).unwrap();
        store.nest(b, c);

        let mut index = SequenceIndex::in_memory();
        let report = walk(&mut index, &store, a);
        assert_eq!(report.registered, 3);

        let (na, nb, nc) = (
            index.find(a).unwrap(),
            index.find(b).unwrap(),
            index.find(c).unwrap(),
        );
        assert_eq!(index.node(na).unwrap().children(), &[nb]);
        assert_eq!(index.node(nb).unwrap().children(), &[nc]);
        assert_eq!(index.node(nb).unwrap().editorial, Some(ab));
        assert_eq!(index.node(na).unwrap().editorial, None);
        assert!(index.table().check_links().is_ok());
    }

    #[test]
    fn test_timeline_without_editorial_tracks_is_skipped() {
        let mut store = MemoryStore::new();
        let lonely = store.add_timeline("Lonely");

        let mut index = SequenceIndex::in_memory();
        let outcome = traverse(&mut index, &store, &NoLegacyLayouts, lonely);
        assert!(outcome.nodes.is_empty());
        assert_eq!(index.table().len(), 0);
    }

    #[test]
    fn test_legacy_root_without_tracks_is_indexed() {
        let mut store = MemoryStore::new();
        let old = store.add_timeline("Old");

        let mut index = SequenceIndex::in_memory();
        let layout = move |b: BackingRef| b == old;
        let outcome = traverse(&mut index, &store, &layout, old);
        reconcile(&mut index, &outcome);
        assert!(index.find(old).is_some());
    }

    #[test]
    fn test_leaf_keeps_existing_parent_when_walked_alone() {
        let mut store = MemoryStore::new();
        let a = store.add_timeline("A");
        let b = store.add_timeline("B");
        store.nest(a, b);

        let mut index = SequenceIndex::in_memory();
        walk(&mut index, &store, a);
        let report = walk(&mut index, &store, b);

        assert_eq!(
            report,
            ReconcileReport {
                registered: 0,
                updated: 1,
                removed: 0
            }
        );
        let nb = index.find(b).unwrap();
        assert_eq!(index.node(nb).unwrap().parent(), index.find(a));
    }

    #[test]
    fn test_non_editorial_and_unset_clips_are_ignored() {
        let mut store = MemoryStore::new();
        let a = store.add_master_timeline("A");
        let audio = store.add_timeline("Audio");
        store.add_clip(a, ClipKind::Other, Some(audio));
        store.add_clip(a, ClipKind::Editorial, None);

        let mut index = SequenceIndex::in_memory();
        walk(&mut index, &store, a);
        assert_eq!(index.len(), 1);
        assert!(index.find(audio).is_none());
    }

    #[test]
    fn test_second_pass_only_updates() {
        let mut store = MemoryStore::new();
        let a = store.add_timeline("A");
        let b = store.add_timeline("B");
        store.nest(a, b);

        let mut index = SequenceIndex::in_memory();
        walk(&mut index, &store, a);
        let before: Vec<_> = index.nodes().cloned().collect();

        let report = walk(&mut index, &store, a);
        assert_eq!(
            report,
            ReconcileReport {
                registered: 0,
                updated: 2,
                removed: 0
            }
        );
        let after: Vec<_> = index.nodes().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_unclaimed_leaf_is_discarded() {
        let mut store = MemoryStore::new();
        let a = store.add_timeline("A");
        let b = store.add_timeline("B");
        let c = store.add_timeline("C");
        store.nest(a, b);
        let ac = store.nest(a, c).unwrap();

        let mut index = SequenceIndex::in_memory();
        walk(&mut index, &store, a);
        let nc = index.find(c).unwrap();
        store.remove_clip(&ac);

        let outcome = traverse(&mut index, &store, &NoLegacyLayouts, a);
        assert!(outcome.released.is_empty());
        assert_eq!(outcome.discarded, vec![nc]);
        let report = reconcile(&mut index, &outcome);

        assert_eq!(report.removed, 1);
        assert!(index.find(c).is_none());
        assert_eq!(index.node(index.find(a).unwrap()).unwrap().children().len(), 1);
        assert!(index.table().check_links().is_ok());
    }

    #[test]
    fn test_unclaimed_composition_becomes_root() {
        let mut store = MemoryStore::new();
        let a = store.add_timeline("A");
        let b = store.add_timeline("B");
        let shot = store.add_timeline("Shot");
        let ab = store.nest(a, b).unwrap();
        store.nest(b, shot);

        let mut index = SequenceIndex::in_memory();
        walk(&mut index, &store, a);
        store.remove_clip(&ab);

        let outcome = traverse(&mut index, &store, &NoLegacyLayouts, a);
        let nb = index.find(b).unwrap();
        assert_eq!(outcome.released, vec![nb]);
        reconcile(&mut index, &outcome);

        assert!(index.node(nb).unwrap().is_root());
        assert_eq!(index.node(nb).unwrap().editorial, None);
        assert_eq!(
            index.node(index.find(shot).unwrap()).unwrap().parent(),
            Some(nb)
        );
    }

    #[test]
    fn test_discarded_node_releases_its_children() {
        let mut store = MemoryStore::new();
        let a = store.add_timeline("A");
        let b = store.add_timeline("B");
        let c = store.add_timeline("C");
        let ab = store.nest(a, b).unwrap();
        store.nest(b, c);

        let mut index = SequenceIndex::in_memory();
        walk(&mut index, &store, a);
        // B loses its editorial track without anyone walking it
        store.clear_tracks(b);
        store.remove_clip(&ab);

        let report = walk(&mut index, &store, a);
        assert_eq!(report.removed, 2);
        assert_eq!(index.len(), 1);
        assert!(index.table().check_links().is_ok());
    }

    #[test]
    fn test_cycle_is_cut() {
        let mut store = MemoryStore::new();
        let a = store.add_timeline("A");
        let b = store.add_timeline("B");
        store.nest(a, b);
        store.nest(b, a);

        let mut index = SequenceIndex::in_memory();
        walk(&mut index, &store, a);
        assert_eq!(index.len(), 2);
        assert!(index.table().check_links().is_ok());
        assert_eq!(index.table().descendants(index.find(a).unwrap()).len(), 1);
    }

    #[test]
    fn test_reparenting_moves_child() {
        let mut store = MemoryStore::new();
        let a = store.add_timeline("A");
        let b = store.add_timeline("B");
        let shot = store.add_timeline("Shot");
        let a_shot = store.nest(a, shot).unwrap();
        store.add_editorial_track(b, "Sequences");

        let mut index = SequenceIndex::in_memory();
        walk(&mut index, &store, a);
        walk(&mut index, &store, b);

        store.remove_clip(&a_shot);
        let b_shot = store.nest(b, shot).unwrap();
        walk(&mut index, &store, b);

        let ns = index.find(shot).unwrap();
        assert_eq!(index.node(ns).unwrap().parent(), index.find(b));
        assert_eq!(index.node(ns).unwrap().editorial, Some(b_shot));
        assert!(!index.node(index.find(a).unwrap()).unwrap().has_children());
        assert!(index.table().check_links().is_ok());
    }
}
