// SPDX-License-Identifier: MIT OR Apache-2.0
//! User edits on the hierarchy.
//!
//! Each edit is checked against the node's current [`EditionStatus`],
//! applied to the timelines through [`SequenceAuthoring`], and then folded
//! back into the index the same way an asset import would be.

use crate::backing::{BackingRef, BackingStore};
use crate::error::{AuthoringError, IndexError, Result};
use crate::indexer::SequenceIndexer;
use crate::node::{validate_name, NodeDraft, NodeId};
use crate::validity::{compute_validity, EditAction, EditionStatus};

/// Write access to timelines
pub trait SequenceAuthoring: BackingStore {
    /// Create a timeline. With a parent, also place an editorial clip
    /// playing it in the parent; without one, give it an editorial track
    /// so it roots a new composition.
    fn create_timeline(
        &mut self,
        name: &str,
        parent: Option<BackingRef>,
    ) -> std::result::Result<BackingRef, AuthoringError>;

    /// Rename a timeline
    fn rename_timeline(
        &mut self,
        backing: BackingRef,
        name: &str,
    ) -> std::result::Result<(), AuthoringError>;

    /// Delete a timeline
    fn delete_timeline(&mut self, backing: BackingRef) -> std::result::Result<(), AuthoringError>;
}

impl SequenceIndexer {
    fn require<S>(&self, store: &S, id: NodeId, action: EditAction) -> Result<BackingRef>
    where
        S: BackingStore + ?Sized,
    {
        let node = self.index.node(id).ok_or(IndexError::UnknownNode(id))?;
        let validity = compute_validity(&self.index, store, self.scene.as_ref(), id);
        if !EditionStatus::from_validity(validity).allows(action) {
            return Err(IndexError::NotPermitted { action, node: id });
        }
        Ok(node.backing)
    }

    /// Rename the timeline behind a node
    pub fn rename_sequence<S>(&mut self, store: &mut S, id: NodeId, name: &str) -> Result<()>
    where
        S: SequenceAuthoring + ?Sized,
    {
        let name = validate_name(name)?;
        let backing = self.require(&*store, id, EditAction::Rename)?;
        store.rename_timeline(backing, name)?;
        tracing::info!("Renamed sequence {:?} to '{}'", id, name);
        self.index.update(id);
        Ok(())
    }

    /// Delete a node's timeline and every timeline below it.
    ///
    /// Returns the number of nodes that left the index.
    pub fn delete_sequence<S>(&mut self, store: &mut S, id: NodeId) -> Result<usize>
    where
        S: SequenceAuthoring + ?Sized,
    {
        self.require(&*store, id, EditAction::Delete)?;

        let mut doomed = vec![id];
        doomed.extend(self.index.table().descendants(id));
        for node_id in doomed.iter().rev() {
            let Some(backing) = self.index.node(*node_id).map(|n| n.backing) else {
                continue;
            };
            if store.resolves(backing) {
                store.delete_timeline(backing)?;
            }
        }

        let removed = self.prune(&*store);
        tracing::info!("Deleted sequence {:?} ({} nodes)", id, removed);
        Ok(removed)
    }

    /// Commit a draft: create its timeline and index it.
    pub fn create_sequence<S>(&mut self, store: &mut S, draft: NodeDraft, name: &str) -> Result<NodeId>
    where
        S: SequenceAuthoring + ?Sized,
    {
        let name = validate_name(name)?;
        let parent = match draft.parent() {
            Some(parent) => Some(self.require(&*store, parent, EditAction::Create)?),
            None => None,
        };

        let backing = store.create_timeline(name, parent)?;
        self.traverse_and_process(&*store, parent.unwrap_or(backing));

        self.index.find(backing).ok_or_else(|| {
            IndexError::Authoring(AuthoringError::Other(format!(
                "created timeline '{name}' was not picked up by the index"
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::SharedScene;
    use crate::events::IndexEvent;
    use crate::indexer::{AssetChanges, IndexerConfig};
    use crate::memory_store::MemoryStore;
    use crate::validity::Validity;

    fn ready(store: &mut MemoryStore) -> SequenceIndexer {
        let mut indexer = SequenceIndexer::new(IndexerConfig::in_memory());
        indexer.ensure_initialized(store);
        indexer
    }

    #[test]
    fn test_create_master_then_child() {
        let mut store = MemoryStore::new();
        let mut indexer = ready(&mut store);

        let master = indexer
            .create_sequence(&mut store, NodeDraft::root(), "Film")
            .unwrap();
        let child = indexer
            .create_sequence(&mut store, NodeDraft::child_of(master), " Sequence 1 ")
            .unwrap();

        let node = indexer.index().node(child).unwrap();
        assert_eq!(node.parent(), Some(master));
        assert!(node.editorial.is_some());
        assert_eq!(store.name(node.backing).as_deref(), Some("Sequence 1"));
    }

    #[test]
    fn test_create_rejects_bad_names_and_unknown_parent() {
        let mut store = MemoryStore::new();
        let mut indexer = ready(&mut store);

        assert!(matches!(
            indexer.create_sequence(&mut store, NodeDraft::root(), "  "),
            Err(IndexError::InvalidArgument(_))
        ));
        assert!(matches!(
            indexer.create_sequence(&mut store, NodeDraft::child_of(NodeId::new()), "Shot"),
            Err(IndexError::UnknownNode(_))
        ));
        assert_eq!(store.timeline_count(), 0);
    }

    #[test]
    fn test_rename_emits_update() {
        let mut store = MemoryStore::new();
        let mut indexer = ready(&mut store);
        let id = indexer
            .create_sequence(&mut store, NodeDraft::root(), "Film")
            .unwrap();
        let events = indexer.bus().poll();
        assert!(events.contains(&IndexEvent::Registered(id)));

        indexer.rename_sequence(&mut store, id, "Feature").unwrap();
        let backing = indexer.index().node(id).unwrap().backing;
        assert_eq!(store.name(backing).as_deref(), Some("Feature"));
        assert_eq!(indexer.bus().poll(), vec![IndexEvent::Updated(id)]);
    }

    #[test]
    fn test_delete_removes_subtree() {
        let mut store = MemoryStore::new();
        let mut indexer = ready(&mut store);
        let film = indexer
            .create_sequence(&mut store, NodeDraft::root(), "Film")
            .unwrap();
        let seq = indexer
            .create_sequence(&mut store, NodeDraft::child_of(film), "Sequence")
            .unwrap();
        indexer
            .create_sequence(&mut store, NodeDraft::child_of(seq), "Shot")
            .unwrap();

        assert_eq!(indexer.delete_sequence(&mut store, seq).unwrap(), 2);
        assert_eq!(indexer.index().len(), 1);
        assert_eq!(store.timeline_count(), 1);
    }

    #[test]
    fn test_invalid_node_cannot_get_children() {
        let mut store = MemoryStore::new();
        let scene = SharedScene::new();
        let mut indexer = SequenceIndexer::new(IndexerConfig::in_memory().with_scene(scene));
        indexer.ensure_initialized(&mut store);

        let film = indexer
            .create_sequence(&mut store, NodeDraft::root(), "Film")
            .unwrap();
        assert_eq!(indexer.validity(film), Validity::MISSING_GAME_REPRESENTATION);

        let err = indexer
            .create_sequence(&mut store, NodeDraft::child_of(film), "Shot")
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::NotPermitted { action: EditAction::Create, .. }
        ));
        assert!(matches!(
            indexer.rename_sequence(&mut store, film, "Renamed"),
            Err(IndexError::NotPermitted { action: EditAction::Rename, .. })
        ));
        assert_eq!(indexer.delete_sequence(&mut store, film).unwrap(), 1);
    }

    #[test]
    fn test_orphan_cannot_be_renamed_or_deleted() {
        let mut store = MemoryStore::new();
        let mut indexer = ready(&mut store);
        let film = indexer
            .create_sequence(&mut store, NodeDraft::root(), "Film")
            .unwrap();
        let seq = indexer
            .create_sequence(&mut store, NodeDraft::child_of(film), "Sequence")
            .unwrap();
        let shot = indexer
            .create_sequence(&mut store, NodeDraft::child_of(seq), "Shot")
            .unwrap();

        let seq_backing = indexer.index().node(seq).unwrap().backing;
        store.remove_timeline(seq_backing);
        indexer.on_assets_changed(
            &store,
            &AssetChanges {
                deleted: vec![seq_backing],
                ..AssetChanges::default()
            },
        );
        assert_eq!(indexer.validity(shot), Validity::ORPHAN);

        assert!(matches!(
            indexer.rename_sequence(&mut store, shot, "Renamed"),
            Err(IndexError::NotPermitted { action: EditAction::Rename, .. })
        ));
        assert!(matches!(
            indexer.delete_sequence(&mut store, shot),
            Err(IndexError::NotPermitted { action: EditAction::Delete, .. })
        ));
        assert!(indexer.index().node(shot).is_some());
    }
}
