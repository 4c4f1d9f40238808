// SPDX-License-Identifier: MIT OR Apache-2.0
//! Indexer facade: lifecycle, batch entry points and validity upkeep.

use crate::backing::{AssumeInstantiated, BackingRef, BackingStore, EditorialRef, SceneProbe};
use crate::cache::{CacheFile, SEQUENCE_CACHE_FILE_NAME};
use crate::events::{EventBus, IndexEvent};
use crate::index::SequenceIndex;
use crate::legacy::{repair_legacy_editorial_links, LegacyLayout, LegacyRepair, NoLegacyLayouts};
use crate::master::MasterSequence;
use crate::node::NodeId;
use crate::traversal::{reconcile, traverse, ReconcileReport};
use crate::validity::{EditionStatus, Validity, ValidityEngine};
use std::fmt;
use std::path::Path;

/// How an indexer persists and which collaborators it consults
pub struct IndexerConfig {
    /// Hierarchy cache file. `None` keeps the index in memory only
    pub cache: Option<CacheFile>,
    /// Old-format composition detection
    pub legacy: Box<dyn LegacyLayout>,
    /// Scene-side instantiation checks
    pub scene: Box<dyn SceneProbe>,
}

impl IndexerConfig {
    /// In-memory index with no legacy layouts and no scene
    pub fn in_memory() -> Self {
        Self {
            cache: None,
            legacy: Box::new(NoLegacyLayouts),
            scene: Box::new(AssumeInstantiated),
        }
    }

    /// Index cached at `<project>/Library/SequenceCache.index`
    pub fn for_project(project_dir: &Path) -> Self {
        Self {
            cache: Some(CacheFile::in_project(project_dir, SEQUENCE_CACHE_FILE_NAME)),
            ..Self::in_memory()
        }
    }

    /// Replace the legacy layout predicate
    pub fn with_legacy(mut self, legacy: impl LegacyLayout + 'static) -> Self {
        self.legacy = Box::new(legacy);
        self
    }

    /// Replace the scene probe
    pub fn with_scene(mut self, scene: impl SceneProbe + 'static) -> Self {
        self.scene = Box::new(scene);
        self
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl fmt::Debug for IndexerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexerConfig")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Batch of asset-database changes delivered by the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetChanges {
    /// Timelines created or re-imported
    pub imported: Vec<BackingRef>,
    /// Timelines whose path changed
    pub moved: Vec<BackingRef>,
    /// Timelines deleted
    pub deleted: Vec<BackingRef>,
}

impl AssetChanges {
    /// Whether the batch carries nothing
    pub fn is_empty(&self) -> bool {
        self.imported.is_empty() && self.moved.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Ready,
}

/// Maintains the sequence hierarchy of one project
pub struct SequenceIndexer {
    pub(crate) index: SequenceIndex,
    pub(crate) validity: ValidityEngine,
    legacy: Box<dyn LegacyLayout>,
    pub(crate) scene: Box<dyn SceneProbe>,
    lifecycle: Lifecycle,
}

impl fmt::Debug for SequenceIndexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceIndexer")
            .field("nodes", &self.index.len())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl SequenceIndexer {
    /// Create an uninitialized indexer
    pub fn new(config: IndexerConfig) -> Self {
        let index = match config.cache {
            Some(cache) => SequenceIndex::with_cache(cache),
            None => SequenceIndex::in_memory(),
        };
        Self {
            index,
            validity: ValidityEngine::new(),
            legacy: config.legacy,
            scene: config.scene,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    /// The underlying index
    pub fn index(&self) -> &SequenceIndex {
        &self.index
    }

    /// Event bus for index changes
    pub fn bus(&self) -> &EventBus<IndexEvent> {
        self.index.bus()
    }

    /// Whether the index has been loaded or built
    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    /// Load the index on first use.
    ///
    /// A trustworthy cache is loaded and pruned against the store. Anything
    /// else triggers a full scan. Returns true if the cache was used.
    pub fn ensure_initialized<S>(&mut self, store: &mut S) -> bool
    where
        S: LegacyRepair + ?Sized,
    {
        if self.is_initialized() {
            return false;
        }

        if self.index.load_cache() {
            self.lifecycle = Lifecycle::Ready;
            self.index.prune(&*store);
            self.recompute_validity(&*store);
            true
        } else {
            self.initialize_with_existing_data(store);
            false
        }
    }

    /// Build the index from scratch by scanning every timeline.
    ///
    /// Legacy editorial links are repaired first. Structural events are
    /// suppressed for the scan, then one [`IndexEvent::Initialized`] is
    /// emitted followed by a validity pass.
    pub fn initialize_with_existing_data<S>(&mut self, store: &mut S) -> ReconcileReport
    where
        S: LegacyRepair + ?Sized,
    {
        repair_legacy_editorial_links(store);

        let mut report = ReconcileReport::default();
        {
            let _quiet = self.index.bus().suppress();
            for timeline in store.timelines() {
                report.merge(self.process(&*store, timeline));
            }
        }
        tracing::info!(
            "Sequence index initialized: {} nodes, {} roots",
            self.index.len(),
            self.index.roots().count()
        );

        self.lifecycle = Lifecycle::Ready;
        self.index.bus().emit(IndexEvent::Initialized);
        self.recompute_validity(&*store);
        report
    }

    /// Throw the index away and scan again
    pub fn rebuild<S>(&mut self, store: &mut S) -> ReconcileReport
    where
        S: LegacyRepair + ?Sized,
    {
        self.index.clear();
        self.validity.clear();
        self.initialize_with_existing_data(store)
    }

    /// Persist the index and release in-memory state. The next
    /// [`ensure_initialized`](Self::ensure_initialized) reloads it.
    pub fn teardown(&mut self) {
        if !self.is_initialized() {
            return;
        }
        self.index.persist();
        self.index.unload();
        self.validity.clear();
        self.lifecycle = Lifecycle::Uninitialized;
        tracing::debug!("Sequence indexer torn down");
    }

    /// Traverse from one timeline, reconcile, then recompute validity
    pub fn traverse_and_process<S>(&mut self, store: &S, root: BackingRef) -> ReconcileReport
    where
        S: BackingStore + ?Sized,
    {
        let report = self.process(store, root);
        self.recompute_validity(store);
        report
    }

    /// React to one batch of asset-database changes
    pub fn on_assets_changed<S>(&mut self, store: &S, changes: &AssetChanges) -> ReconcileReport
    where
        S: BackingStore + ?Sized,
    {
        let mut report = ReconcileReport::default();
        if changes.is_empty() {
            return report;
        }

        for timeline in changes.imported.iter().chain(&changes.moved) {
            if !store.resolves(*timeline) {
                continue;
            }
            report.merge(self.process(store, *timeline));
            if self.index.find(*timeline).is_none() {
                // A leaf only enters the index through its parent's clips
                for owner in self.referrers(store, *timeline) {
                    report.merge(self.process(store, owner));
                }
            }
        }
        if !changes.deleted.is_empty() {
            self.index.prune(store);
        }
        self.recompute_validity(store);
        report
    }

    /// React to master sequence assets appearing or changing.
    ///
    /// Installs `legacy` as the new legacy predicate, repairs the editorial
    /// links of old-format masters, then walks every master's root timeline
    /// so repaired clips and trackless legacy roots enter the index.
    pub fn on_masters_changed<S>(
        &mut self,
        store: &mut S,
        legacy: impl LegacyLayout + 'static,
    ) -> ReconcileReport
    where
        S: LegacyRepair + ?Sized,
    {
        self.legacy = Box::new(legacy);
        if !self.is_initialized() {
            return ReconcileReport::default();
        }

        let repaired = repair_legacy_editorial_links(store);
        if repaired > 0 {
            tracing::info!("Repaired {} legacy editorial links", repaired);
        }

        let mut report = ReconcileReport::default();
        let roots: Vec<BackingRef> = store
            .master_sequences()
            .iter()
            .filter_map(MasterSequence::root_timeline)
            .collect();
        for root in roots {
            if store.resolves(root) {
                report.merge(self.process(&*store, root));
            }
        }
        self.recompute_validity(&*store);
        report
    }

    /// Remove nodes whose timelines are gone, then recompute validity
    pub fn prune<S>(&mut self, store: &S) -> usize
    where
        S: BackingStore + ?Sized,
    {
        let removed = self.index.prune(store);
        self.recompute_validity(store);
        removed
    }

    /// Periodic validity refresh, for scene changes the asset layer cannot see
    pub fn tick<S>(&mut self, store: &S) -> bool
    where
        S: BackingStore + ?Sized,
    {
        if !self.is_initialized() {
            return false;
        }
        self.recompute_validity(store)
    }

    /// Drop the subtree of a master sequence that is about to be deleted,
    /// then recompute validity
    pub fn detach_master<S>(&mut self, store: &S, master: &MasterSequence) -> usize
    where
        S: BackingStore + ?Sized,
    {
        let Some(id) = master.root_timeline().and_then(|t| self.index.find(t)) else {
            return 0;
        };
        let removed = self.index.remove_subtree(id);
        tracing::info!("Detached master sequence '{}' ({} nodes)", master.name, removed);
        self.recompute_validity(store);
        removed
    }

    /// Last computed validity of a node
    pub fn validity(&self, id: NodeId) -> Validity {
        self.validity.get(id)
    }

    /// Edits a node currently accepts
    pub fn edition_status(&self, id: NodeId) -> EditionStatus {
        self.validity.edition_status(id)
    }

    /// Number of nodes with at least one validity flag set
    pub fn invalid_count(&self) -> usize {
        self.validity.invalid_count()
    }

    fn referrers<S>(&self, store: &S, target: BackingRef) -> Vec<BackingRef>
    where
        S: BackingStore + ?Sized,
    {
        self.index
            .nodes()
            .map(|n| n.backing)
            .filter(|owner| {
                store.editorial_tracks(*owner).iter().any(|track| {
                    track.clips.iter().any(|clip| {
                        clip.is_compatible()
                            && store.editorial_target(&EditorialRef::new(*owner, clip.clip))
                                == Some(target)
                    })
                })
            })
            .collect()
    }

    fn process<S>(&mut self, store: &S, root: BackingRef) -> ReconcileReport
    where
        S: BackingStore + ?Sized,
    {
        let outcome = traverse(&mut self.index, store, self.legacy.as_ref(), root);
        if outcome.nodes.is_empty()
            && outcome.released.is_empty()
            && outcome.discarded.is_empty()
        {
            return ReconcileReport::default();
        }
        reconcile(&mut self.index, &outcome)
    }

    pub(crate) fn recompute_validity<S>(&mut self, store: &S) -> bool
    where
        S: BackingStore + ?Sized,
    {
        self.validity
            .recompute(&self.index, store, self.scene.as_ref())
    }
}
