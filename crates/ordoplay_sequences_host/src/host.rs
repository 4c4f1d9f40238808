// SPDX-License-Identifier: MIT OR Apache-2.0
//! Project host: owns the store and the indexer and drives them from the
//! main loop.

use crate::error::HostError;
use crate::file_watcher::{changed_paths, FileEvent, FileWatcher};
use crate::fs_store::FsStore;
use crate::project::HostSettings;
use ordoplay_sequences::cache::SEQUENCE_CACHE_FILE_NAME;
use ordoplay_sequences::{
    BackingRef, CacheFile, IndexError, IndexEvent, IndexerConfig, LegacyMasterTimelines,
    LegacyRepair, NodeDraft, NodeId, ReconcileReport, SequenceIndexer,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Pause between main-loop iterations in watch mode
const LOOP_SLEEP: Duration = Duration::from_millis(50);

/// A project opened for indexing
pub struct SequenceHost {
    project_dir: PathBuf,
    settings: HostSettings,
    store: FsStore,
    indexer: SequenceIndexer,
}

impl SequenceHost {
    /// Open a project and make sure its index is loaded
    pub fn open(project_dir: &Path) -> Result<Self, HostError> {
        if !project_dir.is_dir() {
            return Err(HostError::ProjectNotFound(project_dir.to_path_buf()));
        }
        let settings =
            HostSettings::load_or_default(project_dir).map_err(|source| HostError::Settings {
                path: HostSettings::path_in(project_dir),
                source,
            })?;

        let mut store = FsStore::open(settings.assets_path(project_dir))?;
        let legacy = LegacyMasterTimelines::from_masters(&store.master_sequences());
        if !legacy.is_empty() {
            tracing::info!("Project has {} legacy master sequences", legacy.len());
        }
        let config = IndexerConfig {
            cache: Some(CacheFile::new(
                settings
                    .library_path(project_dir)
                    .join(SEQUENCE_CACHE_FILE_NAME),
            )),
            ..IndexerConfig::in_memory()
        }
        .with_legacy(legacy);

        let mut indexer = SequenceIndexer::new(config);
        if indexer.ensure_initialized(&mut store) {
            tracing::info!("Sequence index loaded from cache");
        }

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            settings,
            store,
            indexer,
        })
    }

    /// Project root
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// The indexer
    pub fn indexer(&self) -> &SequenceIndexer {
        &self.indexer
    }

    /// The backing store
    pub fn store(&self) -> &FsStore {
        &self.store
    }

    /// Re-read every file and rebuild the index from scratch
    pub fn scan(&mut self) -> ReconcileReport {
        self.store.rescan();
        let report = self.indexer.rebuild(&mut self.store);
        self.log_events();
        report
    }

    /// Apply a batch of filesystem events
    pub fn handle_file_events(&mut self, events: &[FileEvent]) -> ReconcileReport {
        let paths = changed_paths(events);
        if paths.is_empty() {
            return ReconcileReport::default();
        }
        let changes = self.store.apply_paths(paths.iter().map(PathBuf::as_path));
        tracing::debug!(
            "Asset changes: {} imported, {} moved, {} deleted, masters changed: {}",
            changes.assets.imported.len(),
            changes.assets.moved.len(),
            changes.assets.deleted.len(),
            changes.masters_changed
        );

        let mut report = ReconcileReport::default();
        if changes.masters_changed {
            // Legacy masters may have appeared: repair their clips first
            let legacy = LegacyMasterTimelines::from_masters(&self.store.master_sequences());
            report.merge(self.indexer.on_masters_changed(&mut self.store, legacy));
        }
        report.merge(self.indexer.on_assets_changed(&self.store, &changes.assets));
        self.log_events();
        report
    }

    /// Periodic validity refresh
    pub fn tick(&mut self) -> bool {
        let changed = self.indexer.tick(&self.store);
        self.log_events();
        changed
    }

    /// Watch the assets directory until `should_stop` returns true
    pub fn watch(&mut self, should_stop: impl Fn() -> bool) -> Result<(), HostError> {
        let mut watcher = FileWatcher::new(self.settings.debounce())?;
        watcher.watch(self.store.root())?;

        let tick_interval = self.settings.tick_interval();
        let mut last_tick = Instant::now();
        while !should_stop() {
            let events = watcher.poll_events();
            if !events.is_empty() {
                let report = self.handle_file_events(&events);
                if !report.is_empty() {
                    tracing::info!(
                        "Index updated: {} registered, {} updated",
                        report.registered,
                        report.updated
                    );
                }
            }
            if last_tick.elapsed() >= tick_interval {
                self.tick();
                last_tick = Instant::now();
            }
            std::thread::sleep(LOOP_SLEEP);
        }
        Ok(())
    }

    fn node_for(&self, timeline: BackingRef) -> Result<NodeId, HostError> {
        self.indexer
            .index()
            .find(timeline)
            .ok_or(HostError::UnindexedTimeline(timeline))
    }

    /// Create a sequence, nested under `parent` or as a new master
    pub fn create(
        &mut self,
        name: &str,
        parent: Option<BackingRef>,
    ) -> Result<BackingRef, HostError> {
        let draft = match parent {
            Some(parent) => NodeDraft::child_of(self.node_for(parent)?),
            None => NodeDraft::root(),
        };
        let id = self.indexer.create_sequence(&mut self.store, draft, name)?;
        self.log_events();
        let node = self
            .indexer
            .index()
            .node(id)
            .ok_or(HostError::Index(IndexError::UnknownNode(id)))?;
        Ok(node.backing)
    }

    /// Rename the sequence standing for `timeline`
    pub fn rename(&mut self, timeline: BackingRef, name: &str) -> Result<(), HostError> {
        let id = self.node_for(timeline)?;
        self.indexer.rename_sequence(&mut self.store, id, name)?;
        self.log_events();
        Ok(())
    }

    /// Delete the sequence standing for `timeline`. Returns the number of
    /// nodes that left the index
    pub fn delete(&mut self, timeline: BackingRef) -> Result<usize, HostError> {
        let id = self.node_for(timeline)?;
        let removed = self.indexer.delete_sequence(&mut self.store, id)?;
        self.log_events();
        Ok(removed)
    }

    /// Persist the index and release it
    pub fn shutdown(&mut self) {
        self.indexer.teardown();
    }

    fn log_events(&self) {
        for event in self.indexer.bus().poll() {
            match event {
                IndexEvent::Registered(id) => tracing::debug!("Registered {:?}", id),
                IndexEvent::Updated(id) => tracing::debug!("Updated {:?}", id),
                IndexEvent::Removed => tracing::info!("Sequences removed"),
                IndexEvent::ValidityChanged => {
                    tracing::info!(
                        "Validity changed, {} invalid sequences",
                        self.indexer.invalid_count()
                    );
                }
                IndexEvent::Initialized => tracing::info!("Sequence index initialized"),
            }
        }
    }
}
