// SPDX-License-Identifier: MIT OR Apache-2.0
//! Debounced watcher over the assets directory.
//!
//! Raw notify events are reduced to the paths of store files that changed.
//! Whether a path was created, modified or deleted is decided later by
//! re-reading it, so the watcher does not need to get rename pairs right.

use crate::fs_store::is_store_path;
use notify_debouncer_full::{
    new_debouncer,
    notify::{self, EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// A store file was created
    Created(PathBuf),
    /// A store file was modified
    Modified(PathBuf),
    /// A store file was deleted
    Deleted(PathBuf),
    /// The watcher reported an error
    Error(String),
}

impl FileEvent {
    /// Path concerned by the event
    pub fn path(&self) -> Option<&Path> {
        match self {
            FileEvent::Created(p) | FileEvent::Modified(p) | FileEvent::Deleted(p) => Some(p),
            FileEvent::Error(_) => None,
        }
    }
}

/// Debounced watcher delivering [`FileEvent`]s through a channel
pub struct FileWatcher {
    watcher: Debouncer<RecommendedWatcher, RecommendedCache>,
    event_rx: Receiver<FileEvent>,
}

impl FileWatcher {
    /// Create a watcher. Nothing is watched until [`watch`](Self::watch)
    pub fn new(debounce: Duration) -> Result<Self, notify::Error> {
        let (event_tx, event_rx) = mpsc::channel();

        let watcher = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        for path in event.paths.iter().filter(|p| is_store_path(p)) {
                            let file_event = match event.kind {
                                EventKind::Create(_) => FileEvent::Created(path.clone()),
                                EventKind::Modify(_) => FileEvent::Modified(path.clone()),
                                EventKind::Remove(_) => FileEvent::Deleted(path.clone()),
                                EventKind::Any | EventKind::Access(_) | EventKind::Other => {
                                    continue
                                }
                            };
                            let _ = event_tx.send(file_event);
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        let _ = event_tx.send(FileEvent::Error(error.to_string()));
                    }
                }
            }
        })?;

        Ok(Self { watcher, event_rx })
    }

    /// Watch a directory recursively
    pub fn watch(&mut self, path: &Path) -> Result<(), notify::Error> {
        self.watcher.watch(path, RecursiveMode::Recursive)?;
        tracing::info!("Watching directory for changes: {:?}", path);
        Ok(())
    }

    /// Poll for pending file events (non-blocking)
    pub fn poll_events(&self) -> Vec<FileEvent> {
        let mut events = Vec::new();
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("File watcher channel disconnected");
                    break;
                }
            }
        }
        events
    }
}

/// Distinct paths touched by a batch of events, in a stable order.
/// Watcher errors are logged and dropped.
pub fn changed_paths(events: &[FileEvent]) -> Vec<PathBuf> {
    let mut paths = BTreeSet::new();
    for event in events {
        match event.path() {
            Some(path) => {
                paths.insert(path.to_path_buf());
            }
            None => {
                if let FileEvent::Error(message) = event {
                    tracing::warn!("File watcher error: {}", message);
                }
            }
        }
    }
    paths.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_paths_deduplicates() {
        let a = PathBuf::from("a.timeline.ron");
        let b = PathBuf::from("b.master.ron");
        let events = vec![
            FileEvent::Modified(b.clone()),
            FileEvent::Created(a.clone()),
            FileEvent::Modified(a.clone()),
            FileEvent::Error("boom".to_string()),
        ];
        assert_eq!(changed_paths(&events), vec![a, b]);
    }

    #[test]
    fn test_event_path() {
        let path = PathBuf::from("x.timeline.ron");
        assert_eq!(FileEvent::Deleted(path.clone()).path(), Some(path.as_path()));
        assert_eq!(FileEvent::Error(String::new()).path(), None);
    }
}
