// SPDX-License-Identifier: MIT OR Apache-2.0
//! Backing store over a directory of RON files.
//!
//! - `*.timeline.ron` holds one timeline with its editorial tracks
//! - `*.master.ron` holds one master sequence
//!
//! Files that fail to parse are skipped with a warning, so the index sees
//! their timelines as missing.

use crate::error::HostError;
use indexmap::IndexMap;
use ordoplay_sequences::{
    AssetChanges, AuthoringError, BackingRef, BackingStore, ClipKind, ClipRef, EditorialClip,
    EditorialRef, EditorialTrack, LegacyRepair, MasterSequence, SequenceAuthoring,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Suffix of timeline files
pub const TIMELINE_SUFFIX: &str = ".timeline.ron";

/// Suffix of master sequence files
pub const MASTER_SUFFIX: &str = ".master.ron";

/// Editorial track created for nested sequences
const SEQUENCES_TRACK: &str = "Sequences";

/// A clip as stored in a timeline file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipFile {
    /// Clip identity
    pub id: ClipRef,
    /// Clip kind
    #[serde(default)]
    pub kind: ClipKind,
    /// Timeline the clip plays
    #[serde(default)]
    pub target: Option<BackingRef>,
}

/// A track as stored in a timeline file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackFile {
    /// Track name
    pub name: String,
    /// Clips in placement order
    #[serde(default)]
    pub clips: Vec<ClipFile>,
}

/// Content of a `*.timeline.ron` file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineFile {
    /// Timeline identity, stable across renames and moves
    pub id: BackingRef,
    /// Display name
    pub name: String,
    /// Editorial tracks
    #[serde(default)]
    pub tracks: Vec<TrackFile>,
}

#[derive(Debug, Clone)]
struct LoadedTimeline {
    path: PathBuf,
    file: TimelineFile,
}

/// What a filesystem change meant for the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathChange {
    /// A timeline appeared or its content changed
    Imported(BackingRef),
    /// A known timeline now lives at another path
    Moved(BackingRef),
    /// A timeline disappeared
    Deleted(BackingRef),
    /// A master sequence file changed
    MasterChanged,
    /// Nothing the store tracks
    Ignored,
}

/// Outcome of folding a batch of changed paths into the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreChanges {
    /// Timeline changes for the indexer
    pub assets: AssetChanges,
    /// Whether any master sequence file appeared, changed or vanished
    pub masters_changed: bool,
}

/// Timelines and master sequences loaded from a project's assets directory
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    timelines: IndexMap<BackingRef, LoadedTimeline>,
    by_path: HashMap<PathBuf, BackingRef>,
    masters: IndexMap<PathBuf, MasterSequence>,
}

fn is_timeline_path(path: &Path) -> bool {
    path.to_str().is_some_and(|p| p.ends_with(TIMELINE_SUFFIX))
}

fn is_master_path(path: &Path) -> bool {
    path.to_str().is_some_and(|p| p.ends_with(MASTER_SUFFIX))
}

/// Whether a path names a file this store reads
pub fn is_store_path(path: &Path) -> bool {
    is_timeline_path(path) || is_master_path(path)
}

fn to_ron<T: Serialize>(value: &T) -> Result<String, ron::Error> {
    let config = ron::ser::PrettyConfig::default()
        .struct_names(true)
        .enumerate_arrays(false);
    ron::ser::to_string_pretty(value, config)
}

fn read_ron<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("Cannot read {:?}: {}", path, e);
            return None;
        }
    };
    match ron::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Skipping malformed file {:?}: {}", path, e);
            None
        }
    }
}

impl FsStore {
    /// Load every store file below `root`. A missing directory is created
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, HostError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| HostError::io(&root, e))?;
        let mut store = Self {
            root,
            timelines: IndexMap::new(),
            by_path: HashMap::new(),
            masters: IndexMap::new(),
        };
        store.rescan();
        Ok(store)
    }

    /// Directory the store reads from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop everything and read the directory again
    pub fn rescan(&mut self) {
        self.timelines.clear();
        self.by_path.clear();
        self.masters.clear();

        let files: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e: Result<walkdir::DirEntry, walkdir::Error>| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| is_store_path(p))
            .collect();
        for path in files {
            self.reload_path(&path);
        }
        tracing::info!(
            "Loaded {} timelines and {} master sequences from {:?}",
            self.timelines.len(),
            self.masters.len(),
            self.root
        );
    }

    /// Bring one path in sync with the disk
    pub fn reload_path(&mut self, path: &Path) -> PathChange {
        if is_master_path(path) {
            self.masters.shift_remove(path);
            if path.is_file() {
                if let Some(master) = read_ron::<MasterSequence>(path) {
                    self.masters.insert(path.to_path_buf(), master);
                }
            }
            return PathChange::MasterChanged;
        }
        if !is_timeline_path(path) {
            return PathChange::Ignored;
        }

        let previous = self.by_path.remove(path);
        let loaded = if path.is_file() {
            read_ron::<TimelineFile>(path)
        } else {
            None
        };

        let Some(file) = loaded else {
            return match previous {
                Some(id) => {
                    self.timelines.shift_remove(&id);
                    PathChange::Deleted(id)
                }
                None => PathChange::Ignored,
            };
        };

        let id = file.id;
        if let Some(prev) = previous.filter(|p| *p != id) {
            self.timelines.shift_remove(&prev);
        }
        let moved_from = self
            .timelines
            .get(&id)
            .map(|t| t.path.clone())
            .filter(|old| old != path);
        if let Some(old) = &moved_from {
            if old.is_file() {
                tracing::warn!("Timeline {} is defined by both {:?} and {:?}", id, old, path);
            }
            self.by_path.remove(old);
        }

        self.by_path.insert(path.to_path_buf(), id);
        self.timelines.insert(
            id,
            LoadedTimeline {
                path: path.to_path_buf(),
                file,
            },
        );
        if moved_from.is_some() {
            PathChange::Moved(id)
        } else {
            PathChange::Imported(id)
        }
    }

    /// Fold a batch of changed paths into the store and describe the result
    pub fn apply_paths<'a>(&mut self, paths: impl IntoIterator<Item = &'a Path>) -> StoreChanges {
        let mut changes = StoreChanges::default();
        for path in paths {
            match self.reload_path(path) {
                PathChange::Imported(id) => changes.assets.imported.push(id),
                PathChange::Moved(id) => changes.assets.moved.push(id),
                PathChange::Deleted(id) => changes.assets.deleted.push(id),
                PathChange::MasterChanged => changes.masters_changed = true,
                PathChange::Ignored => {}
            }
        }
        changes
    }

    /// Timeline file content
    pub fn timeline(&self, id: BackingRef) -> Option<&TimelineFile> {
        self.timelines.get(&id).map(|t| &t.file)
    }

    /// Write a timeline file and track it
    pub fn write_timeline(&mut self, path: &Path, file: TimelineFile) -> Result<(), HostError> {
        let content = to_ron(&file).map_err(|e| HostError::StoreFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| HostError::io(dir, e))?;
        }
        std::fs::write(path, content).map_err(|e| HostError::io(path, e))?;

        self.by_path.insert(path.to_path_buf(), file.id);
        self.timelines.insert(
            file.id,
            LoadedTimeline {
                path: path.to_path_buf(),
                file,
            },
        );
        Ok(())
    }

    fn unique_timeline_path(&self, name: &str) -> PathBuf {
        let stem: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let mut path = self.root.join(format!("{stem}{TIMELINE_SUFFIX}"));
        let mut n = 1;
        while path.exists() || self.by_path.contains_key(&path) {
            path = self.root.join(format!("{stem}_{n}{TIMELINE_SUFFIX}"));
            n += 1;
        }
        path
    }

    fn edit_timeline(
        &mut self,
        id: BackingRef,
        edit: impl FnOnce(&mut TimelineFile) -> bool,
    ) -> Result<(), AuthoringError> {
        let Some(loaded) = self.timelines.get(&id) else {
            return Err(AuthoringError::NotFound(id.to_string()));
        };
        let mut file = loaded.file.clone();
        let path = loaded.path.clone();
        if !edit(&mut file) {
            return Err(AuthoringError::Other(format!("timeline {id} rejected the edit")));
        }
        self.write_timeline(&path, file)
            .map_err(|e| AuthoringError::Other(e.to_string()))
    }
}

impl BackingStore for FsStore {
    fn timelines(&self) -> Vec<BackingRef> {
        self.timelines.keys().copied().collect()
    }

    fn resolves(&self, backing: BackingRef) -> bool {
        self.timelines.contains_key(&backing)
    }

    fn name(&self, backing: BackingRef) -> Option<String> {
        self.timeline(backing).map(|t| t.name.clone())
    }

    fn editorial_tracks(&self, backing: BackingRef) -> Vec<EditorialTrack> {
        let Some(timeline) = self.timeline(backing) else {
            return Vec::new();
        };
        timeline
            .tracks
            .iter()
            .map(|track| EditorialTrack {
                name: track.name.clone(),
                clips: track
                    .clips
                    .iter()
                    .map(|c| EditorialClip { clip: c.id, kind: c.kind })
                    .collect(),
            })
            .collect()
    }

    fn editorial_target(&self, editorial: &EditorialRef) -> Option<BackingRef> {
        self.timeline(editorial.owner)?
            .tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .find(|c| c.id == editorial.clip)?
            .target
            .filter(|t| self.resolves(*t))
    }
}

impl LegacyRepair for FsStore {
    fn master_sequences(&self) -> Vec<MasterSequence> {
        self.masters.values().cloned().collect()
    }

    fn assign_editorial_target(
        &mut self,
        editorial: &EditorialRef,
        target: BackingRef,
    ) -> Result<(), AuthoringError> {
        self.edit_timeline(editorial.owner, |file| {
            let clip = file
                .tracks
                .iter_mut()
                .flat_map(|t| t.clips.iter_mut())
                .find(|c| c.id == editorial.clip);
            match clip {
                Some(clip) => {
                    clip.target = Some(target);
                    true
                }
                None => false,
            }
        })
    }
}

impl SequenceAuthoring for FsStore {
    fn create_timeline(
        &mut self,
        name: &str,
        parent: Option<BackingRef>,
    ) -> Result<BackingRef, AuthoringError> {
        if let Some(parent) = parent.filter(|p| !self.resolves(*p)) {
            return Err(AuthoringError::NotFound(parent.to_string()));
        }

        let id = BackingRef::new();
        let tracks = match parent {
            Some(_) => Vec::new(),
            None => vec![TrackFile {
                name: SEQUENCES_TRACK.to_string(),
                clips: Vec::new(),
            }],
        };
        let path = self.unique_timeline_path(name);
        self.write_timeline(
            &path,
            TimelineFile {
                id,
                name: name.to_string(),
                tracks,
            },
        )
        .map_err(|e| AuthoringError::Other(e.to_string()))?;

        if let Some(parent) = parent {
            self.edit_timeline(parent, |file| {
                if file.tracks.is_empty() {
                    file.tracks.push(TrackFile {
                        name: SEQUENCES_TRACK.to_string(),
                        clips: Vec::new(),
                    });
                }
                file.tracks[0].clips.push(ClipFile {
                    id: ClipRef::new(),
                    kind: ClipKind::Editorial,
                    target: Some(id),
                });
                true
            })?;
        }
        Ok(id)
    }

    fn rename_timeline(&mut self, backing: BackingRef, name: &str) -> Result<(), AuthoringError> {
        self.edit_timeline(backing, |file| {
            file.name = name.to_string();
            true
        })
    }

    fn delete_timeline(&mut self, backing: BackingRef) -> Result<(), AuthoringError> {
        let Some(loaded) = self.timelines.shift_remove(&backing) else {
            return Err(AuthoringError::NotFound(backing.to_string()));
        };
        self.by_path.remove(&loaded.path);
        std::fs::remove_file(&loaded.path)?;
        Ok(())
    }
}
