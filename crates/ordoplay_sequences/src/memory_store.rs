// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory backing store.
//!
//! Implements every store-side trait the indexer consumes. Used as the test
//! fixture throughout the crate, and by hosts that build compositions
//! programmatically.

use crate::backing::{
    BackingRef, BackingStore, ClipKind, ClipRef, EditorialClip, EditorialRef, EditorialTrack,
};
use crate::error::AuthoringError;
use crate::intents::SequenceAuthoring;
use crate::legacy::LegacyRepair;
use crate::master::MasterSequence;
use indexmap::IndexMap;

/// Name of the editorial track created for nested sequences
pub const SEQUENCES_TRACK_NAME: &str = "Sequences";

#[derive(Debug, Clone, PartialEq, Eq)]
struct MemoryClip {
    clip: ClipRef,
    kind: ClipKind,
    target: Option<BackingRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MemoryTrack {
    name: String,
    clips: Vec<MemoryClip>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MemoryTimeline {
    name: String,
    tracks: Vec<MemoryTrack>,
}

/// Timelines, editorial tracks and master sequences held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    timelines: IndexMap<BackingRef, MemoryTimeline>,
    masters: Vec<MasterSequence>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a timeline without any editorial track
    pub fn add_timeline(&mut self, name: &str) -> BackingRef {
        let backing = BackingRef::new();
        self.insert_timeline(backing, name);
        backing
    }

    /// Add a timeline under a known reference, replacing any previous one
    pub fn insert_timeline(&mut self, backing: BackingRef, name: &str) {
        self.timelines.insert(
            backing,
            MemoryTimeline {
                name: name.to_string(),
                tracks: Vec::new(),
            },
        );
    }

    /// Add a timeline that carries an empty editorial track, as new master
    /// sequences do
    pub fn add_master_timeline(&mut self, name: &str) -> BackingRef {
        let backing = self.add_timeline(name);
        self.add_editorial_track(backing, SEQUENCES_TRACK_NAME);
        backing
    }

    /// Append an empty editorial track. Returns false if the timeline is unknown
    pub fn add_editorial_track(&mut self, timeline: BackingRef, name: &str) -> bool {
        let Some(timeline) = self.timelines.get_mut(&timeline) else {
            return false;
        };
        timeline.tracks.push(MemoryTrack {
            name: name.to_string(),
            clips: Vec::new(),
        });
        true
    }

    /// Place a clip on the first editorial track of `parent`, creating the
    /// track if needed
    pub fn add_clip(
        &mut self,
        parent: BackingRef,
        kind: ClipKind,
        target: Option<BackingRef>,
    ) -> Option<EditorialRef> {
        let timeline = self.timelines.get_mut(&parent)?;
        if timeline.tracks.is_empty() {
            timeline.tracks.push(MemoryTrack {
                name: SEQUENCES_TRACK_NAME.to_string(),
                clips: Vec::new(),
            });
        }
        let clip = ClipRef::new();
        timeline.tracks[0].clips.push(MemoryClip { clip, kind, target });
        Some(EditorialRef::new(parent, clip))
    }

    /// Nest `child` in `parent` through a new editorial clip
    pub fn nest(&mut self, parent: BackingRef, child: BackingRef) -> Option<EditorialRef> {
        self.add_clip(parent, ClipKind::Editorial, Some(child))
    }

    /// Change the timeline an editorial clip plays. Returns false if the clip is unknown
    pub fn set_clip_target(&mut self, editorial: &EditorialRef, target: Option<BackingRef>) -> bool {
        match self.clip_mut(editorial) {
            Some(clip) => {
                clip.target = target;
                true
            }
            None => false,
        }
    }

    /// Remove an editorial clip. Returns false if it is unknown
    pub fn remove_clip(&mut self, editorial: &EditorialRef) -> bool {
        let Some(timeline) = self.timelines.get_mut(&editorial.owner) else {
            return false;
        };
        for track in &mut timeline.tracks {
            let before = track.clips.len();
            track.clips.retain(|c| c.clip != editorial.clip);
            if track.clips.len() != before {
                return true;
            }
        }
        false
    }

    /// Drop every track of a timeline. Returns false if it is unknown
    pub fn clear_tracks(&mut self, backing: BackingRef) -> bool {
        match self.timelines.get_mut(&backing) {
            Some(timeline) => {
                timeline.tracks.clear();
                true
            }
            None => false,
        }
    }

    /// Delete a timeline. Clips elsewhere that played it are left dangling
    pub fn remove_timeline(&mut self, backing: BackingRef) -> bool {
        self.timelines.shift_remove(&backing).is_some()
    }

    /// Rename a timeline. Returns false if it is unknown
    pub fn rename(&mut self, backing: BackingRef, name: &str) -> bool {
        match self.timelines.get_mut(&backing) {
            Some(timeline) => {
                timeline.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Register a master sequence asset
    pub fn add_master_sequence(&mut self, master: MasterSequence) {
        self.masters.push(master);
    }

    /// Number of live timelines
    pub fn timeline_count(&self) -> usize {
        self.timelines.len()
    }

    fn clip(&self, editorial: &EditorialRef) -> Option<&MemoryClip> {
        self.timelines
            .get(&editorial.owner)?
            .tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .find(|c| c.clip == editorial.clip)
    }

    fn clip_mut(&mut self, editorial: &EditorialRef) -> Option<&mut MemoryClip> {
        self.timelines
            .get_mut(&editorial.owner)?
            .tracks
            .iter_mut()
            .flat_map(|t| t.clips.iter_mut())
            .find(|c| c.clip == editorial.clip)
    }
}

impl BackingStore for MemoryStore {
    fn timelines(&self) -> Vec<BackingRef> {
        self.timelines.keys().copied().collect()
    }

    fn resolves(&self, backing: BackingRef) -> bool {
        self.timelines.contains_key(&backing)
    }

    fn name(&self, backing: BackingRef) -> Option<String> {
        self.timelines.get(&backing).map(|t| t.name.clone())
    }

    fn editorial_tracks(&self, backing: BackingRef) -> Vec<EditorialTrack> {
        let Some(timeline) = self.timelines.get(&backing) else {
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
                    .map(|c| EditorialClip { clip: c.clip, kind: c.kind })
                    .collect(),
            })
            .collect()
    }

    fn editorial_target(&self, editorial: &EditorialRef) -> Option<BackingRef> {
        self.clip(editorial)?
            .target
            .filter(|target| self.resolves(*target))
    }
}

impl LegacyRepair for MemoryStore {
    fn master_sequences(&self) -> Vec<MasterSequence> {
        self.masters.clone()
    }

    fn assign_editorial_target(
        &mut self,
        editorial: &EditorialRef,
        target: BackingRef,
    ) -> Result<(), AuthoringError> {
        if self.set_clip_target(editorial, Some(target)) {
            Ok(())
        } else {
            Err(AuthoringError::NotFound(editorial.owner.to_string()))
        }
    }
}

impl SequenceAuthoring for MemoryStore {
    fn create_timeline(
        &mut self,
        name: &str,
        parent: Option<BackingRef>,
    ) -> Result<BackingRef, AuthoringError> {
        match parent {
            None => Ok(self.add_master_timeline(name)),
            Some(parent) => {
                if !self.resolves(parent) {
                    return Err(AuthoringError::NotFound(parent.to_string()));
                }
                let child = self.add_timeline(name);
                self.nest(parent, child);
                Ok(child)
            }
        }
    }

    fn rename_timeline(&mut self, backing: BackingRef, name: &str) -> Result<(), AuthoringError> {
        if self.rename(backing, name) {
            Ok(())
        } else {
            Err(AuthoringError::NotFound(backing.to_string()))
        }
    }

    fn delete_timeline(&mut self, backing: BackingRef) -> Result<(), AuthoringError> {
        if self.remove_timeline(backing) {
            Ok(())
        } else {
            Err(AuthoringError::NotFound(backing.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::repair_legacy_editorial_links;
    use crate::master::DEFAULT_FPS;

    #[test]
    fn test_nested_clip_resolves_target() {
        let mut store = MemoryStore::new();
        let parent = store.add_timeline("Parent");
        let child = store.add_timeline("Child");
        let editorial = store.nest(parent, child).unwrap();

        assert_eq!(store.editorial_target(&editorial), Some(child));
        assert_eq!(store.editorial_tracks(parent)[0].clips.len(), 1);

        store.remove_timeline(child);
        assert_eq!(store.editorial_target(&editorial), None);
    }

    #[test]
    fn test_unresolved_timeline_has_no_tracks() {
        let store = MemoryStore::new();
        assert!(store.editorial_tracks(BackingRef::new()).is_empty());
        assert!(store.name(BackingRef::new()).is_none());
    }

    #[test]
    fn test_repair_assigns_legacy_clips_once() {
        let mut store = MemoryStore::new();
        let root = store.add_timeline("Film");
        let shot = store.add_timeline("Shot");
        let editorial = store.add_clip(root, ClipKind::Editorial, None).unwrap();

        let mut master = MasterSequence::create("Film", root, DEFAULT_FPS);
        master.format_version = 1;
        let slot = master.new_sequence("Shot", Some(shot), None).unwrap();
        master.manager_mut().get_at_mut(slot).unwrap().editorial_clip = Some(editorial);
        store.add_master_sequence(master);

        assert_eq!(repair_legacy_editorial_links(&mut store), 1);
        assert_eq!(store.editorial_target(&editorial), Some(shot));
        assert_eq!(repair_legacy_editorial_links(&mut store), 0);
    }

    #[test]
    fn test_authoring_child_places_clip() {
        let mut store = MemoryStore::new();
        let root = store.create_timeline("Film", None).unwrap();
        let child = store.create_timeline("Sequence", Some(root)).unwrap();

        let clips = &store.editorial_tracks(root)[0].clips;
        let editorial = EditorialRef::new(root, clips[0].clip);
        assert_eq!(store.editorial_target(&editorial), Some(child));
        assert!(store.create_timeline("Lost", Some(BackingRef::new())).is_err());
    }
}
