// SPDX-License-Identifier: MIT OR Apache-2.0
//! Boundary with the backing-object store.
//!
//! The index never owns timelines. It reads them through [`BackingStore`],
//! which the asset layer implements over whatever storage actually holds
//! the compositions (files on disk, an in-memory fixture, ...).

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of a backing timeline asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackingRef(pub Uuid);

impl BackingRef {
    /// Create a new random backing reference
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BackingRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BackingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a clip placed on an editorial track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClipRef(pub Uuid);

impl ClipRef {
    /// Create a new random clip reference
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClipRef {
    fn default() -> Self {
        Self::new()
    }
}

/// Placement of a child composition inside its parent's timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditorialRef {
    /// Timeline holding the editorial clip
    pub owner: BackingRef,
    /// The clip itself
    pub clip: ClipRef,
}

impl EditorialRef {
    /// Create an editorial reference
    pub fn new(owner: BackingRef, clip: ClipRef) -> Self {
        Self { owner, clip }
    }
}

/// What a clip on an editorial track plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ClipKind {
    /// Nested composition clip, the only kind the index descends into
    #[default]
    Editorial,
    /// Anything else (audio, activation, storyboard...)
    Other,
}

/// A clip on an editorial track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorialClip {
    /// Clip identity
    pub clip: ClipRef,
    /// Clip kind
    pub kind: ClipKind,
}

impl EditorialClip {
    /// Whether traversal should descend into this clip
    pub fn is_compatible(&self) -> bool {
        self.kind == ClipKind::Editorial
    }
}

/// An editorial track and its clips, in track order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorialTrack {
    /// Track name
    pub name: String,
    /// Clips in placement order
    pub clips: Vec<EditorialClip>,
}

/// Read access to the backing timelines of a project
pub trait BackingStore {
    /// Every timeline in the project that may root a composition
    fn timelines(&self) -> Vec<BackingRef>;

    /// Whether the reference still resolves to a live timeline
    fn resolves(&self, backing: BackingRef) -> bool;

    /// Display name of a live timeline
    fn name(&self, backing: BackingRef) -> Option<String>;

    /// Editorial tracks embedded in a timeline; empty when it does not resolve
    fn editorial_tracks(&self, backing: BackingRef) -> Vec<EditorialTrack>;

    /// Timeline played by an editorial clip, if it is set and still resolves
    fn editorial_target(&self, editorial: &EditorialRef) -> Option<BackingRef>;
}

/// Runtime/scene side: does a timeline have a live instantiation
pub trait SceneProbe {
    /// Whether the timeline is instantiated in the currently loaded scenes
    fn is_instantiated(&self, backing: BackingRef) -> bool;
}

/// Probe for hosts without a scene context
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeInstantiated;

impl SceneProbe for AssumeInstantiated {
    fn is_instantiated(&self, _backing: BackingRef) -> bool {
        true
    }
}

/// Thread-safe set of instantiated timelines, shared between the scene side
/// that fills it and the indexer that probes it
#[derive(Debug, Clone, Default)]
pub struct SharedScene {
    instantiated: Arc<RwLock<HashSet<BackingRef>>>,
}

impl SharedScene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a timeline as instantiated
    pub fn instantiate(&self, backing: BackingRef) {
        self.instantiated.write().insert(backing);
    }

    /// Remove a timeline's instantiation
    pub fn remove(&self, backing: BackingRef) -> bool {
        self.instantiated.write().remove(&backing)
    }

    /// Drop every instantiation, as when the scene is unloaded
    pub fn clear(&self) {
        self.instantiated.write().clear();
    }
}

impl SceneProbe for SharedScene {
    fn is_instantiated(&self, backing: BackingRef) -> bool {
        self.instantiated.read().contains(&backing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_editorial_clips_are_compatible() {
        let editorial = EditorialClip { clip: ClipRef::new(), kind: ClipKind::Editorial };
        let other = EditorialClip { clip: ClipRef::new(), kind: ClipKind::Other };
        assert!(editorial.is_compatible());
        assert!(!other.is_compatible());
    }

    #[test]
    fn test_backing_refs_are_distinct() {
        assert_ne!(BackingRef::new(), BackingRef::new());
    }

    #[test]
    fn test_shared_scene_is_shared_between_clones() {
        let scene = SharedScene::new();
        let probe = scene.clone();
        let timeline = BackingRef::new();

        assert!(!probe.is_instantiated(timeline));
        scene.instantiate(timeline);
        assert!(probe.is_instantiated(timeline));
        scene.clear();
        assert!(!probe.is_instantiated(timeline));
    }
}
