// SPDX-License-Identifier: MIT OR Apache-2.0
//! Master sequences: root aggregates owning a whole sequence tree.
//!
//! A master sequence stores its tree in a flat [`SequenceManager`] slot
//! table. Slots are addressed by index, and removal leaves a hole so the
//! indices held elsewhere (scene bindings, the root index) stay stable.

use crate::backing::{BackingRef, EditorialRef};
use serde::{Deserialize, Serialize};

/// Current master sequence format version
pub const MASTER_FORMAT_VERSION: u32 = 2;

/// First format version that stores editorial back-pointers in timelines
pub const EDITORIAL_LINKS_VERSION: u32 = 2;

/// Default frame rate for new master sequences
pub const DEFAULT_FPS: f32 = 24.0;

fn legacy_format_version() -> u32 {
    1
}

/// One sequence entry in a master sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedSequence {
    /// Sequence name
    pub name: String,
    /// Timeline backing this sequence
    pub timeline: Option<BackingRef>,
    /// Frame rate
    pub fps: f32,
    /// Clip in the parent timeline that plays this sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editorial_clip: Option<EditorialRef>,
    parent: Option<usize>,
    #[serde(default)]
    children: Vec<usize>,
}

impl ManagedSequence {
    /// Create a detached entry
    pub fn new(name: impl Into<String>, timeline: Option<BackingRef>, fps: f32) -> Self {
        Self {
            name: name.into(),
            timeline,
            fps,
            editorial_clip: None,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Slot of the parent sequence
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Slots of the child sequences
    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

/// Flat slot table owning every sequence of one master sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceManager {
    sequences: Vec<Option<ManagedSequence>>,
}

impl SequenceManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sequence and return its slot
    pub fn add(&mut self, sequence: ManagedSequence) -> usize {
        self.sequences.push(Some(sequence));
        self.sequences.len() - 1
    }

    /// Get a sequence by slot
    pub fn get_at(&self, index: usize) -> Option<&ManagedSequence> {
        self.sequences.get(index).and_then(Option::as_ref)
    }

    /// Get a mutable sequence by slot
    pub fn get_at_mut(&mut self, index: usize) -> Option<&mut ManagedSequence> {
        self.sequences.get_mut(index).and_then(Option::as_mut)
    }

    /// Slot of the sequence backed by a timeline
    pub fn index_of(&self, timeline: BackingRef) -> Option<usize> {
        self.iter()
            .find(|(_, s)| s.timeline == Some(timeline))
            .map(|(i, _)| i)
    }

    /// Empty a slot
    pub fn remove(&mut self, index: usize) -> Option<ManagedSequence> {
        self.sequences.get_mut(index).and_then(Option::take)
    }

    /// Live sequences with their slots
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ManagedSequence)> {
        self.sequences
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
    }

    /// Number of live sequences
    pub fn count(&self) -> usize {
        self.sequences.iter().filter(|s| s.is_some()).count()
    }
}

/// Root aggregate of a composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSequence {
    /// Master sequence name
    pub name: String,
    /// Format version the asset was written with
    #[serde(default = "legacy_format_version")]
    pub format_version: u32,
    root_index: Option<usize>,
    manager: SequenceManager,
}

impl MasterSequence {
    /// Allocate a master sequence together with its root sequence
    pub fn create(name: impl Into<String>, timeline: BackingRef, fps: f32) -> Self {
        let name = name.into();
        let mut manager = SequenceManager::new();
        let root = manager.add(ManagedSequence::new(name.clone(), Some(timeline), fps));
        Self {
            name,
            format_version: MASTER_FORMAT_VERSION,
            root_index: Some(root),
            manager,
        }
    }

    /// Whether this asset predates editorial back-pointers
    pub fn is_legacy(&self) -> bool {
        self.format_version < EDITORIAL_LINKS_VERSION
    }

    /// Slot of the root sequence
    pub fn root_index(&self) -> Option<usize> {
        self.root_index
    }

    /// Root sequence
    pub fn root(&self) -> Option<&ManagedSequence> {
        self.root_index.and_then(|i| self.manager.get_at(i))
    }

    /// Timeline of the root sequence
    pub fn root_timeline(&self) -> Option<BackingRef> {
        self.root().and_then(|s| s.timeline)
    }

    /// The slot table
    pub fn manager(&self) -> &SequenceManager {
        &self.manager
    }

    /// Mutable slot table
    pub fn manager_mut(&mut self) -> &mut SequenceManager {
        &mut self.manager
    }

    /// Add a sequence under `parent`, or under the root when `parent` is `None`.
    ///
    /// Returns `None` when the parent slot is empty.
    pub fn new_sequence(
        &mut self,
        name: impl Into<String>,
        timeline: Option<BackingRef>,
        parent: Option<usize>,
    ) -> Option<usize> {
        let parent = parent.or(self.root_index)?;
        let fps = self.manager.get_at(parent)?.fps;

        let mut sequence = ManagedSequence::new(name, timeline, fps);
        sequence.parent = Some(parent);
        let index = self.manager.add(sequence);
        if let Some(parent) = self.manager.get_at_mut(parent) {
            parent.children.push(index);
        }
        Some(index)
    }

    /// Remove a sequence and all its children. Returns the removed entries,
    /// parents before children, for callers that delete the matching assets.
    pub fn remove_sequence(&mut self, index: usize) -> Vec<ManagedSequence> {
        let Some(sequence) = self.manager.remove(index) else {
            return Vec::new();
        };
        if let Some(parent) = sequence.parent.and_then(|p| self.manager.get_at_mut(p)) {
            parent.children.retain(|c| *c != index);
        }
        if self.root_index == Some(index) {
            self.root_index = None;
        }

        let children = sequence.children.clone();
        let mut removed = vec![sequence];
        for child in children {
            removed.extend(self.remove_sequence(child));
        }
        removed
    }

    /// Detach the root, emptying the aggregate before its asset is deleted
    pub fn detach_root(&mut self) -> Vec<ManagedSequence> {
        match self.root_index {
            Some(root) => self.remove_sequence(root),
            None => Vec::new(),
        }
    }
}
