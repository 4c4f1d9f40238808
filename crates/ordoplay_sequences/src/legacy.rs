// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compatibility with compositions written before editorial back-pointers.
//!
//! Old master sequences kept the parent/child structure in their own slot
//! table and left the editorial clips in timelines unassigned. Two things
//! follow from that:
//! - their root timelines may have no editorial track yet must still be
//!   indexed, which [`LegacyLayout`] decides
//! - their clips must be pointed at the right child timelines before the
//!   first scan, which [`repair_legacy_editorial_links`] does

use crate::backing::{BackingRef, BackingStore, EditorialRef};
use crate::error::AuthoringError;
use crate::master::MasterSequence;
use std::collections::{HashMap, HashSet};

/// Decides whether a timeline roots an old-format composition
pub trait LegacyLayout {
    /// Whether the timeline must be indexed even without editorial tracks
    fn is_legacy_root(&self, backing: BackingRef) -> bool;
}

impl<F> LegacyLayout for F
where
    F: Fn(BackingRef) -> bool,
{
    fn is_legacy_root(&self, backing: BackingRef) -> bool {
        self(backing)
    }
}

/// Projects without old-format compositions
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLegacyLayouts;

impl LegacyLayout for NoLegacyLayouts {
    fn is_legacy_root(&self, _backing: BackingRef) -> bool {
        false
    }
}

/// Root timelines of a known set of old-format master sequences
#[derive(Debug, Clone, Default)]
pub struct LegacyMasterTimelines {
    roots: HashSet<BackingRef>,
}

impl LegacyMasterTimelines {
    /// Collect the root timelines of every legacy master sequence
    pub fn from_masters<'a>(masters: impl IntoIterator<Item = &'a MasterSequence>) -> Self {
        let roots = masters
            .into_iter()
            .filter(|m| m.is_legacy())
            .filter_map(MasterSequence::root_timeline)
            .collect();
        Self { roots }
    }

    /// Mark one more timeline as a legacy root
    pub fn insert(&mut self, backing: BackingRef) -> bool {
        self.roots.insert(backing)
    }

    /// Number of known legacy roots
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether no legacy root is known
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl LegacyLayout for LegacyMasterTimelines {
    fn is_legacy_root(&self, backing: BackingRef) -> bool {
        self.roots.contains(&backing)
    }
}

/// Write access needed to repair old-format compositions
pub trait LegacyRepair: BackingStore {
    /// Every master sequence asset in the project
    fn master_sequences(&self) -> Vec<MasterSequence>;

    /// Point an editorial clip at the timeline it should play
    fn assign_editorial_target(
        &mut self,
        editorial: &EditorialRef,
        target: BackingRef,
    ) -> Result<(), AuthoringError>;
}

/// Assign the editorial clips of every legacy master sequence from the
/// structure its slot table recorded. Returns the number of clips repaired.
///
/// Clips that already resolve are left alone, so running this twice is a
/// no-op the second time.
pub fn repair_legacy_editorial_links<S>(store: &mut S) -> usize
where
    S: LegacyRepair + ?Sized,
{
    let mut repaired = 0;

    for master in store.master_sequences().into_iter().filter(MasterSequence::is_legacy) {
        let targets: HashMap<EditorialRef, BackingRef> = master
            .manager()
            .iter()
            .filter_map(|(_, s)| Some((s.editorial_clip?, s.timeline?)))
            .collect();
        if targets.is_empty() {
            continue;
        }

        let timelines: Vec<BackingRef> =
            master.manager().iter().filter_map(|(_, s)| s.timeline).collect();
        for timeline in timelines {
            for track in store.editorial_tracks(timeline) {
                for clip in track.clips.iter().filter(|c| c.is_compatible()) {
                    let editorial = EditorialRef::new(timeline, clip.clip);
                    if store.editorial_target(&editorial).is_some() {
                        continue;
                    }
                    let Some(target) = targets.get(&editorial).copied() else {
                        continue;
                    };
                    match store.assign_editorial_target(&editorial, target) {
                        Ok(()) => repaired += 1,
                        Err(e) => tracing::warn!(
                            "Failed to repair editorial clip in master sequence '{}': {}",
                            master.name,
                            e
                        ),
                    }
                }
            }
        }
    }

    if repaired > 0 {
        tracing::info!("Repaired {} legacy editorial links", repaired);
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::DEFAULT_FPS;

    #[test]
    fn test_closure_layout() {
        let legacy = BackingRef::new();
        let layout = move |b: BackingRef| b == legacy;
        assert!(layout.is_legacy_root(legacy));
        assert!(!layout.is_legacy_root(BackingRef::new()));
        assert!(!NoLegacyLayouts.is_legacy_root(legacy));
    }

    #[test]
    fn test_master_timelines_only_collects_legacy_roots() {
        let old_root = BackingRef::new();
        let mut old = MasterSequence::create("Old", old_root, DEFAULT_FPS);
        old.format_version = 1;
        let new = MasterSequence::create("New", BackingRef::new(), DEFAULT_FPS);

        let layout = LegacyMasterTimelines::from_masters([&old, &new]);
        assert_eq!(layout.len(), 1);
        assert!(layout.is_legacy_root(old_root));
        assert!(!layout.is_legacy_root(new.root_timeline().unwrap()));
    }
}
