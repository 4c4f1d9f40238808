// SPDX-License-Identifier: MIT OR Apache-2.0
//! Index of sequence assets: reusable prefab-like assets that come as a
//! source plus any number of variants derived from it.
//!
//! The index answers "which variants does this source have" without loading
//! every asset in the project, and is cached under `Library/` like the
//! sequence hierarchy.

use crate::cache::{CacheFile, ASSET_CACHE_FILE_NAME};
use crate::error::AssetIndexError;
use crate::events::{BusEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Identity of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef(pub Uuid);

impl AssetRef {
    /// Create a new random asset reference
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssetRef {
    fn default() -> Self {
        Self::new()
    }
}

/// What an asset is, as far as this index cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    /// Not tagged as a sequence asset
    Plain,
    /// Sequence asset source
    Source,
    /// Sequence asset variant, with its source when it still resolves
    Variant {
        /// Source the variant derives from
        source: Option<AssetRef>,
    },
}

/// An asset presented to the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetDescriptor {
    /// Asset identity
    pub asset: AssetRef,
    /// Asset kind
    pub kind: AssetKind,
}

impl AssetDescriptor {
    /// Describe a sequence asset source
    pub fn source(asset: AssetRef) -> Self {
        Self { asset, kind: AssetKind::Source }
    }

    /// Describe a sequence asset variant
    pub fn variant(asset: AssetRef, source: Option<AssetRef>) -> Self {
        Self {
            asset,
            kind: AssetKind::Variant { source },
        }
    }
}

/// One source and its known variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// The source asset
    pub source: AssetRef,
    /// Variants in registration order
    #[serde(default)]
    pub variants: Vec<AssetRef>,
}

/// Notification emitted by [`SequenceAssetIndex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetIndexEvent {
    /// The index content changed or was re-saved
    Changed,
}

impl BusEvent for AssetIndexEvent {
    fn is_suppressible(&self) -> bool {
        true
    }
}

/// Source/variant registry of sequence assets
#[derive(Debug, Default)]
pub struct SequenceAssetIndex {
    entries: Vec<AssetEntry>,
    cache: Option<CacheFile>,
    bus: EventBus<AssetIndexEvent>,
}

impl SequenceAssetIndex {
    /// Create an index that only lives in memory
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create an index cached at `<project>/Library/QuickSequenceAsset.index`
    /// and load whatever the cache holds
    pub fn for_project(project_dir: &Path) -> Self {
        let mut index = Self {
            cache: Some(CacheFile::in_project(project_dir, ASSET_CACHE_FILE_NAME)),
            ..Self::default()
        };
        index.load();
        index
    }

    /// Event bus notified after every change
    pub fn bus(&self) -> &EventBus<AssetIndexEvent> {
        &self.bus
    }

    /// Every entry in registration order
    pub fn entries(&self) -> &[AssetEntry] {
        &self.entries
    }

    /// Position of a source's entry
    pub fn index_of(&self, source: AssetRef) -> Option<usize> {
        self.entries.iter().position(|e| e.source == source)
    }

    /// Register a source, or a variant together with its source.
    ///
    /// Returns the position of the affected entry.
    pub fn add(&mut self, descriptor: AssetDescriptor) -> Result<usize, AssetIndexError> {
        let position = match descriptor.kind {
            AssetKind::Plain => return Err(AssetIndexError::NotASequenceAsset(descriptor.asset)),
            AssetKind::Source => self.add_source(descriptor.asset),
            AssetKind::Variant { source: None } => {
                return Err(AssetIndexError::MissingSource {
                    variant: descriptor.asset,
                })
            }
            AssetKind::Variant { source: Some(source) } => {
                let position = self.add_source(source);
                let entry = &mut self.entries[position];
                if !entry.variants.contains(&descriptor.asset) {
                    entry.variants.push(descriptor.asset);
                }
                position
            }
        };
        self.changed();
        Ok(position)
    }

    /// Variants of a source. Unindexed sources have none
    pub fn variants(&self, descriptor: &AssetDescriptor) -> Result<&[AssetRef], AssetIndexError> {
        match descriptor.kind {
            AssetKind::Source => Ok(self
                .index_of(descriptor.asset)
                .map(|i| self.entries[i].variants.as_slice())
                .unwrap_or_default()),
            _ => Err(AssetIndexError::NotASource(descriptor.asset)),
        }
    }

    /// Whether a source has at least one variant
    pub fn has_variants(&self, descriptor: &AssetDescriptor) -> Result<bool, AssetIndexError> {
        self.variants(descriptor).map(|v| !v.is_empty())
    }

    /// Drop sources and variants that no longer exist. Returns whether
    /// anything was removed
    pub fn prune(&mut self, exists: impl Fn(AssetRef) -> bool) -> bool {
        let before: usize = self.entries.iter().map(|e| 1 + e.variants.len()).sum();
        self.entries.retain(|e| exists(e.source));
        for entry in &mut self.entries {
            entry.variants.retain(|v| exists(*v));
        }
        let after: usize = self.entries.iter().map(|e| 1 + e.variants.len()).sum();

        let changed = after != before;
        if changed {
            self.changed();
        }
        changed
    }

    /// Re-save and notify, as when indexed assets moved on disk
    pub fn touch(&mut self) {
        self.changed();
    }

    /// Replace the content with the cache file. Returns false if there is
    /// no usable cache
    pub fn load(&mut self) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        if !cache.exists() {
            return false;
        }
        match cache.load::<Vec<AssetEntry>>() {
            Ok(entries) => {
                self.entries = entries;
                true
            }
            Err(e) => {
                tracing::warn!("Ignoring sequence asset cache {:?}: {}", cache.path(), e);
                false
            }
        }
    }

    fn add_source(&mut self, source: AssetRef) -> usize {
        if let Some(position) = self.index_of(source) {
            return position;
        }
        self.entries.push(AssetEntry {
            source,
            variants: Vec::new(),
        });
        self.entries.len() - 1
    }

    fn changed(&mut self) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(&self.entries) {
                tracing::warn!("Failed to write sequence asset cache {:?}: {}", cache.path(), e);
            }
        }
        self.bus.emit(AssetIndexEvent::Changed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_variant_registers_its_source() {
        let mut index = SequenceAssetIndex::in_memory();
        let source = AssetRef::new();
        let variant = AssetRef::new();

        index.add(AssetDescriptor::variant(variant, Some(source))).unwrap();
        index.add(AssetDescriptor::variant(variant, Some(source))).unwrap();
        assert_eq!(index.entries().len(), 1);

        let source = AssetDescriptor::source(source);
        assert_eq!(index.variants(&source).unwrap(), &[variant]);
        assert!(index.has_variants(&source).unwrap());
    }

    #[test]
    fn test_adding_source_twice_keeps_one_entry() {
        let mut index = SequenceAssetIndex::in_memory();
        let first = AssetRef::new();
        let second = AssetRef::new();
        assert_eq!(index.add(AssetDescriptor::source(first)).unwrap(), 0);
        assert_eq!(index.add(AssetDescriptor::source(second)).unwrap(), 1);
        assert_eq!(index.add(AssetDescriptor::source(first)).unwrap(), 0);
        assert_eq!(index.entries().len(), 2);
    }

    #[test]
    fn test_errors() {
        let mut index = SequenceAssetIndex::in_memory();
        let plain = AssetDescriptor {
            asset: AssetRef::new(),
            kind: AssetKind::Plain,
        };
        assert_eq!(
            index.add(plain),
            Err(AssetIndexError::NotASequenceAsset(plain.asset))
        );

        let orphan = AssetDescriptor::variant(AssetRef::new(), None);
        assert_eq!(
            index.add(orphan),
            Err(AssetIndexError::MissingSource { variant: orphan.asset })
        );
        assert_eq!(
            index.variants(&orphan),
            Err(AssetIndexError::NotASource(orphan.asset))
        );
        assert!(index.entries().is_empty());
    }

    #[test]
    fn test_prune_removes_deleted_assets() {
        let mut index = SequenceAssetIndex::in_memory();
        let (kept, gone_source) = (AssetRef::new(), AssetRef::new());
        let (kept_variant, gone_variant) = (AssetRef::new(), AssetRef::new());
        index.add(AssetDescriptor::variant(kept_variant, Some(kept))).unwrap();
        index.add(AssetDescriptor::variant(gone_variant, Some(kept))).unwrap();
        index.add(AssetDescriptor::source(gone_source)).unwrap();
        index.bus().poll();

        let alive: HashSet<AssetRef> = [kept, kept_variant].into_iter().collect();
        assert!(index.prune(|a| alive.contains(&a)));
        assert_eq!(index.bus().poll(), vec![AssetIndexEvent::Changed]);
        assert_eq!(
            index.entries(),
            &[AssetEntry {
                source: kept,
                variants: vec![kept_variant]
            }]
        );
        assert!(!index.prune(|a| alive.contains(&a)));
    }

    #[test]
    fn test_cache_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let source = AssetRef::new();
        let variant = AssetRef::new();
        {
            let mut index = SequenceAssetIndex::for_project(dir.path());
            index.add(AssetDescriptor::variant(variant, Some(source))).unwrap();
        }

        let index = SequenceAssetIndex::for_project(dir.path());
        let source = AssetDescriptor::source(source);
        assert_eq!(index.variants(&source).unwrap(), &[variant]);
    }
}
