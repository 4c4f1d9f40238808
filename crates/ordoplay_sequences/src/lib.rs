// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequence hierarchy index for OrdoPlay projects.
//!
//! This crate keeps a persistent index of nested sequences:
//! - Master sequences rooting a composition
//! - Sequences and shots nested through editorial clips
//! - Validity flags for nodes whose timelines went missing
//! - Change notifications for editor views
//!
//! ## Architecture
//!
//! The index is built on:
//! - A [`BackingStore`] that owns the actual timelines
//! - A node arena with ID links ([`NodeTable`])
//! - A traversal that reconciles timelines with the index
//! - An [`EventBus`] with scoped suppression
//! - A RON cache under `Library/`

pub mod asset_index;
pub mod backing;
pub mod cache;
pub mod error;
pub mod events;
pub mod index;
pub mod indexer;
pub mod intents;
pub mod legacy;
pub mod master;
pub mod memory_store;
pub mod node;
pub mod traversal;
pub mod validity;

pub use asset_index::{
    AssetDescriptor, AssetEntry, AssetIndexEvent, AssetKind, AssetRef, SequenceAssetIndex,
};
pub use backing::{
    AssumeInstantiated, BackingRef, BackingStore, ClipKind, ClipRef, EditorialClip, EditorialRef,
    EditorialTrack, SceneProbe, SharedScene,
};
pub use cache::CacheFile;
pub use error::{AssetIndexError, AuthoringError, CacheError, IndexError, Result};
pub use events::{BusEvent, EventBus, IndexEvent, SubscriptionId, SuppressionGuard};
pub use index::SequenceIndex;
pub use indexer::{AssetChanges, IndexerConfig, SequenceIndexer};
pub use intents::SequenceAuthoring;
pub use legacy::{
    repair_legacy_editorial_links, LegacyLayout, LegacyMasterTimelines, LegacyRepair,
    NoLegacyLayouts,
};
pub use master::{ManagedSequence, MasterSequence, SequenceManager};
pub use memory_store::MemoryStore;
pub use node::{validate_name, NodeDraft, NodeId, NodeKind, NodeTable, SequenceNode};
pub use traversal::{reconcile, traverse, ReconcileReport, TraversalOutcome};
pub use validity::{EditAction, EditionStatus, Validity, ValidityEngine};
