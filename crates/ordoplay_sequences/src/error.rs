// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types.
//!
//! Absence is never an error in this crate: lookups return `Option`, missing
//! timelines become validity flags. What remains are caller mistakes
//! (bad arguments, forbidden edits) and failures of the write-side store.

use crate::asset_index::AssetRef;
use crate::node::NodeId;
use crate::validity::EditAction;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by index operations that act on behalf of a caller
#[derive(Debug, Error)]
pub enum IndexError {
    /// The argument cannot be acted on as given
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The node's current validity forbids the edit
    #[error("Cannot {action} sequence {node:?} in its current state")]
    NotPermitted {
        /// Attempted edit
        action: EditAction,
        /// Target node
        node: NodeId,
    },

    /// No node with this ID is indexed
    #[error("Unknown sequence node: {0:?}")]
    UnknownNode(NodeId),

    /// The asset layer failed to apply the edit
    #[error(transparent)]
    Authoring(#[from] AuthoringError),
}

/// Failure reported by the write-side asset layer
#[derive(Debug, Error)]
pub enum AuthoringError {
    /// Target timeline does not exist anymore
    #[error("Timeline not found: {0}")]
    NotFound(String),

    /// Storage failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else the asset layer wants to report
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the sequence-asset index
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssetIndexError {
    /// The asset lacks the sequence-asset marker
    #[error("Asset {0:?} is not a Sequence Asset")]
    NotASequenceAsset(AssetRef),

    /// The asset is a variant (or not a sequence asset) where a source is required
    #[error("Asset {0:?} is not a Sequence Asset source")]
    NotASource(AssetRef),

    /// A variant points at a source that cannot be resolved
    #[error("Variant {variant:?} has no resolvable source")]
    MissingSource {
        /// The offending variant
        variant: AssetRef,
    },
}

/// Cache persistence errors. Never leave the crate past a log line
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the file failed
    #[error("Cache I/O error at {path:?}: {source}")]
    Io {
        /// Cache file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not valid RON for the expected layout
    #[error("Cache parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serialization failed
    #[error("Cache serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// Written by a newer version of the format
    #[error("Cache version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Highest version this build reads
        supported: u32,
    },

    /// Content parsed but is structurally inconsistent
    #[error("Cache content is inconsistent: {0}")]
    Inconsistent(String),
}

/// Result type for index operations
pub type Result<T> = std::result::Result<T, IndexError>;
