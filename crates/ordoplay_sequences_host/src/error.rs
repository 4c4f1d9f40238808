// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host error type.

use ordoplay_sequences::{BackingRef, IndexError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the host binary
#[derive(Debug, Error)]
pub enum HostError {
    /// The project directory does not exist
    #[error("Project directory not found: {0:?}")]
    ProjectNotFound(PathBuf),

    /// Reading or writing a project file failed
    #[error("I/O error at {path:?}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// `sequences.ron` could not be used
    #[error("Invalid host settings at {path:?}: {source}")]
    Settings {
        /// Settings file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// A timeline or master sequence file could not be encoded
    #[error("Cannot write store file {path:?}: {message}")]
    StoreFile {
        /// Offending file
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// No indexed sequence stands for this timeline
    #[error("Timeline {0} is not an indexed sequence")]
    UnindexedTimeline(BackingRef),

    /// The filesystem watcher failed
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// An index operation failed
    #[error(transparent)]
    Index(#[from] IndexError),

    /// JSON rendering failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HostError {
    /// Attach a path to an I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HostError::Io {
            path: path.into(),
            source,
        }
    }
}
