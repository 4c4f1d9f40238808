// SPDX-License-Identifier: MIT OR Apache-2.0
//! Project-local cache files.
//!
//! Caches are advisory. Every reader of a [`CacheFile`] must be able to
//! rebuild its content from the backing store, so a missing, unreadable or
//! newer-format file is simply reported as an error for the caller to log.

use crate::error::CacheError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current cache format version
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Directory under the project root that holds caches
pub const LIBRARY_DIR_NAME: &str = "Library";

/// Sequence hierarchy cache file name
pub const SEQUENCE_CACHE_FILE_NAME: &str = "SequenceCache.index";

/// Sequence-asset cache file name
pub const ASSET_CACHE_FILE_NAME: &str = "QuickSequenceAsset.index";

#[derive(Serialize)]
#[serde(rename = "CacheEnvelope")]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
#[serde(rename = "CacheEnvelope")]
struct Envelope<T> {
    version: u32,
    data: T,
}

/// A versioned RON file holding one cached value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    /// Cache stored at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache stored at `<project>/Library/<file_name>`
    pub fn in_project(project_dir: &Path, file_name: &str) -> Self {
        Self::new(project_dir.join(LIBRARY_DIR_NAME).join(file_name))
    }

    /// File location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is present on disk
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and decode the cached value
    pub fn load<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })?;
        let envelope: Envelope<T> = ron::from_str(&content)?;

        if envelope.version > CACHE_FORMAT_VERSION {
            return Err(CacheError::UnsupportedVersion {
                found: envelope.version,
                supported: CACHE_FORMAT_VERSION,
            });
        }

        Ok(envelope.data)
    }

    /// Encode and write the value, creating parent directories as needed
    pub fn save<T: Serialize>(&self, data: &T) -> Result<(), CacheError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        let content = ron::ser::to_string_pretty(
            &EnvelopeRef {
                version: CACHE_FORMAT_VERSION,
                data,
            },
            config,
        )?;

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| CacheError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, content).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Delete the file if present
    pub fn remove(&self) -> Result<(), CacheError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        names: Vec<String>,
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheFile::in_project(dir.path(), SEQUENCE_CACHE_FILE_NAME);
        assert!(!cache.exists());

        let sample = Sample { names: vec!["Master".to_string(), "Shot".to_string()] };
        cache.save(&sample).unwrap();
        assert!(cache.exists());
        assert_eq!(cache.load::<Sample>().unwrap(), sample);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheFile::in_project(dir.path(), SEQUENCE_CACHE_FILE_NAME);
        assert!(matches!(cache.load::<Sample>(), Err(CacheError::Io { .. })));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheFile::new(dir.path().join("broken.index"));
        std::fs::write(cache.path(), "(version: 1, data: [oops").unwrap();
        assert!(matches!(cache.load::<Sample>(), Err(CacheError::Parse(_))));
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheFile::new(dir.path().join("future.index"));
        std::fs::write(cache.path(), "(version: 99, data: (names: []))").unwrap();
        assert!(matches!(
            cache.load::<Sample>(),
            Err(CacheError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheFile::new(dir.path().join("gone.index"));
        cache.save(&Sample { names: Vec::new() }).unwrap();
        cache.remove().unwrap();
        cache.remove().unwrap();
        assert!(!cache.exists());
    }
}
