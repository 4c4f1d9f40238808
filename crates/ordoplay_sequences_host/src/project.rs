// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host settings stored next to the project's assets.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Settings file name, relative to the project root
pub const SETTINGS_FILE_NAME: &str = "sequences.ron";

/// How the host drives the index for one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    /// Settings format version
    pub version: u32,
    /// Period of the validity refresh in watch mode
    pub tick_interval_ms: u64,
    /// Quiet period before filesystem events are delivered
    pub debounce_ms: u64,
    /// Directory holding timeline and master sequence files
    pub assets_dir: PathBuf,
    /// Directory holding caches
    pub library_dir: PathBuf,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            tick_interval_ms: 500,
            debounce_ms: 250,
            assets_dir: PathBuf::from("Assets"),
            library_dir: PathBuf::from(ordoplay_sequences::cache::LIBRARY_DIR_NAME),
        }
    }
}

impl HostSettings {
    /// Load settings from a file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: HostSettings = ron::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Settings version {} is newer than supported version {}",
                    settings.version, SETTINGS_FORMAT_VERSION
                ),
            ));
        }

        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        let content = ron::ser::to_string_pretty(self, config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }

    /// Settings of a project, or the defaults when it has no settings file
    pub fn load_or_default(project_dir: &Path) -> std::io::Result<Self> {
        let path = Self::path_in(project_dir);
        if !path.is_file() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// Location of the settings file in a project
    pub fn path_in(project_dir: &Path) -> PathBuf {
        project_dir.join(SETTINGS_FILE_NAME)
    }

    /// Absolute assets directory
    pub fn assets_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.assets_dir)
    }

    /// Absolute library directory
    pub fn library_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.library_dir)
    }

    /// Validity refresh period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Watcher debounce period
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = HostSettings::load_or_default(dir.path()).unwrap();
        assert_eq!(settings, HostSettings::default());
        assert_eq!(settings.assets_path(dir.path()), dir.path().join("Assets"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let settings = HostSettings {
            tick_interval_ms: 1000,
            assets_dir: PathBuf::from("Content"),
            ..HostSettings::default()
        };
        settings.save(&HostSettings::path_in(dir.path())).unwrap();

        let loaded = HostSettings::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let settings = HostSettings {
            version: SETTINGS_FORMAT_VERSION + 1,
            ..HostSettings::default()
        };
        settings.save(&HostSettings::path_in(dir.path())).unwrap();
        assert!(HostSettings::load_or_default(dir.path()).is_err());
    }
}
