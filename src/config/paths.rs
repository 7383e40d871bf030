//! Path resolution for offline-sync configuration and data files.
//!
//! All data is stored in `~/.offline-sync/`:
//! - `config.yaml` - Main configuration file
//! - `offline.db` - SQLite store for queued actions and cached data
//! - `store/` - JSON documents when the file backend is selected

use std::path::PathBuf;

use crate::error::SyncError;

/// Environment variable overriding the root directory.
pub const ROOT_ENV: &str = "OFFLINE_SYNC_HOME";

/// Paths to configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.offline-sync/`
    pub root: PathBuf,
    /// Config file: `~/.offline-sync/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.offline-sync/offline.db`
    pub database: PathBuf,
    /// File backend directory: `~/.offline-sync/store/`
    pub store_dir: PathBuf,
}

impl Paths {
    /// Resolve paths from `$OFFLINE_SYNC_HOME`, falling back to the user's
    /// home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn new() -> Result<Self, SyncError> {
        if let Ok(root) = std::env::var(ROOT_ENV) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = std::env::var("HOME")
            .map_err(|_| SyncError::Config("Could not determine home directory".to_string()))?;

        Ok(Self::with_root(PathBuf::from(home).join(".offline-sync")))
    }

    /// Create paths with a custom root directory (useful for testing).
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("offline.db"),
            store_dir: root.join("store"),
            root,
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), SyncError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                SyncError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }
        Ok(())
    }
}
