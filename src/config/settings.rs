//! YAML settings: storage backend, retry policy, cache TTLs and the command
//! executor for each action type.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::sync::{RetryPolicy, MAX_DELAY_MS};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Durable store settings.
    pub storage: StorageConfig,
    /// Retry and backoff policy for queued actions.
    pub retry: RetryPolicy,
    /// Read cache settings.
    pub cache: CacheConfig,
    /// Command executors, keyed by action type.
    pub executors: BTreeMap<String, CommandSpec>,
}

/// Terminal output settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Format used when `--output` is not given.
    pub default_output: OutputFormat,
    /// When to emit ANSI colors.
    pub color: ColorSetting,
}

/// Color output setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorSetting {
    /// Auto-detect based on terminal.
    #[default]
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

impl ColorSetting {
    /// Apply this setting to the global `colored` override.
    pub fn apply(self) {
        match self {
            Self::Auto => colored::control::unset_override(),
            Self::Always => colored::control::set_override(true),
            Self::Never => colored::control::set_override(false),
        }
    }
}

/// Which durable backend to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Embedded `SQLite` database.
    #[default]
    Sqlite,
    /// JSON documents in a directory.
    File,
    /// Volatile memory (nothing survives a restart).
    Memory,
}

/// Durable store settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend selection.
    pub backend: StorageBackend,
    /// Override for the database file or store directory.
    pub path: Option<PathBuf>,
}

/// Read cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a write does not specify one. `None` means sticky.
    #[serde(default = "default_ttl_minutes")]
    pub default_ttl_minutes: Option<u32>,
    /// How often a long-running host sweeps expired entries.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_minutes: u32,
}

/// An external command that performs one action type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to run; receives the payload as JSON on stdin.
    pub command: String,
    /// Extra arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Kill the command and report a timeout after this many seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether actions of this type may be dispatched concurrently.
    #[serde(default)]
    pub parallel: bool,
}

#[allow(clippy::unnecessary_wraps)]
const fn default_ttl_minutes() -> Option<u32> {
    Some(60)
}

const fn default_sweep_interval() -> u32 {
    15
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_minutes: default_ttl_minutes(),
            sweep_interval_minutes: default_sweep_interval(),
        }
    }
}

impl Config {
    /// Read and validate the YAML file at `path`. A missing file yields the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` if the file is unreadable, malformed or
    /// fails [`Config::validate`].
    pub fn load_from_path(path: &Path) -> Result<Self, SyncError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(SyncError::Config(format!("cannot read {}: {e}", path.display())))
            },
        };

        let config: Self = serde_yaml::from_str(&contents)
            .map_err(|e| SyncError::Config(format!("invalid YAML in {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` if serialization or the write fails.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SyncError> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| SyncError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, yaml)
            .map_err(|e| SyncError::Config(format!("cannot write {}: {e}", path.display())))
    }

    /// Reject settings the engine cannot honour.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` describing the first invalid setting.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.retry.max_attempts == 0 {
            return Err(SyncError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.max_delay_ms > MAX_DELAY_MS {
            return Err(SyncError::Config(format!(
                "retry.max_delay_ms must be at most {MAX_DELAY_MS}"
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(SyncError::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(SyncError::Config(
                "retry.multiplier must be >= 1.0".to_string(),
            ));
        }
        for (action_type, spec) in &self.executors {
            if spec.command.trim().is_empty() {
                return Err(SyncError::Config(format!(
                    "executors.{action_type}.command is empty"
                )));
            }
        }
        Ok(())
    }
}
