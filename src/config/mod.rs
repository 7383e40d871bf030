//! Configuration management for offline-sync.
//!
//! This module handles loading and saving configuration from `~/.offline-sync/`.

mod paths;
mod settings;

pub use paths::{Paths, ROOT_ENV};
pub use settings::{
    CacheConfig, ColorSetting, CommandSpec, Config, GeneralConfig, StorageBackend, StorageConfig,
};
