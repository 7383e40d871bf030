//! Durable key-value storage.
//!
//! One [`KeyValueStore`] contract with pluggable backends:
//! - [`SqliteStore`]: embedded database for production hosts
//! - [`FileStore`]: JSON documents for hosts without `SQLite`
//! - [`MemoryStore`]: volatile, for tests and degraded sessions
//!
//! [`open`] wraps the configured backend in a [`FallbackStore`] so a failing
//! store degrades the session instead of taking the host down.

mod database;
mod fallback;
mod file;
mod kv;
mod memory;
mod migrations;
mod sqlite;

use std::sync::Arc;

pub use database::Database;
pub use fallback::FallbackStore;
pub use file::FileStore;
pub use kv::{Collection, KeyValueStore, Record, StorageError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::{Paths, StorageBackend, StorageConfig};

/// Open the store described by `config`.
///
/// Never fails: if the durable backend cannot be opened the error is logged
/// and the returned store runs in memory, reporting
/// [`KeyValueStore::is_degraded`].
#[must_use]
pub fn open(config: &StorageConfig, paths: &Paths) -> Arc<dyn KeyValueStore> {
    let opened: Result<Box<dyn KeyValueStore>, StorageError> = match config.backend {
        StorageBackend::Sqlite => {
            let path = config.path.clone().unwrap_or_else(|| paths.database.clone());
            SqliteStore::open(&path).map(|s| Box::new(s) as Box<dyn KeyValueStore>)
        },
        StorageBackend::File => {
            let dir = config.path.clone().unwrap_or_else(|| paths.store_dir.clone());
            FileStore::open(&dir).map(|s| Box::new(s) as Box<dyn KeyValueStore>)
        },
        StorageBackend::Memory => Ok(Box::new(MemoryStore::new())),
    };

    match opened {
        Ok(store) => Arc::new(FallbackStore::new(store)),
        Err(e) => {
            tracing::error!(
                backend = ?config.backend,
                error = %e,
                "failed to open durable store, running in memory for this session"
            );
            Arc::new(FallbackStore::degraded())
        },
    }
}
