//! Key-value store contract shared by every backend.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a durable store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The store cannot be opened or reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The store refused a write because it ran out of space.
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Stored data is unreadable.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Filesystem I/O failed.
    #[error("storage I/O failed: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DiskFull) => Self::QuotaExceeded(e.to_string()),
            Some(rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase) => {
                Self::Corrupted(e.to_string())
            },
            _ => Self::Unavailable(e.to_string()),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// A named collection inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    /// Queued mutating actions, keyed by action id.
    PendingActions,
    /// Cached read results, keyed by caller-chosen key.
    CachedData,
}

impl Collection {
    /// Every collection, in a stable order.
    pub const ALL: [Self; 2] = [Self::PendingActions, Self::CachedData];

    /// Stable on-disk name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PendingActions => "pending-actions",
            Self::CachedData => "cached-data",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One stored value with its secondary sort index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key, unique within the collection.
    pub key: String,
    /// Secondary index; `get_all` orders by it, then by key.
    pub index: String,
    /// Serialized JSON document.
    pub value: String,
}

impl Record {
    /// Build a record.
    #[must_use]
    pub fn new(key: impl Into<String>, index: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            index: index.into(),
            value: value.into(),
        }
    }

    /// Approximate footprint: the serialized value length in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.value.len()
    }
}

/// A crash-surviving key-value store with a secondary sortable index.
///
/// All methods are synchronous; the orchestrator never holds a store call
/// across an executor await.
pub trait KeyValueStore: Send + Sync {
    /// Insert or overwrite a record.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the write fails.
    fn put(&self, collection: Collection, record: Record) -> Result<(), StorageError>;

    /// Fetch a record by key.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the read fails.
    fn get(&self, collection: Collection, key: &str) -> Result<Option<Record>, StorageError>;

    /// All records, ordered by `(index, key)`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the read fails.
    fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StorageError>;

    /// Delete a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the delete fails.
    fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError>;

    /// Delete every record in a collection. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the delete fails.
    fn clear(&self, collection: Collection) -> Result<usize, StorageError>;

    /// All keys, in `get_all` order.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the read fails.
    fn keys(&self, collection: Collection) -> Result<Vec<String>, StorageError> {
        Ok(self
            .get_all(collection)?
            .into_iter()
            .map(|r| r.key)
            .collect())
    }

    /// Short backend name for logs and status output.
    fn backend_name(&self) -> &'static str;

    /// Whether the store has fallen back to volatile memory.
    fn is_degraded(&self) -> bool {
        false
    }
}

/// Sort records the way `get_all` promises.
pub(crate) fn sort_records(records: &mut [Record]) {
    records.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.key.cmp(&b.key)));
}
