//! Error types for offline-sync.
//!
//! Storage failures carry their own [`StorageError`] so callers can tell a
//! broken durable store apart from bad input or configuration. Errors raised
//! by executors for individual actions never surface here: they are recorded
//! on the queued action instead.

use thiserror::Error;

pub use crate::storage::StorageError;

/// Engine-level error.
///
/// `Clone` so that one drain result can be handed to every caller that joined
/// the same in-flight drain.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The durable store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration could not be read, parsed or validated.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored or supplied document could not be (de)serialized.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Filesystem or process I/O failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The requested action or cache entry does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied an invalid argument.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl SyncError {
    /// Whether the error came from the durable store.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
