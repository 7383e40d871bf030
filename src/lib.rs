//! offline-sync - offline resilience for client applications
//!
//! This crate keeps an application usable while disconnected: mutating
//! actions are queued durably and dispatched in priority order once the
//! network returns, and read results are served from an expiring cache.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod output;
pub mod storage;
pub mod sync;

pub use cache::{CacheEntry, CacheResult, CacheSource, OfflineCache};
pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::{StorageError, SyncError};
pub use storage::KeyValueStore;
pub use sync::{
    ActionExecutor, ActionOutcome, ActionStatus, DrainReport, ExecutorError, ExecutorRegistry,
    PendingAction, Priority, RetryPolicy, SyncEvent, SyncOrchestrator, SyncStatus,
};
