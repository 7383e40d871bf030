//! Offline action queue and sync orchestration.
//!
//! Mutations issued while offline are persisted as [`PendingAction`]s and
//! drained through registered executors once the host is online:
//! - Dispatch in priority order, then creation time, then id
//! - At most one drain at a time; concurrent triggers join it
//! - Bounded retry with exponential backoff for transient failures
//! - Permanent failures kept as FAILED for manual retry

mod action;
mod events;
mod executor;
mod orchestrator;
mod queue;
mod retry;
mod triggers;

pub use action::{ActionId, ActionStatus, PendingAction, Priority};
pub use events::{ActionOutcome, DrainReport, SyncEvent, SyncStatus};
pub use executor::{ActionExecutor, CommandExecutor, ExecutorError, ExecutorRegistry, FnExecutor};
pub use orchestrator::{QueuedAction, SyncOrchestrator, SyncOrchestratorBuilder};
pub use queue::{PendingQueue, QueueStats};
pub use retry::{RetryPolicy, MAX_DELAY_MS};
pub use triggers::{spawn_cache_sweeper, BackgroundSync, NoopBackgroundSync, SYNC_TAG};
