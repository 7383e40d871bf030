//! Status, events and drain results published by the orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::action::{ActionId, Priority};
use super::executor::ExecutorError;

/// Consumer-facing status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Whether the host reports connectivity
    pub is_online: bool,
    /// Whether a drain is running
    pub is_syncing: bool,
    /// Queued entries, any status
    pub pending_actions_count: usize,
    /// Entries waiting for a manual retry
    pub failed_actions_count: usize,
    /// When the last drain finished
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Whether the durable store failed and the session runs in memory
    pub storage_degraded: bool,
}

/// Result of one drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Entries claimed and dispatched
    pub processed: usize,
    /// Entries dispatched successfully and removed
    pub succeeded: usize,
    /// Entries returned to PENDING after a retryable failure
    pub retried: usize,
    /// Entries moved to FAILED
    pub failed: usize,
    /// Entries left PENDING because no executor handles their type
    pub deferred: usize,
    /// The drain did not run because the host is offline
    pub skipped_offline: bool,
    /// Drain start
    pub started_at: DateTime<Utc>,
    /// Drain end
    pub finished_at: DateTime<Utc>,
}

impl DrainReport {
    /// An empty report for a drain starting at `now`.
    #[must_use]
    pub const fn started(now: DateTime<Utc>) -> Self {
        Self {
            processed: 0,
            succeeded: 0,
            retried: 0,
            failed: 0,
            deferred: 0,
            skipped_offline: false,
            started_at: now,
            finished_at: now,
        }
    }

    /// A report for a drain skipped while offline.
    #[must_use]
    pub const fn offline(now: DateTime<Utc>) -> Self {
        Self {
            skipped_offline: true,
            ..Self::started(now)
        }
    }

    pub(crate) fn record(&mut self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Skipped => return,
            Dispatch::Synced => self.succeeded += 1,
            Dispatch::Retrying => self.retried += 1,
            Dispatch::Failed => self.failed += 1,
            Dispatch::Deferred => self.deferred += 1,
        }
        self.processed += 1;
    }
}

/// What happened to one entry during a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Removed from the queue
    Synced,
    /// Back to PENDING with one more attempt counted
    Retrying,
    /// Moved to FAILED
    Failed,
    /// Back to PENDING, no executor registered
    Deferred,
    /// Not claimable any more, or removed while it ran
    Skipped,
}

/// Eventual outcome of one queued action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Dispatched and removed from the queue
    Synced,
    /// Moved to FAILED; needs a manual retry
    Failed(ExecutorError),
    /// Removed by a queue clear before it was dispatched
    Cleared,
}

/// Push notifications for queue and connectivity changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A new action was persisted
    ActionQueued {
        /// Action ID
        id: ActionId,
        /// Action type
        action_type: String,
        /// Dispatch priority
        priority: Priority,
    },
    /// An action was dispatched and removed
    ActionSynced {
        /// Action ID
        id: ActionId,
        /// Action type
        action_type: String,
    },
    /// An action failed and will be retried
    ActionRetrying {
        /// Action ID
        id: ActionId,
        /// Failed attempts so far
        attempts: u32,
        /// Earliest next dispatch
        next_attempt_at: DateTime<Utc>,
        /// Failure message
        error: String,
    },
    /// An action moved to FAILED
    ActionFailed {
        /// Action ID
        id: ActionId,
        /// Failed attempts so far
        attempts: u32,
        /// Failure message
        error: String,
    },
    /// A drain began
    DrainStarted {
        /// Entries in the drain snapshot
        eligible: usize,
    },
    /// A drain ended
    DrainFinished(DrainReport),
    /// Every queued action was removed
    QueueCleared {
        /// Number of removed entries
        removed: usize,
    },
    /// The host reported a connectivity change
    ConnectivityChanged {
        /// New connectivity state
        online: bool,
    },
    /// The durable store failed; the session continues in memory
    StorageDegraded,
}
