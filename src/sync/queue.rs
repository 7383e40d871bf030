//! Durable pending-action queue.
//!
//! Stores actions in the `pending-actions` collection and hands them out in
//! dispatch order. Every read-modify-write runs under one lock so a claimed
//! entry cannot be claimed again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::action::{ActionId, ActionStatus, PendingAction, Priority};
use crate::core::Clock;
use crate::error::SyncError;
use crate::storage::{Collection, KeyValueStore, Record};

const COLLECTION: Collection = Collection::PendingActions;

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Entries waiting for a drain
    pub pending: usize,
    /// Entries claimed by a running drain
    pub syncing: usize,
    /// Entries excluded from automatic drains
    pub failed: usize,
    /// Total entries
    pub total: usize,
    /// Creation time of the oldest entry
    pub oldest: Option<DateTime<Utc>>,
}

/// Ordered, durable queue of pending actions.
pub struct PendingQueue {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    next_seq: AtomicU64,
    write_lock: Mutex<()>,
}

impl PendingQueue {
    /// Open the queue over `store`.
    ///
    /// The id sequence continues after the largest id already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored keys cannot be read.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Result<Self, SyncError> {
        let last_seq = store
            .keys(COLLECTION)?
            .iter()
            .filter_map(|key| key.parse::<ActionId>().ok())
            .map(ActionId::seq)
            .max()
            .unwrap_or(0);

        Ok(Self {
            store,
            clock,
            next_seq: AtomicU64::new(last_seq + 1),
            write_lock: Mutex::new(()),
        })
    }

    /// The store this queue writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, action: &PendingAction) -> Result<(), SyncError> {
        let value = serde_json::to_string(action)?;
        self.store.put(
            COLLECTION,
            Record::new(action.id.to_string(), action.index(), value),
        )?;
        Ok(())
    }

    fn load(&self, id: ActionId) -> Result<Option<PendingAction>, SyncError> {
        match self.store.get(COLLECTION, &id.to_string())? {
            Some(record) => Ok(Some(serde_json::from_str(&record.value)?)),
            None => Ok(None),
        }
    }

    /// Apply `change` to a stored entry if `applies` accepts it.
    ///
    /// Missing entries are never written back.
    fn update(
        &self,
        id: ActionId,
        applies: impl Fn(&PendingAction) -> bool,
        change: impl FnOnce(&mut PendingAction),
    ) -> Result<Option<PendingAction>, SyncError> {
        let _guard = self.lock();
        let Some(mut action) = self.load(id)? else {
            return Ok(None);
        };
        if !applies(&action) {
            return Ok(None);
        }
        change(&mut action);
        self.save(&action)?;
        Ok(Some(action))
    }

    /// Persist a new PENDING action.
    ///
    /// # Errors
    ///
    /// Returns an error if the action cannot be stored.
    pub fn add(
        &self,
        action_type: &str,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<PendingAction, SyncError> {
        let action_type = action_type.trim();
        if action_type.is_empty() {
            return Err(SyncError::InvalidInput(
                "Action type must not be empty".to_string(),
            ));
        }

        let now = self.clock.now();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let action = PendingAction::new(
            ActionId::new(seq, now.timestamp_millis()),
            action_type,
            payload,
            priority,
            now,
        );

        let _guard = self.lock();
        self.save(&action)?;
        debug!(action_id = %action.id, action_type = %action.action_type, "Queued action");
        Ok(action)
    }

    /// Get one action by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails or the entry is unreadable.
    pub fn get(&self, id: ActionId) -> Result<Option<PendingAction>, SyncError> {
        self.load(id)
    }

    /// Snapshot of every entry, in dispatch order.
    ///
    /// Unreadable entries are logged and left in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn list(&self) -> Result<Vec<PendingAction>, SyncError> {
        let mut actions: Vec<PendingAction> = self
            .store
            .get_all(COLLECTION)?
            .into_iter()
            .filter_map(|record| match serde_json::from_str(&record.value) {
                Ok(action) => Some(action),
                Err(e) => {
                    warn!(key = %record.key, error = %e, "Skipping unreadable queued action");
                    None
                },
            })
            .collect();
        actions.sort_by(PendingAction::dispatch_order);
        Ok(actions)
    }

    /// Entries with the given status, in dispatch order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn by_status(&self, status: ActionStatus) -> Result<Vec<PendingAction>, SyncError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|a| a.status == status)
            .collect())
    }

    /// PENDING entries whose backoff has elapsed at `now`, in dispatch order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn eligible(&self, now: DateTime<Utc>) -> Result<Vec<PendingAction>, SyncError> {
        Ok(self.list()?.into_iter().filter(|a| a.is_due(now)).collect())
    }

    /// Number of queued entries, any status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn count(&self) -> Result<usize, SyncError> {
        Ok(self.store.keys(COLLECTION)?.len())
    }

    /// Move a PENDING entry to SYNCING.
    ///
    /// Returns `None` if the entry is gone or not PENDING.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or write fails.
    pub fn claim(&self, id: ActionId) -> Result<Option<PendingAction>, SyncError> {
        let now = self.clock.now();
        self.update(
            id,
            |a| a.status == ActionStatus::Pending,
            |a| {
                a.status = ActionStatus::Syncing;
                a.last_attempt = Some(now);
            },
        )
    }

    /// Remove a successfully dispatched entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn complete(&self, id: ActionId) -> Result<bool, SyncError> {
        let _guard = self.lock();
        Ok(self.store.delete(COLLECTION, &id.to_string())?)
    }

    /// Record a retryable failure and return the entry to PENDING.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or write fails.
    pub fn release_for_retry(
        &self,
        id: ActionId,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<Option<PendingAction>, SyncError> {
        self.update(
            id,
            |a| a.status == ActionStatus::Syncing,
            |a| {
                a.attempts += 1;
                a.status = ActionStatus::Pending;
                a.last_error = Some(error.to_string());
                a.next_attempt_at = Some(next_attempt_at);
            },
        )
    }

    /// Move a SYNCING entry to FAILED.
    ///
    /// `consume_attempt` counts this dispatch against the retry budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or write fails.
    pub fn mark_failed(
        &self,
        id: ActionId,
        error: &str,
        consume_attempt: bool,
    ) -> Result<Option<PendingAction>, SyncError> {
        self.update(
            id,
            |a| a.status == ActionStatus::Syncing,
            |a| {
                if consume_attempt {
                    a.attempts += 1;
                }
                a.status = ActionStatus::Failed;
                a.last_error = Some(error.to_string());
                a.next_attempt_at = None;
            },
        )
    }

    /// Return a SYNCING entry to PENDING without consuming an attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or write fails.
    pub fn release_unclaimed(
        &self,
        id: ActionId,
        reason: &str,
    ) -> Result<Option<PendingAction>, SyncError> {
        self.update(
            id,
            |a| a.status == ActionStatus::Syncing,
            |a| {
                a.status = ActionStatus::Pending;
                a.last_error = Some(reason.to_string());
            },
        )
    }

    /// Reset a FAILED entry to PENDING with a fresh retry budget.
    ///
    /// Returns `false` if the entry is not FAILED.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if no entry has this ID.
    pub fn retry(&self, id: ActionId) -> Result<bool, SyncError> {
        let _guard = self.lock();
        let Some(mut action) = self.load(id)? else {
            return Err(SyncError::NotFound(format!("Action {id}")));
        };
        if action.status != ActionStatus::Failed {
            return Ok(false);
        }
        action.status = ActionStatus::Pending;
        action.attempts = 0;
        action.next_attempt_at = None;
        self.save(&action)?;
        Ok(true)
    }

    /// Reset every FAILED entry. Returns how many were reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or write fails.
    pub fn retry_all_failed(&self) -> Result<usize, SyncError> {
        let failed = self.by_status(ActionStatus::Failed)?;
        let mut reset = 0;
        for action in failed {
            if self.retry(action.id)? {
                reset += 1;
            }
        }
        Ok(reset)
    }

    /// Return entries left SYNCING by an interrupted process to PENDING.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or write fails.
    pub fn recover_interrupted(&self) -> Result<usize, SyncError> {
        let interrupted = self.by_status(ActionStatus::Syncing)?;
        let mut recovered = 0;
        for action in interrupted {
            let reset = self.update(
                action.id,
                |a| a.status == ActionStatus::Syncing,
                |a| a.status = ActionStatus::Pending,
            )?;
            if reset.is_some() {
                warn!(action_id = %action.id, action_type = %action.action_type, "Recovered interrupted action");
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    /// Delete one entry regardless of status.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove(&self, id: ActionId) -> Result<bool, SyncError> {
        self.complete(id)
    }

    /// Delete every entry. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> Result<usize, SyncError> {
        let _guard = self.lock();
        Ok(self.store.clear(COLLECTION)?)
    }

    /// Counts per status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn stats(&self) -> Result<QueueStats, SyncError> {
        let actions = self.list()?;
        let mut stats = QueueStats {
            total: actions.len(),
            oldest: actions.iter().map(|a| a.created_at).min(),
            ..QueueStats::default()
        };
        for action in &actions {
            match action.status {
                ActionStatus::Pending => stats.pending += 1,
                ActionStatus::Syncing => stats.syncing += 1,
                ActionStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}
