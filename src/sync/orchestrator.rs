//! Sync orchestrator.
//!
//! Owns the pending queue and drains it through the registered executors.
//! One orchestrator is built per durable store at startup and cloned into
//! every consumer; clones share the same state.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, info, warn};

use super::action::{ActionId, ActionStatus, PendingAction, Priority};
use super::events::{ActionOutcome, Dispatch, DrainReport, SyncEvent, SyncStatus};
use super::executor::{ExecutorError, ExecutorRegistry};
use super::queue::{PendingQueue, QueueStats};
use super::retry::RetryPolicy;
use super::triggers::{BackgroundSync, NoopBackgroundSync, SYNC_TAG};
use crate::cache::OfflineCache;
use crate::core::{Clock, SystemClock};
use crate::error::SyncError;
use crate::storage::KeyValueStore;

const EVENT_CAPACITY: usize = 256;

type DrainFuture = Shared<BoxFuture<'static, Result<DrainReport, SyncError>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Frees the drain slot and the syncing flag however the drain ends.
struct DrainGuard(SyncOrchestrator);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        *lock(&self.0.inner.drain) = None;
        self.0.inner.syncing.store(false, Ordering::SeqCst);
        self.0.refresh_status();
    }
}

/// A freshly queued action with an optional handle on its outcome.
#[derive(Debug)]
pub struct QueuedAction {
    action: PendingAction,
    outcome: oneshot::Receiver<ActionOutcome>,
}

impl QueuedAction {
    /// The persisted action.
    #[must_use]
    pub const fn action(&self) -> &PendingAction {
        &self.action
    }

    /// The action ID.
    #[must_use]
    pub const fn id(&self) -> ActionId {
        self.action.id
    }

    /// Wait until the action is synced, fails permanently or is cleared.
    ///
    /// Resolves to [`ActionOutcome::Cleared`] if the orchestrator goes away
    /// first.
    pub async fn outcome(self) -> ActionOutcome {
        self.outcome.await.unwrap_or(ActionOutcome::Cleared)
    }
}

/// Builder for [`SyncOrchestrator`].
pub struct SyncOrchestratorBuilder {
    store: Arc<dyn KeyValueStore>,
    executors: ExecutorRegistry,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    background: Arc<dyn BackgroundSync>,
    cache: Option<OfflineCache>,
    online: bool,
}

impl SyncOrchestratorBuilder {
    /// Executors to dispatch to.
    #[must_use]
    pub fn executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    /// Retry policy for retryable failures.
    #[must_use]
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Clock used for timestamps and backoff.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Platform background-sync registrar.
    #[must_use]
    pub fn background_sync(mut self, background: Arc<dyn BackgroundSync>) -> Self {
        self.background = background;
        self
    }

    /// Cache to sweep when the host becomes visible again.
    #[must_use]
    pub fn cache(mut self, cache: OfflineCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Initial connectivity; defaults to online.
    #[must_use]
    pub const fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Open the queue and reconcile entries left SYNCING by a previous run.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn build(self) -> Result<SyncOrchestrator, SyncError> {
        let queue = PendingQueue::new(self.store, Arc::clone(&self.clock))?;
        let recovered = queue.recover_interrupted()?;
        if recovered > 0 {
            info!(recovered, "Re-queued actions interrupted by a previous run");
        }

        let (status_tx, _) = watch::channel(SyncStatus {
            is_online: self.online,
            ..SyncStatus::default()
        });
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let orchestrator = SyncOrchestrator {
            inner: Arc::new(Inner {
                queue,
                executors: self.executors,
                retry: self.retry,
                clock: self.clock,
                background: self.background,
                cache: self.cache,
                online: AtomicBool::new(self.online),
                visible: AtomicBool::new(true),
                syncing: AtomicBool::new(false),
                degraded: AtomicBool::new(false),
                last_sync_time: Mutex::new(None),
                drain: Mutex::new(None),
                waiters: Mutex::new(HashMap::new()),
                status_tx,
                events_tx,
            }),
        };
        orchestrator.refresh_status();
        Ok(orchestrator)
    }
}

struct Inner {
    queue: PendingQueue,
    executors: ExecutorRegistry,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    background: Arc<dyn BackgroundSync>,
    cache: Option<OfflineCache>,
    online: AtomicBool,
    visible: AtomicBool,
    syncing: AtomicBool,
    degraded: AtomicBool,
    last_sync_time: Mutex<Option<DateTime<Utc>>>,
    drain: Mutex<Option<DrainFuture>>,
    waiters: Mutex<HashMap<ActionId, oneshot::Sender<ActionOutcome>>>,
    status_tx: watch::Sender<SyncStatus>,
    events_tx: broadcast::Sender<SyncEvent>,
}

/// Coordinates the pending queue, executors, status and triggers.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("executors", &self.inner.executors)
            .field("status", &*self.inner.status_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Start building an orchestrator over `store`.
    #[must_use]
    pub fn builder(store: Arc<dyn KeyValueStore>) -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder {
            store,
            executors: ExecutorRegistry::new(),
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
            background: Arc::new(NoopBackgroundSync),
            cache: None,
            online: true,
        }
    }

    /// The underlying queue.
    #[must_use]
    pub fn queue(&self) -> &PendingQueue {
        &self.inner.queue
    }

    /// The cache swept on visibility changes, if one was configured.
    #[must_use]
    pub fn cache(&self) -> Option<&OfflineCache> {
        self.inner.cache.as_ref()
    }

    /// The retry policy in use.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Persist a new action and return without dispatching it.
    ///
    /// # Errors
    ///
    /// Returns an error if the action cannot be stored.
    pub fn add_pending_action(
        &self,
        action_type: &str,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<QueuedAction, SyncError> {
        let action = self.inner.queue.add(action_type, payload, priority)?;

        let (tx, rx) = oneshot::channel();
        lock(&self.inner.waiters).insert(action.id, tx);

        if let Err(e) = self.inner.background.register(SYNC_TAG) {
            debug!(error = %e, "Background sync registration failed");
        }

        self.emit(SyncEvent::ActionQueued {
            id: action.id,
            action_type: action.action_type.clone(),
            priority: action.priority,
        });
        self.refresh_status();

        Ok(QueuedAction {
            action,
            outcome: rx,
        })
    }

    /// Number of queued actions, including FAILED ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn get_pending_actions_count(&self) -> Result<usize, SyncError> {
        self.inner.queue.count()
    }

    /// Snapshot of every queued action, in dispatch order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn get_pending_actions(&self) -> Result<Vec<PendingAction>, SyncError> {
        self.inner.queue.list()
    }

    /// Queued actions in FAILED state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn get_failed_actions(&self) -> Result<Vec<PendingAction>, SyncError> {
        self.inner.queue.by_status(ActionStatus::Failed)
    }

    /// Queue statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn stats(&self) -> Result<QueueStats, SyncError> {
        self.inner.queue.stats()
    }

    /// Remove every queued action. Outstanding outcome handles resolve to
    /// [`ActionOutcome::Cleared`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub fn clear_all_pending_actions(&self) -> Result<usize, SyncError> {
        let removed = self.inner.queue.clear()?;
        for (_, waiter) in lock(&self.inner.waiters).drain() {
            let _ = waiter.send(ActionOutcome::Cleared);
        }
        info!(removed, "Cleared pending actions");
        self.emit(SyncEvent::QueueCleared { removed });
        self.refresh_status();
        Ok(removed)
    }

    /// Reset one FAILED action to PENDING.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] for an unknown ID.
    pub fn retry_action(&self, id: ActionId) -> Result<bool, SyncError> {
        let reset = self.inner.queue.retry(id)?;
        self.refresh_status();
        Ok(reset)
    }

    /// Reset every FAILED action to PENDING.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or write fails.
    pub fn retry_failed_actions(&self) -> Result<usize, SyncError> {
        let reset = self.inner.queue.retry_all_failed()?;
        self.refresh_status();
        Ok(reset)
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Subscribe to status snapshots.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Subscribe to queue and connectivity events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Whether the host last reported connectivity.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Whether a drain is running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::SeqCst)
    }

    pub(crate) fn swap_online(&self, online: bool) -> bool {
        self.inner.online.swap(online, Ordering::SeqCst)
    }

    pub(crate) fn swap_visible(&self, visible: bool) -> bool {
        self.inner.visible.swap(visible, Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.inner.events_tx.send(event);
    }

    /// Recompute and publish the status snapshot.
    pub(crate) fn refresh_status(&self) {
        let degraded = self.inner.queue.store().is_degraded();
        if degraded && !self.inner.degraded.swap(true, Ordering::SeqCst) {
            warn!("Durable store unavailable, queued actions are kept in memory for this session");
            self.emit(SyncEvent::StorageDegraded);
        }

        let stats = match self.inner.queue.stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Failed to read queue statistics");
                None
            },
        };
        let last_sync_time = *lock(&self.inner.last_sync_time);

        self.inner.status_tx.send_modify(|status| {
            status.is_online = self.is_online();
            status.is_syncing = self.is_syncing();
            status.last_sync_time = last_sync_time;
            status.storage_degraded = degraded;
            if let Some(stats) = stats {
                status.pending_actions_count = stats.total;
                status.failed_actions_count = stats.failed;
            }
        });
    }

    /// Drain the queue.
    ///
    /// Concurrent callers join the drain already in flight and receive its
    /// report. While offline the queue is left untouched and the report is
    /// flagged `skipped_offline`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails during the drain.
    pub async fn sync_pending_actions(&self) -> Result<DrainReport, SyncError> {
        if !self.is_online() {
            debug!("Offline, skipping drain");
            return Ok(DrainReport::offline(self.now()));
        }

        let drain = {
            let mut slot = lock(&self.inner.drain);
            if let Some(in_flight) = slot.as_ref() {
                debug!("Joining drain in progress");
                in_flight.clone()
            } else {
                let this = self.clone();
                let drain = async move {
                    let _guard = DrainGuard(this.clone());
                    this.run_drain().await
                }
                .boxed()
                .shared();
                *slot = Some(drain.clone());
                drain
            }
        };

        drain.await
    }

    async fn run_drain(&self) -> Result<DrainReport, SyncError> {
        self.inner.syncing.store(true, Ordering::SeqCst);
        self.refresh_status();

        let result = self.drain_snapshot().await;

        if let Ok(report) = &result {
            *lock(&self.inner.last_sync_time) = Some(report.finished_at);
            info!(
                processed = report.processed,
                succeeded = report.succeeded,
                retried = report.retried,
                failed = report.failed,
                deferred = report.deferred,
                "Drain finished"
            );
            self.emit(SyncEvent::DrainFinished(report.clone()));
        }
        result
    }

    async fn drain_snapshot(&self) -> Result<DrainReport, SyncError> {
        let mut report = DrainReport::started(self.now());
        let snapshot = self.inner.queue.eligible(report.started_at)?;
        self.emit(SyncEvent::DrainStarted {
            eligible: snapshot.len(),
        });

        let mut start = 0;
        while start < snapshot.len() {
            if !self.is_online() {
                info!(
                    remaining = snapshot.len() - start,
                    "Connectivity lost, stopping drain"
                );
                break;
            }

            let end = self.batch_end(&snapshot, start);
            if end - start == 1 {
                report.record(self.dispatch(&snapshot[start]).await?);
            } else {
                debug!(size = end - start, "Dispatching parallel batch");
                let results = join_all(snapshot[start..end].iter().map(|a| self.dispatch(a))).await;
                for result in results {
                    report.record(result?);
                }
            }
            start = end;
        }

        report.finished_at = self.now();
        Ok(report)
    }

    /// End of the run of parallel-safe entries starting at `start`.
    fn batch_end(&self, snapshot: &[PendingAction], start: usize) -> usize {
        let executors = &self.inner.executors;
        if !executors.is_parallel(&snapshot[start].action_type) {
            return start + 1;
        }
        snapshot[start..]
            .iter()
            .position(|a| !executors.is_parallel(&a.action_type))
            .map_or(snapshot.len(), |offset| start + offset)
    }

    async fn dispatch(&self, action: &PendingAction) -> Result<Dispatch, SyncError> {
        let queue = &self.inner.queue;
        let Some(claimed) = queue.claim(action.id)? else {
            debug!(action_id = %action.id, "Action no longer claimable");
            return Ok(Dispatch::Skipped);
        };

        let Some(executor) = self.inner.executors.get(&claimed.action_type) else {
            warn!(
                action_id = %claimed.id,
                action_type = %claimed.action_type,
                "No executor registered, leaving action pending"
            );
            let reason = format!("No executor registered for '{}'", claimed.action_type);
            queue.release_unclaimed(claimed.id, &reason)?;
            return Ok(Dispatch::Deferred);
        };

        debug!(
            action_id = %claimed.id,
            action_type = %claimed.action_type,
            attempts = claimed.attempts,
            "Dispatching action"
        );

        let outcome = AssertUnwindSafe(executor.execute(&claimed.payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ExecutorError::Network(format!(
                    "executor panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        match outcome {
            Ok(()) => {
                queue.complete(claimed.id)?;
                debug!(action_id = %claimed.id, "Action synced");
                self.emit(SyncEvent::ActionSynced {
                    id: claimed.id,
                    action_type: claimed.action_type.clone(),
                });
                self.resolve(claimed.id, ActionOutcome::Synced);
                Ok(Dispatch::Synced)
            },
            Err(error) if error.is_retryable() => self.handle_retryable(&claimed, error),
            Err(error) => self.fail(&claimed, error, false),
        }
    }

    fn handle_retryable(
        &self,
        claimed: &PendingAction,
        error: ExecutorError,
    ) -> Result<Dispatch, SyncError> {
        let attempts = claimed.attempts + 1;
        if self.inner.retry.exhausted(attempts) {
            return self.fail(claimed, error, true);
        }

        let delay = self.inner.retry.delay(attempts);
        let now = self.now();
        let next_attempt_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let message = error.to_string();

        if self
            .inner
            .queue
            .release_for_retry(claimed.id, &message, next_attempt_at)?
            .is_none()
        {
            debug!(action_id = %claimed.id, "Action removed during dispatch");
            return Ok(Dispatch::Skipped);
        }

        warn!(
            action_id = %claimed.id,
            action_type = %claimed.action_type,
            attempts,
            error = %message,
            "Action failed, will retry"
        );
        self.emit(SyncEvent::ActionRetrying {
            id: claimed.id,
            attempts,
            next_attempt_at,
            error: message,
        });
        Ok(Dispatch::Retrying)
    }

    fn fail(
        &self,
        claimed: &PendingAction,
        error: ExecutorError,
        consume_attempt: bool,
    ) -> Result<Dispatch, SyncError> {
        let message = error.to_string();
        let Some(failed) = self
            .inner
            .queue
            .mark_failed(claimed.id, &message, consume_attempt)?
        else {
            debug!(action_id = %claimed.id, "Action removed during dispatch");
            return Ok(Dispatch::Skipped);
        };

        warn!(
            action_id = %failed.id,
            action_type = %failed.action_type,
            attempts = failed.attempts,
            error = %message,
            "Action failed permanently"
        );
        self.emit(SyncEvent::ActionFailed {
            id: failed.id,
            attempts: failed.attempts,
            error: message,
        });
        self.resolve(failed.id, ActionOutcome::Failed(error));
        Ok(Dispatch::Failed)
    }

    fn resolve(&self, id: ActionId, outcome: ActionOutcome) {
        if let Some(waiter) = lock(&self.inner.waiters).remove(&id) {
            let _ = waiter.send(outcome);
        }
    }
}
