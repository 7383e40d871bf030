//! Drain triggers: connectivity, visibility, timers, manual and background
//! sync.

use std::fmt::Debug;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::{DrainReport, SyncEvent};
use super::orchestrator::SyncOrchestrator;
use crate::cache::OfflineCache;
use crate::error::SyncError;

/// Background-sync tag registered whenever an action is queued.
pub const SYNC_TAG: &str = "sync-pending-actions";

/// Platform capability that wakes the host to drain while in the background.
pub trait BackgroundSync: Send + Sync + Debug {
    /// Ask the platform to wake the host later with `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the registration.
    fn register(&self, tag: &str) -> Result<(), SyncError>;
}

/// Background sync for hosts without the capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackgroundSync;

impl BackgroundSync for NoopBackgroundSync {
    fn register(&self, _tag: &str) -> Result<(), SyncError> {
        Ok(())
    }
}

impl SyncOrchestrator {
    /// Report a connectivity change. Coming back online drains the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the triggered drain fails.
    pub async fn set_online(&self, online: bool) -> Result<Option<DrainReport>, SyncError> {
        let was_online = self.swap_online(online);
        if was_online == online {
            return Ok(None);
        }

        if online {
            info!("Connectivity restored");
        } else {
            warn!("Connectivity lost, queueing actions locally");
        }
        self.emit(SyncEvent::ConnectivityChanged { online });
        self.refresh_status();

        if online {
            return self.sync_pending_actions().await.map(Some);
        }
        Ok(None)
    }

    /// Report a visibility change. Becoming visible while online sweeps the
    /// cache and drains the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the triggered drain fails.
    pub async fn set_visible(&self, visible: bool) -> Result<Option<DrainReport>, SyncError> {
        let was_visible = self.swap_visible(visible);
        if !visible || was_visible || !self.is_online() {
            return Ok(None);
        }

        debug!("Host visible again");
        if let Some(cache) = self.cache() {
            match cache.clear_expired_data() {
                Ok(removed) => debug!(removed, "Swept expired cache entries"),
                Err(e) => warn!(error = %e, "Cache sweep failed"),
            }
        }
        self.sync_pending_actions().await.map(Some)
    }

    /// Manual "sync now".
    ///
    /// # Errors
    ///
    /// Returns an error if the drain fails.
    pub async fn sync_now(&self) -> Result<DrainReport, SyncError> {
        self.sync_pending_actions().await
    }

    /// Handle a background-sync wake-up. Only [`SYNC_TAG`] drains.
    ///
    /// # Errors
    ///
    /// Returns an error if the drain fails.
    pub async fn handle_background_sync(
        &self,
        tag: &str,
    ) -> Result<Option<DrainReport>, SyncError> {
        if tag != SYNC_TAG {
            debug!(tag, "Ignoring unknown background sync tag");
            return Ok(None);
        }
        self.sync_pending_actions().await.map(Some)
    }

    /// Drain every `interval` while online.
    #[must_use]
    pub fn spawn_periodic_sync(&self, interval: Duration) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !orchestrator.is_online() {
                    continue;
                }
                if let Err(e) = orchestrator.sync_pending_actions().await {
                    warn!(error = %e, "Periodic sync failed");
                }
            }
        })
    }
}

/// Sweep expired entries from `cache` every `interval`.
#[must_use]
pub fn spawn_cache_sweeper(cache: OfflineCache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match cache.clear_expired_data() {
                Ok(0) => {},
                Ok(removed) => debug!(removed, "Swept expired cache entries"),
                Err(e) => warn!(error = %e, "Cache sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::sync::{ExecutorRegistry, FnExecutor, Priority};
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct RecordingBackgroundSync {
        tags: Mutex<Vec<String>>,
    }

    impl BackgroundSync for RecordingBackgroundSync {
        fn register(&self, tag: &str) -> Result<(), SyncError> {
            self.tags.lock().unwrap().push(tag.to_string());
            Ok(())
        }
    }

    fn counting_registry(calls: &Arc<AtomicUsize>) -> ExecutorRegistry {
        let calls = Arc::clone(calls);
        let mut executors = ExecutorRegistry::new();
        executors.register(
            "op",
            FnExecutor::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
        );
        executors
    }

    #[tokio::test]
    async fn test_reconnect_drains() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = SyncOrchestrator::builder(Arc::new(MemoryStore::new()))
            .executors(counting_registry(&calls))
            .online(false)
            .build()
            .unwrap();
        let mut events = orchestrator.subscribe_events();

        orchestrator
            .add_pending_action("op", json!({}), Priority::Medium)
            .unwrap();
        assert!(orchestrator.set_online(false).await.unwrap().is_none());

        let report = orchestrator.set_online(true).await.unwrap().unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(orchestrator.status().is_online);

        let mut saw_connectivity = false;
        while let Ok(event) = events.try_recv() {
            if event == (SyncEvent::ConnectivityChanged { online: true }) {
                saw_connectivity = true;
            }
        }
        assert!(saw_connectivity);

        // Already online: no transition, no drain
        assert!(orchestrator.set_online(true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_going_offline_does_not_drain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = SyncOrchestrator::builder(Arc::new(MemoryStore::new()))
            .executors(counting_registry(&calls))
            .build()
            .unwrap();
        orchestrator
            .add_pending_action("op", json!({}), Priority::Medium)
            .unwrap();

        assert!(orchestrator.set_online(false).await.unwrap().is_none());
        assert!(!orchestrator.status().is_online);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_visibility_sweeps_cache_and_drains() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualClock::default());
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let cache = OfflineCache::with_clock(Arc::clone(&store), clock.clone());
        cache.set_data("products", &json!(["a"]), Some(1)).unwrap();
        cache.set_data("profile", &json!({"id": 1}), None).unwrap();

        let orchestrator = SyncOrchestrator::builder(store)
            .executors(counting_registry(&calls))
            .clock(clock.clone())
            .cache(cache.clone())
            .build()
            .unwrap();
        orchestrator
            .add_pending_action("op", json!({}), Priority::Medium)
            .unwrap();

        // Already visible: nothing happens
        assert!(orchestrator.set_visible(true).await.unwrap().is_none());

        clock.advance(ChronoDuration::minutes(2));
        assert!(orchestrator.set_visible(false).await.unwrap().is_none());
        let report = orchestrator.set_visible(true).await.unwrap().unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(cache.get_all_keys().unwrap(), vec!["profile".to_string()]);
    }

    #[tokio::test]
    async fn test_background_sync_registration() {
        let calls = Arc::new(AtomicUsize::new(0));
        let background = Arc::new(RecordingBackgroundSync::default());
        let orchestrator = SyncOrchestrator::builder(Arc::new(MemoryStore::new()))
            .executors(counting_registry(&calls))
            .background_sync(background.clone())
            .build()
            .unwrap();

        orchestrator
            .add_pending_action("op", json!({}), Priority::Medium)
            .unwrap();
        assert_eq!(*background.tags.lock().unwrap(), vec![SYNC_TAG.to_string()]);

        assert!(orchestrator
            .handle_background_sync("other-tag")
            .await
            .unwrap()
            .is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let report = orchestrator
            .handle_background_sync(SYNC_TAG)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_sync_now() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = SyncOrchestrator::builder(Arc::new(MemoryStore::new()))
            .executors(counting_registry(&calls))
            .build()
            .unwrap();
        orchestrator
            .add_pending_action("op", json!({}), Priority::Low)
            .unwrap();

        let report = orchestrator.sync_now().await.unwrap();
        assert_eq!(report.processed, 1);
    }

    #[tokio::test]
    async fn test_periodic_sync() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = SyncOrchestrator::builder(Arc::new(MemoryStore::new()))
            .executors(counting_registry(&calls))
            .build()
            .unwrap();
        orchestrator
            .add_pending_action("op", json!({}), Priority::Medium)
            .unwrap();

        let handle = orchestrator.spawn_periodic_sync(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.get_pending_actions_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_sweeper() {
        let clock = Arc::new(ManualClock::default());
        let cache = OfflineCache::with_clock(Arc::new(MemoryStore::new()), clock.clone());
        cache.set_data("stale", &json!(1), Some(1)).unwrap();
        clock.advance(ChronoDuration::minutes(5));

        let handle = spawn_cache_sweeper(cache.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(cache.get_all_keys().unwrap().is_empty());
    }
}
