//! TTL cache of read results on top of the durable store.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::entry::{CacheEntry, CacheResult};
use crate::core::{Clock, SystemClock};
use crate::error::SyncError;
use crate::storage::{Collection, KeyValueStore, Record};

/// Expiring read cache.
///
/// Entries expire on read: a lookup that finds an entry past its expiry
/// deletes it and reports a miss. [`OfflineCache::clear_expired_data`] sweeps
/// stale entries that are never read again.
#[derive(Clone)]
pub struct OfflineCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    /// Age after which read-through lookups try to refresh an entry
    stale_after: Duration,
}

impl OfflineCache {
    /// Create a cache over `store` using the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock.
    #[must_use]
    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            stale_after: Duration::minutes(5),
        }
    }

    /// Set the age after which [`OfflineCache::fetch_or_cached`] refreshes
    /// an unexpired entry.
    #[must_use]
    pub const fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    fn is_stale(&self, entry: &CacheEntry) -> bool {
        self.clock.now() - entry.timestamp > self.stale_after
    }

    /// Write `data` under `key`. `ttl_minutes = None` keeps it until removed.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` cannot be serialized or the store rejects
    /// the write.
    pub fn set_data<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        ttl_minutes: Option<u32>,
    ) -> Result<(), SyncError> {
        let value = serde_json::to_value(data)?;
        let entry = CacheEntry::new(key.to_string(), value, self.clock.now(), ttl_minutes);
        self.put_entry(&entry)
    }

    fn put_entry(&self, entry: &CacheEntry) -> Result<(), SyncError> {
        let record = Record::new(entry.key.clone(), entry.index(), serde_json::to_string(entry)?);
        self.store.put(Collection::CachedData, record)?;
        debug!(key = %entry.key, expiry = ?entry.expiry, "cached data");
        Ok(())
    }

    /// Read the entry under `key`, deleting it if it has expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stored entry is unreadable.
    pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>, SyncError> {
        let Some(record) = self.store.get(Collection::CachedData, key)? else {
            return Ok(None);
        };

        let entry: CacheEntry = serde_json::from_str(&record.value)?;
        if entry.is_expired(self.clock.now()) {
            debug!(key, "cache entry expired on read");
            self.store.delete(Collection::CachedData, key)?;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Read the data under `key`.
    ///
    /// Missing, expired and unreadable entries all read as `None`; store
    /// failures are logged rather than returned so views can fall back to a
    /// live fetch.
    pub fn get_data<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = match self.get_entry(key) {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            },
        };

        match serde_json::from_value(entry.data) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(key, error = %e, "cached data has an unexpected shape");
                None
            },
        }
    }

    /// Remove the entry under `key`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn remove_data(&self, key: &str) -> Result<bool, SyncError> {
        Ok(self.store.delete(Collection::CachedData, key)?)
    }

    /// Delete every expired entry and return how many were removed.
    ///
    /// Entries that cannot be parsed are removed as well.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn clear_expired_data(&self) -> Result<usize, SyncError> {
        let now = self.clock.now();
        let mut removed = 0;

        for record in self.store.get_all(Collection::CachedData)? {
            let expired = serde_json::from_str::<CacheEntry>(&record.value)
                .map_or(true, |entry| entry.is_expired(now));
            if expired && self.store.delete(Collection::CachedData, &record.key)? {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        Ok(removed)
    }

    /// Every cached key, including ones that have expired but not been read.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_all_keys(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.store.keys(Collection::CachedData)?)
    }

    /// Approximate cache size: total serialized bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_cache_size(&self) -> Result<usize, SyncError> {
        Ok(self
            .store
            .get_all(Collection::CachedData)?
            .iter()
            .map(Record::size)
            .sum())
    }

    /// Drop every cached entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn clear(&self) -> Result<usize, SyncError> {
        Ok(self.store.clear(Collection::CachedData)?)
    }

    /// Read-through lookup.
    ///
    /// 1. Fresh cache hit - return immediately
    /// 2. Stale or missing - run `fetcher` and cache its result for `ttl_minutes`
    /// 3. If the fetch fails, serve the stale entry (offline mode)
    /// 4. With nothing cached, return the fetch error
    ///
    /// Expired entries are never served. Cache write failures after a
    /// successful fetch are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error when nothing usable is cached.
    pub async fn fetch_or_cached<T, F, Fut, E>(
        &self,
        key: &str,
        ttl_minutes: Option<u32>,
        fetcher: F,
    ) -> Result<CacheResult<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let cached = self.get_entry(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "cache read failed, fetching from network");
            None
        });

        if let Some(entry) = cached.as_ref().filter(|e| !self.is_stale(e)) {
            if let Ok(data) = serde_json::from_value::<T>(entry.data.clone()) {
                return Ok(CacheResult::from_cache(data, entry.timestamp));
            }
        }

        match fetcher().await {
            Ok(data) => {
                if let Err(e) = self.set_data(key, &data, ttl_minutes) {
                    warn!(key, error = %e, "failed to cache fetched data");
                }
                Ok(CacheResult::from_network(data))
            },
            Err(fetch_err) => {
                let fallback = cached.and_then(|entry| {
                    serde_json::from_value::<T>(entry.data)
                        .ok()
                        .map(|data| CacheResult::offline(data, entry.timestamp))
                });
                fallback.ok_or_else(|| {
                    debug!(key, error = %fetch_err, "fetch failed with nothing cached");
                    fetch_err
                })
            },
        }
    }
}
