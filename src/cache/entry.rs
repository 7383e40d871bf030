//! Cache entry and read-result types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A cached read result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Caller-chosen key
    pub key: String,
    /// Opaque payload
    pub data: serde_json::Value,
    /// When the entry was written
    pub timestamp: DateTime<Utc>,
    /// Absolute expiry; `None` never expires
    pub expiry: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Build an entry written at `now` that lives for `ttl_minutes`.
    #[must_use]
    pub fn new(
        key: String,
        data: serde_json::Value,
        now: DateTime<Utc>,
        ttl_minutes: Option<u32>,
    ) -> Self {
        Self {
            key,
            data,
            timestamp: now,
            expiry: ttl_minutes.map(|m| now + Duration::minutes(i64::from(m))),
        }
    }

    /// Whether the entry has expired as of `now`.
    ///
    /// An entry is still valid at exactly its expiry instant.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| now > expiry)
    }

    /// Secondary index: expiry time, with sticky entries sorting last.
    #[must_use]
    pub fn index(&self) -> String {
        self.expiry
            .map_or_else(|| "~".to_string(), |e| format!("{:020}", e.timestamp_millis().max(0)))
    }
}

/// Result of a read-through lookup, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
    /// The actual data
    pub data: T,
    /// Where the data came from
    pub source: CacheSource,
    /// When the data was cached (if from cache)
    pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
    /// Fresh data from the network.
    pub const fn from_network(data: T) -> Self {
        Self {
            data,
            source: CacheSource::Network,
            cached_at: None,
        }
    }

    /// Data served from a fresh cache entry.
    pub const fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            data,
            source: CacheSource::CacheFresh,
            cached_at: Some(cached_at),
        }
    }

    /// Data served from cache because the network fetch failed.
    pub const fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            data,
            source: CacheSource::Offline,
            cached_at: Some(cached_at),
        }
    }
}

/// Indicates where read data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Fresh data from network
    Network,
    /// Data from cache, still within its TTL
    CacheFresh,
    /// Network unavailable, serving cached data
    Offline,
}
