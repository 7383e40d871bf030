//! Offline read cache.
//!
//! Serves previously fetched read data so views can render without a live
//! round trip:
//! - TTL per entry, or sticky entries that never expire
//! - Expire-on-read, so correctness needs no background timer
//! - Optional sweep of stale entries that are never read again
//! - Read-through helper that falls back to cached data when a fetch fails

mod entry;
mod offline;

pub use entry::{CacheEntry, CacheResult, CacheSource};
pub use offline::OfflineCache;
