//! Degrade-to-memory wrapper around a durable store.

use std::sync::atomic::{AtomicBool, Ordering};

use super::kv::{Collection, KeyValueStore, Record, StorageError};
use super::memory::MemoryStore;

/// Routes calls to a durable backend until it fails once, then serves the
/// rest of the session from memory.
///
/// The failing call is retried against the in-memory store so the caller
/// still sees a result. Data already written to the durable backend stays
/// there for the next session.
pub struct FallbackStore {
    primary: Box<dyn KeyValueStore>,
    fallback: MemoryStore,
    degraded: AtomicBool,
}

impl FallbackStore {
    /// Wrap a durable backend.
    #[must_use]
    pub fn new(primary: Box<dyn KeyValueStore>) -> Self {
        Self {
            primary,
            fallback: MemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// A store that starts out degraded, for when the durable backend could
    /// not even be opened.
    #[must_use]
    pub fn degraded() -> Self {
        Self {
            primary: Box::new(MemoryStore::new()),
            fallback: MemoryStore::new(),
            degraded: AtomicBool::new(true),
        }
    }

    fn route<R>(
        &self,
        op: &'static str,
        call: impl Fn(&dyn KeyValueStore) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        if self.degraded.load(Ordering::Acquire) {
            return call(&self.fallback as &dyn KeyValueStore);
        }

        match call(self.primary.as_ref()) {
            Ok(result) => Ok(result),
            Err(e) => {
                if !self.degraded.swap(true, Ordering::AcqRel) {
                    tracing::warn!(
                        backend = self.primary.backend_name(),
                        op,
                        error = %e,
                        "durable store failed, continuing in memory for this session"
                    );
                }
                call(&self.fallback as &dyn KeyValueStore)
            },
        }
    }
}

impl KeyValueStore for FallbackStore {
    fn put(&self, collection: Collection, record: Record) -> Result<(), StorageError> {
        self.route("put", |s| s.put(collection, record.clone()))
    }

    fn get(&self, collection: Collection, key: &str) -> Result<Option<Record>, StorageError> {
        self.route("get", |s| s.get(collection, key))
    }

    fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StorageError> {
        self.route("get_all", |s| s.get_all(collection))
    }

    fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        self.route("delete", |s| s.delete(collection, key))
    }

    fn clear(&self, collection: Collection) -> Result<usize, StorageError> {
        self.route("clear", |s| s.clear(collection))
    }

    fn backend_name(&self) -> &'static str {
        if self.is_degraded() {
            "memory (degraded)"
        } else {
            self.primary.backend_name()
        }
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }
}
