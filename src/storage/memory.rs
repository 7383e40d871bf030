//! Volatile in-memory [`KeyValueStore`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::kv::{sort_records, Collection, KeyValueStore, Record, StorageError};

type Collections = HashMap<Collection, BTreeMap<String, Record>>;

/// In-memory store. Used by tests and as the degraded fallback.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Collections) -> R) -> Result<R, StorageError> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("Lock poisoned: {e}")))?;
        Ok(f(&mut guard))
    }
}

impl KeyValueStore for MemoryStore {
    fn put(&self, collection: Collection, record: Record) -> Result<(), StorageError> {
        self.with(|c| {
            c.entry(collection)
                .or_default()
                .insert(record.key.clone(), record);
        })
    }

    fn get(&self, collection: Collection, key: &str) -> Result<Option<Record>, StorageError> {
        self.with(|c| c.get(&collection).and_then(|m| m.get(key)).cloned())
    }

    fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StorageError> {
        let mut records = self.with(|c| {
            c.get(&collection)
                .map(|m| m.values().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        })?;
        sort_records(&mut records);
        Ok(records)
    }

    fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        self.with(|c| {
            c.get_mut(&collection)
                .is_some_and(|m| m.remove(key).is_some())
        })
    }

    fn clear(&self, collection: Collection) -> Result<usize, StorageError> {
        self.with(|c| c.remove(&collection).map_or(0, |m| m.len()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
