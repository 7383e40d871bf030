//! File-backed [`KeyValueStore`] for hosts without `SQLite`.
//!
//! Each collection is one JSON document (`<collection>.json`) in the store
//! directory. Documents are loaded once on open and rewritten atomically
//! (temp file + rename) after every mutation.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::kv::{sort_records, Collection, KeyValueStore, Record, StorageError};

type Document = BTreeMap<String, Record>;

/// Directory of JSON documents, one per collection.
pub struct FileStore {
    dir: PathBuf,
    documents: Mutex<HashMap<Collection, Document>>,
}

impl FileStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// document cannot be parsed.
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;

        let mut documents = HashMap::new();
        for collection in Collection::ALL {
            let path = document_path(dir, collection);
            if path.exists() {
                let contents = std::fs::read_to_string(&path)?;
                let doc: Document = serde_json::from_str(&contents).map_err(|e| {
                    StorageError::Corrupted(format!("Failed to parse {}: {e}", path.display()))
                })?;
                documents.insert(collection, doc);
            }
        }

        tracing::debug!(dir = %dir.display(), "opened file store");
        Ok(Self {
            dir: dir.to_path_buf(),
            documents: Mutex::new(documents),
        })
    }

    fn with<R>(
        &self,
        collection: Collection,
        f: impl FnOnce(&mut Document) -> (R, bool),
    ) -> Result<R, StorageError> {
        let mut guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("Lock poisoned: {e}")))?;
        let doc = guard.entry(collection).or_default();
        let (result, dirty) = f(doc);
        if dirty {
            self.persist(collection, doc)?;
        }
        Ok(result)
    }

    fn persist(&self, collection: Collection, doc: &Document) -> Result<(), StorageError> {
        let path = document_path(&self.dir, collection);
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_vec(doc)
            .map_err(|e| StorageError::Io(format!("Failed to serialize {collection}: {e}")))?;
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn document_path(dir: &Path, collection: Collection) -> PathBuf {
    dir.join(format!("{}.json", collection.name()))
}

impl KeyValueStore for FileStore {
    fn put(&self, collection: Collection, record: Record) -> Result<(), StorageError> {
        self.with(collection, |doc| {
            doc.insert(record.key.clone(), record);
            ((), true)
        })
    }

    fn get(&self, collection: Collection, key: &str) -> Result<Option<Record>, StorageError> {
        self.with(collection, |doc| (doc.get(key).cloned(), false))
    }

    fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StorageError> {
        let mut records = self.with(collection, |doc| {
            (doc.values().cloned().collect::<Vec<_>>(), false)
        })?;
        sort_records(&mut records);
        Ok(records)
    }

    fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        self.with(collection, |doc| {
            let existed = doc.remove(key).is_some();
            (existed, existed)
        })
    }

    fn clear(&self, collection: Collection) -> Result<usize, StorageError> {
        self.with(collection, |doc| {
            let count = doc.len();
            doc.clear();
            (count, count > 0)
        })
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_across_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = FileStore::open(temp_dir.path()).unwrap();
            store
                .put(Collection::PendingActions, Record::new("b", "1", "{}"))
                .unwrap();
            store
                .put(Collection::PendingActions, Record::new("a", "2", "{}"))
                .unwrap();
        }

        let store = FileStore::open(temp_dir.path()).unwrap();
        let keys = store.keys(Collection::PendingActions).unwrap();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(temp_dir.path().join("pending-actions.json").exists());
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("cached-data.json"), "not json").unwrap();

        let err = FileStore::open(temp_dir.path()).err().unwrap();
        assert!(matches!(err, StorageError::Corrupted(_)));
    }

    #[test]
    fn test_delete_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        assert!(!store.delete(Collection::CachedData, "nope").unwrap());
        assert!(!temp_dir.path().join("cached-data.json").exists());
    }
}
