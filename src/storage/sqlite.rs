//! SQLite-backed [`KeyValueStore`].

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, OptionalExtension, Row};

use super::database::Database;
use super::kv::{Collection, KeyValueStore, Record, StorageError};

/// Durable store on top of a single `SQLite` file.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = Database::open_at(path)?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self::with_database(db))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self::with_database(Database::open_in_memory()?))
    }

    /// Wrap an existing database connection.
    #[must_use]
    pub const fn with_database(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Database>, StorageError> {
        self.db
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("Lock poisoned: {e}")))
    }
}

fn row_to_record(row: &Row<'_>) -> Result<Record, rusqlite::Error> {
    Ok(Record {
        key: row.get(0)?,
        index: row.get(1)?,
        value: row.get(2)?,
    })
}

impl KeyValueStore for SqliteStore {
    fn put(&self, collection: Collection, record: Record) -> Result<(), StorageError> {
        let db = self.lock()?;
        db.connection().execute(
            r"INSERT OR REPLACE INTO kv_records (collection, key, sort_index, value)
              VALUES (?1, ?2, ?3, ?4)",
            params![collection.name(), record.key, record.index, record.value],
        )?;
        Ok(())
    }

    fn get(&self, collection: Collection, key: &str) -> Result<Option<Record>, StorageError> {
        let db = self.lock()?;
        let record = db
            .connection()
            .query_row(
                r"SELECT key, sort_index, value FROM kv_records
                  WHERE collection = ?1 AND key = ?2",
                params![collection.name(), key],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StorageError> {
        let db = self.lock()?;
        let mut stmt = db.connection().prepare(
            r"SELECT key, sort_index, value FROM kv_records
              WHERE collection = ?1
              ORDER BY sort_index ASC, key ASC",
        )?;

        let rows = stmt.query_map([collection.name()], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        let db = self.lock()?;
        let rows = db.connection().execute(
            "DELETE FROM kv_records WHERE collection = ?1 AND key = ?2",
            params![collection.name(), key],
        )?;
        Ok(rows > 0)
    }

    fn clear(&self, collection: Collection) -> Result<usize, StorageError> {
        let db = self.lock()?;
        let rows = db.connection().execute(
            "DELETE FROM kv_records WHERE collection = ?1",
            [collection.name()],
        )?;
        Ok(rows)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
