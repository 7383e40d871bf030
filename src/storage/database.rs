//! `SQLite` database connection.
//!
//! The database lives at `~/.offline-sync/offline.db` by default and holds
//! the `kv_records` table backing both collections.

use std::path::Path;

use rusqlite::Connection;

use super::migrations;
use super::StorageError;

/// An open, migrated `SQLite` connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file at `path`, creating missing parent
    /// directories.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` if the file cannot be opened, or
    /// the migration error.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)?,
            _ => {},
        }
        let conn = Connection::open(path).map_err(|e| {
            StorageError::Unavailable(format!("cannot open {}: {e}", path.display()))
        })?;
        Self::migrated(conn)
    }

    /// Open a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Unavailable(format!("in-memory database: {e}")))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> Result<Self, StorageError> {
        migrations::run(&conn)?;
        Ok(Self { conn })
    }

    /// Schema version recorded in `PRAGMA user_version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma cannot be read.
    pub fn schema_version(&self) -> Result<i32, StorageError> {
        migrations::get_version(&self.conn)
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.schema_version().unwrap() > 0);
    }

    #[test]
    fn test_open_file_creates_parent() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("offline.db");

        let db = Database::open_at(&db_path).unwrap();
        assert!(db.schema_version().unwrap() > 0);
        assert!(db_path.exists());
    }

    #[test]
    fn test_reopen_database() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("offline.db");

        {
            let db = Database::open_at(&db_path).unwrap();
            assert!(db.schema_version().unwrap() > 0);
        }

        // Reopen - migrations are already applied
        {
            let db = Database::open_at(&db_path).unwrap();
            assert!(db.schema_version().unwrap() > 0);
        }
    }
}
