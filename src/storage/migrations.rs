//! Database migrations for the SQLite backend.
//!
//! Each migration upgrades the schema by one version. Migrations run
//! automatically when the database is opened.

use rusqlite::Connection;

use super::StorageError;

/// Current schema version.
const CURRENT_VERSION: i32 = 1;

/// Get the current schema version from the database.
///
/// Returns 0 if no version has been set (new database).
pub fn get_version(conn: &Connection) -> Result<i32, StorageError> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

fn set_version(conn: &Connection, version: i32) -> Result<(), StorageError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))?;
    Ok(())
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<(), StorageError> {
    let current = get_version(conn)?;

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        tracing::debug!(version, "applying storage migration");
        run_migration(conn, version)?;
        set_version(conn, version)?;
    }

    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> Result<(), StorageError> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(StorageError::Corrupted(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: generic record table.
///
/// Both the pending-actions and cached-data collections live in
/// `kv_records`, partitioned by the `collection` column.
fn migrate_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS kv_records (
            collection TEXT NOT NULL,
            key TEXT NOT NULL,
            sort_index TEXT NOT NULL DEFAULT '',
            value TEXT NOT NULL,
            PRIMARY KEY (collection, key)
        );

        CREATE INDEX IF NOT EXISTS idx_kv_records_sort
        ON kv_records(collection, sort_index, key);
        ",
    )?;
    Ok(())
}
