//! SQLite-backed byte store.
//!
//! One table, `kv(key TEXT PRIMARY KEY, value BLOB)`, WAL-journaled. This is
//! the durable backend for a long-lived operator session; values are opaque
//! bytes to SQLite.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use super::{KvStore, StoreError};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL
);
";

/// A [`KvStore`] over a single-table SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

fn backend(err: &rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::DiskFull =>
        {
            StoreError::Capacity(err.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] when the database cannot be opened or the
    /// schema cannot be applied.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| backend(&e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| backend(&e))?;
        conn.execute_batch(SCHEMA_SQL).map_err(|e| backend(&e))?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used by tests).
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] when the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| backend(&e))?;
        conn.execute_batch(SCHEMA_SQL).map_err(|e| backend(&e))?;
        Ok(Self { conn })
    }
}

impl KvStore for SqliteStore {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| backend(&e))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map(|_| ())
            .map_err(|e| backend(&e))
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map(|_| ())
            .map_err(|e| backend(&e))
    }

    fn approximate_size_bytes(&self) -> u64 {
        self.conn
            .query_row("SELECT COALESCE(SUM(LENGTH(value)), 0) FROM kv", [], |row| {
                row.get::<_, i64>(0)
            })
            .ok()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0)
    }
}
