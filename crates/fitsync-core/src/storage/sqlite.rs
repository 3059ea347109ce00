//! SQLite-backed durable storage
//!
//! One `records` row per key inside `fitsync.db`. Each write is a single
//! upsert, so a crash leaves either the old body or the new one.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};

use super::error::{StorageError, StorageResult};
use super::DurableStorage;

/// Stored in `PRAGMA user_version`; 0 means a fresh file
const RECORDS_VERSION: i32 = 1;

/// Bring the `records` table up to [`RECORDS_VERSION`]
fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= RECORDS_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS records (
             key        TEXT PRIMARY KEY,
             body       TEXT NOT NULL,
             written_at INTEGER NOT NULL
         );",
    )?;
    conn.pragma_update(None, "user_version", RECORDS_VERSION)
}

/// Durable storage in a SQLite database
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        Self::with_migrated(Connection::open(path)?)
    }

    /// Private database that disappears with the value
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_migrated(Connection::open_in_memory()?)
    }

    fn with_migrated(conn: Connection) -> StorageResult<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> StorageResult<T> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&conn)?)
    }
}

impl DurableStorage for SqliteStorage {
    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT body FROM records WHERE key = ?1", [key], |row| row.get(0))
                .optional()
        })
    }

    fn write(&self, key: &str, value: &str) -> StorageResult<()> {
        let now = chrono::Utc::now().timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO records (key, body, written_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET body = excluded.body, written_at = excluded.written_at",
                params![key, value, now],
            )
            .map(|_| ())
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM records WHERE key = ?1", [key])
                .map(|_| ())
        })
    }
}
