//! Durable storage layer
//!
//! The snapshot and the mutation queue are each stored as a single JSON
//! record under a string key. Backends:
//!
//! - **File**: one file per key, atomic writes
//! - **SQLite**: key/value table, transactional writes
//! - **Memory**: for tests and embedding
//!
//! Callers treat every storage failure as "no data" on read and as a
//! logged, non-fatal event on write.

pub mod error;
pub mod file;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

pub use error::{StorageError, StorageResult};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use crate::config::{Config, StorageBackend};

/// Key/value storage that survives a restart
pub trait DurableStorage: Send + Sync {
    /// Read a record; `Ok(None)` when the key was never written
    fn read(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace a record
    fn write(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a record; deleting a missing key is not an error
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Open the backend selected in the configuration
pub fn open_storage(config: &Config) -> StorageResult<Arc<dyn DurableStorage>> {
    let storage: Arc<dyn DurableStorage> = match config.storage {
        StorageBackend::File => Arc::new(FileStorage::open(&config.data_dir)?),
        StorageBackend::Sqlite => Arc::new(SqliteStorage::open(&config.sqlite_path())?),
    };
    Ok(storage)
}
