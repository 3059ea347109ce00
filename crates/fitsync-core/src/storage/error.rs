//! Storage errors
//!
//! Callers never surface these to the user; they are logged and the
//! operation degrades to "no data". The variants keep enough context
//! (path, key) for the log line to be actionable.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("cannot create storage directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("permission denied on '{path}'; point FITSYNC_DATA_DIR somewhere writable")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no space left while writing '{path}'")]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The temp file was written but could not replace the record
    #[error("cannot replace '{to}' with '{from}': {source}")]
    Replace {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Key cannot be mapped to a file name
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("sqlite: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record could not be encoded
    #[error("cannot encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// Backend cannot be used at all
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Classify an I/O error hit while writing `path`
    pub fn on_write(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            _ if looks_like_disk_full(&error) => StorageError::DiskFull {
                path,
                source: error,
            },
            _ => StorageError::Write {
                path,
                source: error,
            },
        }
    }

    /// Whether retrying later could succeed without user action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Database(_) | StorageError::Unavailable(_) | StorageError::Write { .. }
        )
    }
}

fn looks_like_disk_full(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    ["no space left", "disk full", "quota exceeded", "not enough space"]
        .iter()
        .any(|needle| msg.contains(needle))
}

pub type StorageResult<T> = Result<T, StorageError>;
