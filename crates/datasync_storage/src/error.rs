//! Error types for storage backends.

use datasync_core::TableError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a storage backend itself, as opposed to the
/// concurrency outcomes every backend reports through [`TableError`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored record could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored data is unreadable.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the repository directory.
    #[error("repository directory is locked: {}", .0.display())]
    Locked(PathBuf),

    /// The table name cannot be used as an SQL identifier.
    #[error("invalid table name '{0}'")]
    InvalidTableName(String),
}

impl From<StorageError> for TableError {
    fn from(err: StorageError) -> Self {
        TableError::repository(err.to_string())
    }
}
