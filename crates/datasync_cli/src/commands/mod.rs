//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod serve;
pub mod token;

use clap::ValueEnum;
use datasync_storage::{FileRepository, InMemoryRepository, Repository, SqliteRepository};
use std::path::Path;
use std::sync::Arc;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Process memory; lost on exit.
    Memory,
    /// One SQLite database file, one SQL table per table.
    Sqlite,
    /// One journal directory per table.
    File,
}

/// Opens the repository holding `table`.
///
/// For `sqlite`, `data` is the database file; for `file`, the directory
/// containing one sub-directory per table.
pub fn open_repository(
    backend: Backend,
    data: Option<&Path>,
    table: &str,
) -> Result<Arc<dyn Repository>, Box<dyn std::error::Error>> {
    let repo: Arc<dyn Repository> = match backend {
        Backend::Memory => Arc::new(InMemoryRepository::new()),
        Backend::Sqlite => {
            let path = data.ok_or("--data is required for the sqlite backend")?;
            Arc::new(SqliteRepository::open(path, table)?)
        }
        Backend::File => {
            let dir = data.ok_or("--data is required for the file backend")?;
            Arc::new(FileRepository::open(&dir.join(table))?)
        }
    };
    Ok(repo)
}
