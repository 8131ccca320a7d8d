//! The repository contract shared by every backend.

use datasync_core::{TableData, TableError, TableResult, Version};
use tracing::debug;

/// Persistent storage for one table.
///
/// Repositories own the system properties: every successful write stamps a
/// fresh `updatedAt` and `version` on the stored entity and returns a copy
/// of what was stored. Returned entities are always disconnected copies, so
/// callers may mutate them freely.
///
/// # Invariants
///
/// - `create` with an id that already exists fails with `409 Conflict`
///   carrying the stored entity
/// - `replace` and `delete` given a non-empty version that differs from the
///   stored one fail with `412 Precondition Failed` carrying the stored
///   entity; an absent or empty version means "no precondition"
/// - An empty id is a `400 Bad Request`; an unknown id is `404 Not Found`
/// - `updatedAt` never moves backwards for a given entity
///
/// # Implementors
///
/// - [`super::InMemoryRepository`] - For tests and ephemeral tables
/// - [`super::SqliteRepository`] - Conditional `UPDATE` on a SQLite table
/// - [`super::FileRepository`] - Append-only JSON journal in a locked directory
pub trait Repository: Send + Sync {
    /// Returns a snapshot of every stored entity, deleted ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn query(&self) -> TableResult<Vec<TableData>>;

    /// Stores a new entity. An empty id is replaced by a generated one.
    ///
    /// # Errors
    ///
    /// Returns `409 Conflict` if the id is taken, or a repository error.
    fn create(&self, entity: TableData) -> TableResult<TableData>;

    /// Reads one entity.
    ///
    /// # Errors
    ///
    /// Returns `400` for an empty id and `404` if the entity does not exist.
    fn read(&self, id: &str) -> TableResult<TableData>;

    /// Replaces a stored entity, optionally only if its version matches.
    ///
    /// # Errors
    ///
    /// Returns `400`, `404` or `412` per the trait invariants.
    fn replace(&self, entity: TableData, version: Option<&Version>) -> TableResult<TableData>;

    /// Physically removes an entity, optionally only if its version matches.
    ///
    /// # Errors
    ///
    /// Returns `400`, `404` or `412` per the trait invariants.
    fn delete(&self, id: &str, version: Option<&Version>) -> TableResult<()>;

    /// Returns the number of stored entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn count(&self) -> TableResult<usize> {
        Ok(self.query()?.len())
    }
}

/// Rejects an empty id.
pub(crate) fn require_id(id: &str) -> TableResult<()> {
    if id.is_empty() {
        Err(TableError::bad_request("entity id is required"))
    } else {
        Ok(())
    }
}

/// Assigns a generated id when the entity has none.
pub(crate) fn assign_id(entity: &mut TableData) {
    if entity.id.is_empty() {
        entity.id = TableData::new_id();
    }
}

/// Checks a caller-supplied version against the stored entity.
pub(crate) fn check_version(stored: &TableData, version: Option<&Version>) -> TableResult<()> {
    match version {
        Some(expected) if !expected.is_empty() && *expected != stored.version => {
            debug!(id = %stored.id, "version mismatch");
            Err(TableError::precondition_failed(stored.clone()))
        }
        _ => Ok(()),
    }
}
