//! Error types shared by table controllers and repositories.

use crate::entity::TableData;
use thiserror::Error;

/// Result type for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Errors raised while serving a table operation.
///
/// Every variant maps onto one HTTP status. Conflict-style errors carry the
/// current server entity so the client can reconcile.
#[derive(Debug, Clone, Error)]
pub enum TableError {
    /// The request is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The caller may not perform the operation.
    #[error("unauthorized")]
    Unauthorized {
        /// Status code to report (usually 401 or 403).
        status: u16,
    },

    /// The entity does not exist or is outside the caller's view.
    #[error("entity not found")]
    NotFound,

    /// The entity has been soft-deleted.
    #[error("entity has been deleted")]
    Gone,

    /// An entity with the same id already exists.
    #[error("entity '{}' already exists", .0.id)]
    Conflict(Box<TableData>),

    /// A precondition (If-Match and friends, or a repository version check)
    /// did not hold.
    #[error("precondition failed")]
    PreconditionFailed(Option<Box<TableData>>),

    /// The client copy is current.
    #[error("not modified")]
    NotModified(Box<TableData>),

    /// The request body has an unsupported content type.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The storage backend failed.
    #[error("repository error: {0}")]
    Repository(String),
}

impl TableError {
    /// Creates a `400 Bad Request` error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Creates a `409 Conflict` error carrying the stored entity.
    pub fn conflict(current: TableData) -> Self {
        Self::Conflict(Box::new(current))
    }

    /// Creates a `412 Precondition Failed` error carrying the stored entity.
    pub fn precondition_failed(current: TableData) -> Self {
        Self::PreconditionFailed(Some(Box::new(current)))
    }

    /// Creates a `304 Not Modified` response carrying the stored entity.
    pub fn not_modified(current: TableData) -> Self {
        Self::NotModified(Box::new(current))
    }

    /// Creates a storage failure.
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository(message.into())
    }

    /// Returns the HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            TableError::BadRequest(_) => 400,
            TableError::Unauthorized { status } => *status,
            TableError::NotFound => 404,
            TableError::Gone => 410,
            TableError::Conflict(_) => 409,
            TableError::PreconditionFailed(_) => 412,
            TableError::NotModified(_) => 304,
            TableError::UnsupportedMediaType(_) => 415,
            TableError::Repository(_) => 500,
        }
    }

    /// Returns the entity that accompanies the error, if any.
    pub fn payload(&self) -> Option<&TableData> {
        match self {
            TableError::Conflict(entity) | TableError::NotModified(entity) => Some(&**entity),
            TableError::PreconditionFailed(entity) => entity.as_deref(),
            _ => None,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status() >= 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(TableError::bad_request("bad").is_client_error());
        assert!(TableError::repository("disk").is_server_error());
        assert!(!TableError::NotFound.is_server_error());
        assert!(!TableError::not_modified(TableData::new("a")).is_client_error());
    }

    #[test]
    fn status_codes() {
        assert_eq!(TableError::NotFound.status(), 404);
        assert_eq!(TableError::Gone.status(), 410);
        assert_eq!(TableError::Unauthorized { status: 403 }.status(), 403);
        assert_eq!(TableError::conflict(TableData::new("a")).status(), 409);
        assert_eq!(TableError::PreconditionFailed(None).status(), 412);
        assert_eq!(TableError::UnsupportedMediaType("text/plain".into()).status(), 415);
    }

    #[test]
    fn payload_is_exposed() {
        let err = TableError::precondition_failed(TableData::new("m1"));
        assert_eq!(err.payload().map(|e| e.id.as_str()), Some("m1"));
        assert!(TableError::PreconditionFailed(None).payload().is_none());
        assert!(TableError::NotFound.payload().is_none());
    }

    #[test]
    fn error_display() {
        let err = TableError::conflict(TableData::new("m1"));
        assert!(err.to_string().contains("m1"));
    }
}
