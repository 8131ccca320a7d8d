//! Error types for the client.

use datasync_core::TableData;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to a Datasync server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with an error status.
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// The write lost an optimistic concurrency check (`409` or `412`).
    #[error("conflict ({status}) on entity '{}'", .server.id)]
    Conflict {
        /// HTTP status code.
        status: u16,
        /// The entity currently stored on the server.
        server: Box<TableData>,
    },

    /// The response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The client configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The transport reports it is not usable.
    #[error("not connected to server")]
    NotConnected,
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a conflict error carrying the server entity.
    pub fn conflict(status: u16, server: TableData) -> Self {
        Self::Conflict {
            status,
            server: Box::new(server),
        }
    }

    /// Returns the HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::Conflict { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the server entity of a conflict.
    pub fn server_entity(&self) -> Option<&TableData> {
        match self {
            Self::Conflict { server, .. } => Some(&**server),
            _ => None,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Transport failures marked retryable, `408`, `429` and `5xx` answers
    /// are retryable; conflicts and other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ClientError::transport_retryable("connection reset").is_retryable());
        assert!(!ClientError::transport_fatal("invalid certificate").is_retryable());
        let status = |status| ClientError::Status {
            status,
            message: String::new(),
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!ClientError::conflict(412, TableData::new("a")).is_retryable());
        assert!(!ClientError::NotConnected.is_retryable());
    }

    #[test]
    fn conflict_accessors() {
        let err = ClientError::conflict(409, TableData::new("m1"));
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.server_entity().map(|e| e.id.as_str()), Some("m1"));
        assert_eq!(err.to_string(), "conflict (409) on entity 'm1'");
        assert_eq!(ClientError::NotConnected.status(), None);
    }
}
