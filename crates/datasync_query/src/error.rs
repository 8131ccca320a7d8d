//! Error types for query parsing.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while parsing OData query options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The expression has a syntax error.
    #[error("syntax error at position {position}: {message}")]
    Syntax {
        /// Character offset within the expression.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// A query option has an invalid value.
    #[error("invalid value for {option}: {message}")]
    InvalidOption {
        /// The option name, such as `$top`.
        option: String,
        /// What went wrong.
        message: String,
    },

    /// The query uses an option this service does not support.
    #[error("query option {0} is not supported")]
    Unsupported(String),
}

impl QueryError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(option: &str, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.to_string(),
            message: message.into(),
        }
    }
}
