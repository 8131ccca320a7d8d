//! # Datasync Client
//!
//! Blocking client for Datasync tables.
//!
//! This crate provides:
//! - Remote table operations with `If-Match` version guards
//! - Paged queries that follow `nextLink`
//! - Incremental pull of changed and deleted entities
//! - Conflict resolution policies
//! - Retry with exponential backoff
//! - An HTTP transport abstraction
//!
//! ## Concurrency
//!
//! Every entity read from the server carries its version. Writes send it
//! back as `If-Match`; when another client got there first the server
//! answers `412` with its current entity and the table's
//! [`ConflictPolicy`] decides what happens next.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod conflict;
mod error;
mod query;
mod table;
mod transport;

pub use config::{ClientConfig, RetryConfig, DEFAULT_API_VERSION};
pub use conflict::{ConflictPolicy, Resolution};
pub use error::{ClientError, ClientResult};
pub use query::Query;
pub use table::{DatasyncClient, RemoteTable};
pub use transport::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, MockHttpClient, ReqwestClient,
};
