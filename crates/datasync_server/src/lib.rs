//! # Datasync Server
//!
//! Table controllers and the HTTP surface for Datasync.
//!
//! This crate provides:
//! - [`TableController`], the protocol logic of one table
//! - An axum router exposing every registered table ([`DatasyncServer`])
//! - Authentication middleware (HMAC-SHA256 bearer tokens)
//! - Mapping of [`TableError`](datasync_core::TableError)s onto HTTP
//!   responses ([`ApiError`])
//!
//! # Architecture
//!
//! Controllers are synchronous and know nothing of HTTP: handlers turn
//! headers into a [`RequestContext`], run the controller on the blocking
//! pool and render the result. Storage is any
//! [`Repository`](datasync_storage::Repository).
//!
//! # Authentication
//!
//! Authentication is optional:
//!
//! ```rust
//! use datasync_server::{AuthConfig, ServerConfig, TokenValidator};
//!
//! let secret = b"my-secure-secret-32-bytes-long!".to_vec();
//! let config = ServerConfig::default().with_auth(secret.clone());
//! assert!(config.validate().is_ok());
//!
//! let validator = TokenValidator::new(AuthConfig::new(secret));
//! let token = validator.create_token("alice").unwrap();
//! assert_eq!(validator.validate(&token).unwrap().user_id.as_deref(), Some("alice"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod controller;
mod error;
mod handler;
mod server;

pub use auth::{AuthConfig, TokenValidator};
pub use config::ServerConfig;
pub use controller::{parse_body, RequestContext, TableController, TABLES_PREFIX};
pub use error::{ServerError, ServerResult};
pub use handler::{ApiError, API_VERSION_HEADER, ZUMO_AUTH_HEADER};
pub use server::{shutdown_signal, DatasyncServer};
