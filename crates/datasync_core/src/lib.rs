//! # Datasync Core
//!
//! Shared building blocks for Datasync tables.
//!
//! This crate provides:
//! - [`TableData`], the entity shape every table stores
//! - [`Version`] tokens and their strong [`EntityTag`] form
//! - Conditional request evaluation ([`Preconditions`])
//! - The [`TableError`] shape shared by controllers and repositories
//! - Per-table [`TableOptions`]
//! - Access control hooks ([`AccessControlProvider`])
//! - A post-commit [`ChangeFeed`]
//! - The [`PagedResult`] query response body
//!
//! ## Concurrency Model
//!
//! Every write regenerates `updatedAt` and `version`. Clients echo the
//! version back through `If-Match`; a write carrying a version that no
//! longer matches the stored one fails with `412 Precondition Failed` and
//! the current entity as payload.
//!
//! ```rust
//! use datasync_core::{EntityTag, TableData, Version};
//!
//! let mut entity = TableData::new("movie-1");
//! entity.version = Version::new(vec![0x01, 0x00, 0x42, 0x22, 0x47, 0x8F]);
//! assert_eq!(entity.etag().as_deref(), Some("\"AQBCIkeP\""));
//!
//! let tag = EntityTag::parse_list("\"AQBCIkeP\"");
//! assert!(tag[0].matches(&entity.version));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod access;
mod change_feed;
mod conditional;
mod entity;
mod error;
mod etag;
mod options;
mod page;
mod patch;
mod version;

pub use access::{
    AccessControlProvider, AllowAll, DataView, Identity, OwnerAccessControl, TableOperation,
};
pub use change_feed::{ChangeFeed, RepositoryUpdated};
pub use conditional::{format_http_date, parse_http_date, Preconditions};
pub use entity::{is_system_property, validate_id, TableData};
pub use error::{TableError, TableResult};
pub use etag::EntityTag;
pub use options::TableOptions;
pub use page::PagedResult;
pub use patch::apply_merge_patch;
pub use version::Version;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
