//! # Datasync Storage
//!
//! The [`Repository`] contract and the backends that implement it.
//!
//! Repositories store [`TableData`](datasync_core::TableData) and own its
//! system properties. They all enforce the same optimistic-concurrency rules
//! and report the same [`TableError`](datasync_core::TableError) shapes; they
//! differ only in how a lost race is detected.
//!
//! ## Available Backends
//!
//! - [`InMemoryRepository`] - Hash map under a lock, for tests and caches
//! - [`SqliteRepository`] - One SQLite table, conditional `UPDATE` statements
//! - [`FileRepository`] - Append-only JSON journal in a locked directory
//!
//! ## Example
//!
//! ```rust
//! use datasync_core::TableData;
//! use datasync_storage::{InMemoryRepository, Repository};
//!
//! let repo = InMemoryRepository::new();
//! let v1 = repo.create(TableData::new("m1")).unwrap();
//! let v2 = repo.replace(TableData::new("m1"), Some(&v1.version)).unwrap();
//!
//! // A write based on the old version loses.
//! let err = repo.replace(TableData::new("m1"), Some(&v1.version)).unwrap_err();
//! assert_eq!(err.status(), 412);
//! assert_eq!(err.payload(), Some(&v2));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod repository;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use file::{FileRepository, FileRepositoryConfig};
pub use memory::InMemoryRepository;
pub use repository::Repository;
pub use sqlite::SqliteRepository;
