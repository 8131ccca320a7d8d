//! # Datasync Testkit
//!
//! Test utilities for Datasync.
//!
//! This crate provides:
//! - A fixture movie catalogue and repositories over every backend
//! - Property-based test generators using proptest
//! - An in-process HTTP harness and a live localhost server
//!
//! ## Usage
//!
//! ```rust
//! use datasync_testkit::prelude::*;
//!
//! with_movies(|repo| {
//!     assert_eq!(repo.count().unwrap(), MOVIE_COUNT);
//!     assert_eq!(repo.read("id-001").unwrap().property("title"), Some(&"The Godfather".into()));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod harness;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use datasync_storage::Repository;
}

pub use fixtures::*;
pub use generators::*;
pub use harness::*;
