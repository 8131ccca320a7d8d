//! # Datasync Query
//!
//! OData v4 query options for Datasync tables.
//!
//! This crate provides:
//! - A lexer and recursive-descent parser for `$filter` and `$orderby`
//! - In-process evaluation of expressions against JSON entities
//! - [`QueryOptions`]: parsing of `$filter`, `$orderby`, `$select`, `$skip`,
//!   `$top`, `$count` and `__includedeleted`, paged execution and `nextLink`
//!   construction
//!
//! ## Example
//!
//! ```rust
//! use datasync_query::QueryOptions;
//! use serde_json::json;
//!
//! let options = QueryOptions::parse("$filter=year%20ge%202000&$orderby=title").unwrap();
//! let items = vec![
//!     json!({"id": "a", "title": "Inception", "year": 2010}),
//!     json!({"id": "b", "title": "Fight Club", "year": 1999}),
//! ];
//! let page = options.execute(items, 100);
//! assert_eq!(page.total, 1);
//! assert_eq!(page.items[0]["title"], "Inception");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod ast;
mod error;
mod eval;
mod lexer;
mod options;
mod parser;

pub use ast::{BinaryOp, EdmType, Expr, Function, Literal, OrderBy, UnaryOp};
pub use error::{QueryError, QueryResult};
pub use eval::{compare, evaluate, sort_order, Operand};
pub use options::{include_deleted, QueryOptions, QueryPage, INCLUDE_DELETED};
pub use parser::{parse_filter, parse_orderby};
