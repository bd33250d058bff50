//! Tessera Shared Library
//!
//! Query translation for a log and metrics search engine. SQL statements,
//! search-DSL request bodies and query strings are compiled into one
//! canonical filter tree plus an aggregation pipeline, ready for an
//! execution engine.
//!
//! # Modules
//!
//! - [`query`] - Canonical AST, pipeline, and the SQL, DSL and query-string front ends
//! - [`scroll`] - Scroll sessions with expiry and durable recovery
//! - [`config`] - Environment-driven configuration
//! - [`clock`] - Injectable time source
//!
//! # Example
//!
//! ```
//! use shared::query::{parse_request, translate_sql, TranslateContext};
//!
//! let ctx = TranslateContext::with_defaults(1);
//!
//! let sql = translate_sql("SELECT * FROM logs WHERE level = 'error'", &ctx).unwrap();
//! let dsl = parse_request(r#"{"query": {"term": {"level": "error"}}}"#, &ctx, None).unwrap();
//!
//! assert_eq!(sql.query.and_group, dsl.query.and_group);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod config;
pub mod query;
pub mod scroll;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
