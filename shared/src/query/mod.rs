//! Query translation for Tessera.
//!
//! Three front ends produce the same canonical form:
//!
//! - SQL statements, via [`translate_sql`]
//! - search-DSL request bodies, via [`parse_request`] and [`translate_request`]
//! - Lucene-like query strings, via [`parse_query_string`]
//!
//! Every translation yields a [`QueryNode`] filter tree. SQL and DSL requests
//! also yield an [`AggregationPipeline`] describing projection, buckets,
//! metrics, sort and limits.
//!
//! # Example
//!
//! ```
//! use shared::query::{parse_statement, translate_sql, SqlStatement, TranslateContext};
//!
//! assert!(matches!(
//!     parse_statement("SHOW TABLES").unwrap(),
//!     SqlStatement::ShowTables { like: None }
//! ));
//!
//! let ctx = TranslateContext::with_defaults(1);
//! let translation = translate_sql("SELECT * FROM logs WHERE level = 'error' LIMIT 10", &ctx).unwrap();
//! assert_eq!(translation.pipeline.table, "logs");
//! assert_eq!(translation.pipeline.first().limit, Some(10));
//! ```

mod ast;
mod codec;
mod context;
mod dsl;
mod error;
mod pipeline;
mod query_string;
mod sql;

pub use ast::*;
pub use codec::{CodecError, LiteralCodec, ValueCodec};
pub use context::{TranslateContext, TRACE_TIME_KEY};
pub use dsl::{build_aggregations, parse_request, translate_request, DslTranslation, DEFAULT_SIZE};
pub use error::TranslateError;
pub use pipeline::*;
pub use query_string::{parse_query_string, QueryStringResult};
pub use sql::{
    parse_statement, translate_sql, Comparison, ComparisonOp, FunctionArg, FunctionCall,
    OrderItem, ParseError, SelectExpr, SelectItem, SelectStatement, SqlStatement, SqlTranslation,
    SqlValue, WhereExpr,
};
