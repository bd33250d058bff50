//! SQL front end.
//!
//! Parses the supported subset of `SELECT`, `SHOW TABLES`, `SHOW COLUMNS` and
//! `DESCRIBE`, and translates the statement into a [`QueryNode`] and an
//! [`AggregationPipeline`].
//!
//! # Supported Syntax
//!
//! ```sql
//! SELECT host, count(*) AS hits FROM logs WHERE status >= 500 GROUP BY host LIMIT 20
//! SELECT round(avg(duration), 2) FROM spans WHERE service = 'api' OR service = 'web'
//! SHOW TABLES LIKE 'log%'
//! DESCRIBE logs
//! ```
//!
//! [`QueryNode`]: super::QueryNode
//! [`AggregationPipeline`]: super::AggregationPipeline

mod parser;
mod translate;

pub use parser::{
    parse_statement, Comparison, ComparisonOp, FunctionArg, FunctionCall, OrderItem, ParseError,
    SelectExpr, SelectItem, SelectStatement, SqlStatement, SqlValue, WhereExpr,
};
pub use translate::{translate_sql, SqlTranslation};
