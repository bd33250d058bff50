//! Translation errors shared by the SQL and search-DSL front ends.

use super::sql::ParseError;
use crate::scroll::ScrollError;
use thiserror::Error;

/// Errors that can occur while translating a query.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// The SQL text could not be parsed.
    #[error(transparent)]
    Sql(#[from] ParseError),

    /// The request body is not valid JSON.
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// A JSON value has the wrong kind.
    #[error("Expected {expected} at '{key}', found {found}")]
    WrongType {
        /// Key or path of the offending value.
        key: String,
        /// The kind that was expected.
        expected: &'static str,
        /// The kind that was found.
        found: &'static str,
    },

    /// A required key is missing.
    #[error("Missing required key '{key}' in {context}")]
    MissingKey {
        /// The enclosing construct.
        context: &'static str,
        /// The missing key.
        key: &'static str,
    },

    /// A key is not recognised.
    #[error("Unknown key '{key}' in {context}")]
    UnknownKey {
        /// The enclosing construct.
        context: &'static str,
        /// The unrecognised key.
        key: String,
    },

    /// The construct is well formed but not supported.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A value is present and well typed but not acceptable.
    #[error("Invalid value at '{key}': {reason}")]
    InvalidValue {
        /// Key or path of the offending value.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A `terms` query has no values.
    #[error("terms query on '{0}' has an empty value list")]
    EmptyTerms(String),

    /// `LIMIT` is not an integer.
    #[error("LIMIT must be an integer, got '{0}'")]
    InvalidLimit(String),

    /// A time bound could not be parsed.
    #[error("Invalid time value '{0}'")]
    InvalidTime(String),

    /// A histogram interval could not be parsed.
    #[error("Invalid interval '{0}'")]
    InvalidInterval(String),

    /// Histogram bounds are malformed.
    #[error("Invalid extended_bounds: {0}")]
    InvalidBounds(String),

    /// Scroll session handling failed.
    #[error(transparent)]
    Scroll(#[from] ScrollError),
}

impl TranslateError {
    /// Shorthand for [`TranslateError::Unsupported`].
    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }
}
