//! Value codec: turns raw literals into typed [`Literal`] values.

use super::ast::Literal;
use serde_json::Value;
use thiserror::Error;

/// Errors raised when a value cannot be typed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The JSON value has no scalar representation.
    #[error("Cannot convert JSON {0} to a literal")]
    NotScalar(&'static str),

    /// The JSON number fits neither `i64` nor `f64`.
    #[error("Number out of range: {0}")]
    OutOfRange(String),
}

/// Classifies raw literals as string, number or boolean.
pub trait ValueCodec: Send + Sync + std::fmt::Debug {
    /// Types a literal taken from query text.
    fn from_text(&self, text: &str) -> Literal;

    /// Types a scalar JSON value.
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` for arrays, objects, null and unrepresentable numbers.
    fn from_json(&self, value: &Value) -> Result<Literal, CodecError>;
}

/// The default codec.
///
/// Text is tried as an integer, then a float, then a boolean, falling back to a
/// string. Thousands separators are ignored when reading numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralCodec;

impl ValueCodec for LiteralCodec {
    fn from_text(&self, text: &str) -> Literal {
        let numeric = text.replace(',', "");
        if let Ok(i) = numeric.parse::<i64>() {
            return Literal::Integer(i);
        }
        if let Ok(f) = numeric.parse::<f64>() {
            if f.is_finite() {
                return Literal::Float(f);
            }
        }
        if text.eq_ignore_ascii_case("true") {
            return Literal::Boolean(true);
        }
        if text.eq_ignore_ascii_case("false") {
            return Literal::Boolean(false);
        }
        Literal::String(text.to_string())
    }

    fn from_json(&self, value: &Value) -> Result<Literal, CodecError> {
        match value {
            Value::String(s) => Ok(Literal::String(s.clone())),
            Value::Bool(b) => Ok(Literal::Boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Literal::Integer)
                .or_else(|| n.as_f64().map(Literal::Float))
                .ok_or_else(|| CodecError::OutOfRange(n.to_string())),
            Value::Null => Err(CodecError::NotScalar("null")),
            Value::Array(_) => Err(CodecError::NotScalar("array")),
            Value::Object(_) => Err(CodecError::NotScalar("object")),
        }
    }
}
