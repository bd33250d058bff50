//! Shape helpers over `serde_json::Value`.
//!
//! Each helper names the kind it expects and fails with
//! [`TranslateError::WrongType`] carrying the key and the kind it found.

use crate::query::error::TranslateError;
use serde_json::{Map, Value};

/// JSON object type.
pub type Object = Map<String, Value>;

/// Names the kind of a JSON value.
#[must_use]
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn wrong_type(key: &str, expected: &'static str, value: &Value) -> TranslateError {
    TranslateError::WrongType {
        key: key.to_string(),
        expected,
        found: kind_of(value),
    }
}

/// Expects an object.
pub fn object<'a>(key: &str, value: &'a Value) -> Result<&'a Object, TranslateError> {
    value.as_object().ok_or_else(|| wrong_type(key, "object", value))
}

/// Expects a string.
pub fn string<'a>(key: &str, value: &'a Value) -> Result<&'a str, TranslateError> {
    value.as_str().ok_or_else(|| wrong_type(key, "string", value))
}

/// Expects an array.
pub fn array<'a>(key: &str, value: &'a Value) -> Result<&'a Vec<Value>, TranslateError> {
    value.as_array().ok_or_else(|| wrong_type(key, "array", value))
}

/// Expects a boolean.
pub fn boolean(key: &str, value: &Value) -> Result<bool, TranslateError> {
    value.as_bool().ok_or_else(|| wrong_type(key, "boolean", value))
}

/// Expects a non-negative integer.
pub fn unsigned(key: &str, value: &Value) -> Result<u64, TranslateError> {
    value
        .as_u64()
        .ok_or_else(|| wrong_type(key, "non-negative integer", value))
}

/// Expects a string or a number, returned as text.
pub fn string_or_number(key: &str, value: &Value) -> Result<String, TranslateError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(wrong_type(key, "string or number", other)),
    }
}

/// Expects a string, number or boolean.
pub fn scalar<'a>(key: &str, value: &'a Value) -> Result<&'a Value, TranslateError> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(value),
        other => Err(wrong_type(key, "scalar", other)),
    }
}

/// Looks up a required key.
pub fn required<'a>(
    map: &'a Object,
    context: &'static str,
    key: &'static str,
) -> Result<&'a Value, TranslateError> {
    map.get(key)
        .ok_or(TranslateError::MissingKey { context, key })
}

/// Iterates over the objects of a single object or an array of objects.
pub fn one_or_many<'a>(
    key: &str,
    value: &'a Value,
) -> Result<Vec<&'a Object>, TranslateError> {
    match value {
        Value::Object(map) => Ok(vec![map]),
        Value::Array(items) => items.iter().map(|item| object(key, item)).collect(),
        other => Err(wrong_type(key, "object or array", other)),
    }
}

/// Strips the `.raw` suffix some clients add to unanalyzed field names.
#[must_use]
pub fn strip_raw(column: &str) -> &str {
    column.strip_suffix(".raw").unwrap_or(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_of() {
        assert_eq!(kind_of(&json!(null)), "null");
        assert_eq!(kind_of(&json!([1])), "array");
        assert_eq!(kind_of(&json!({"a": 1})), "object");
        assert_eq!(kind_of(&json!(1.5)), "number");
    }

    #[test]
    fn test_wrong_type_message() {
        let err = string("field", &json!(3)).unwrap_err();
        assert_eq!(err.to_string(), "Expected string at 'field', found number");
    }

    #[test]
    fn test_one_or_many() {
        let single = json!({"term": {"a": 1}});
        assert_eq!(one_or_many("must", &single).unwrap().len(), 1);

        let many = json!([{"term": {"a": 1}}, {"term": {"b": 2}}]);
        assert_eq!(one_or_many("must", &many).unwrap().len(), 2);

        assert!(one_or_many("must", &json!([1])).is_err());
        assert!(one_or_many("must", &json!("x")).is_err());
    }

    #[test]
    fn test_scalar_rejects_containers() {
        assert!(scalar("v", &json!("a")).is_ok());
        assert!(scalar("v", &json!(true)).is_ok());
        let err = scalar("v", &json!(["a"])).unwrap_err();
        assert_eq!(err.to_string(), "Expected scalar at 'v', found array");
        assert!(scalar("v", &json!(null)).is_err());
    }

    #[test]
    fn test_strip_raw() {
        assert_eq!(strip_raw("host.raw"), "host");
        assert_eq!(strip_raw("host"), "host");
    }
}
