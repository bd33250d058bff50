//! Builders for the leaf queries of the search DSL.
//!
//! Each builder receives the value under its key, e.g. the `{"user": "kim"}`
//! of `{"term": {"user": "kim"}}`, and returns the predicates it stands for.

use super::json::{self, Object};
use crate::query::ast::{
    Condition, FilterOperator, Literal, LogicalOperator, Predicate, QueryNode, TimeRange,
    ANY_COLUMN,
};
use crate::query::context::TranslateContext;
use crate::query::error::TranslateError;
use crate::query::query_string::parse_query_string;
use chrono::DateTime;
use serde_json::Value;

// ============================================================================
// Exact-value queries
// ============================================================================

/// `term`: one equality per field. `{"value": v}` is unwrapped.
pub(super) fn term(ctx: &TranslateContext, spec: &Value) -> Result<Vec<Predicate>, TranslateError> {
    json::object("term", spec)?
        .iter()
        .map(|(column, value)| {
            let value = match value {
                Value::Object(inner) => term_value(inner)?,
                other => other,
            };
            let value = json::scalar(column, value)?;
            Ok(Predicate::equals(
                json::strip_raw(column),
                ctx.literal_from_json(value),
            ))
        })
        .collect()
}

fn term_value(inner: &Object) -> Result<&Value, TranslateError> {
    if let Some(value) = inner.get("value") {
        return Ok(value);
    }
    match inner.values().next() {
        Some(value) if inner.len() == 1 => Ok(value),
        _ => Err(TranslateError::MissingKey {
            context: "term",
            key: "value",
        }),
    }
}

/// `terms`: one OR word match per field. Empty value lists are rejected.
pub(super) fn terms(spec: &Value) -> Result<Vec<Predicate>, TranslateError> {
    let mut predicates = Vec::new();
    for (column, values) in json::object("terms", spec)? {
        if column == "boost" {
            continue;
        }
        let values = json::array(column, values)?;
        if values.is_empty() {
            return Err(TranslateError::EmptyTerms(column.clone()));
        }
        let words = values
            .iter()
            .map(|v| json::string_or_number(column, v))
            .collect::<Result<Vec<_>, _>>()?;
        predicates.push(Predicate::word_list(
            json::strip_raw(column),
            words,
            LogicalOperator::Or,
        ));
    }
    Ok(predicates)
}

/// `exists`: the field must have a value.
pub(super) fn exists(spec: &Value) -> Result<Predicate, TranslateError> {
    let map = json::object("exists", spec)?;
    let field = json::string("exists.field", json::required(map, "exists", "field")?)?;
    Ok(Predicate::not_null(json::strip_raw(field)))
}

// ============================================================================
// Ranges
// ============================================================================

/// `range`: comparisons on ordinary fields. Bounds on the time column narrow
/// `time_range` instead of producing predicates.
pub(super) fn range(
    ctx: &TranslateContext,
    spec: &Value,
    time_range: &mut TimeRange,
) -> Result<Vec<Predicate>, TranslateError> {
    let mut predicates = Vec::new();
    for (column, bounds) in json::object("range", spec)? {
        let column = json::strip_raw(column);
        let is_time = ctx.is_time_column(column);
        for (bound, value) in json::object(column, bounds)? {
            let operator = match bound.as_str() {
                "gt" => FilterOperator::GreaterThan,
                "gte" | "from" => FilterOperator::GreaterThanOrEqualTo,
                "lt" => FilterOperator::LessThan,
                "lte" | "to" => FilterOperator::LessThanOrEqualTo,
                "format" | "include_lower" | "include_upper" | "time_zone" | "boost" => continue,
                other => {
                    return Err(TranslateError::UnknownKey {
                        context: "range",
                        key: other.to_string(),
                    })
                }
            };
            if value.is_null() {
                continue;
            }
            if is_time {
                let millis = epoch_millis(value)?;
                match operator {
                    FilterOperator::GreaterThan | FilterOperator::GreaterThanOrEqualTo => {
                        time_range.start_epoch_ms = millis;
                    }
                    _ => time_range.end_epoch_ms = millis,
                }
            } else {
                let value = json::scalar(bound, value)?;
                predicates.push(Predicate::compare(
                    column,
                    operator,
                    ctx.literal_from_json(value),
                ));
            }
        }
    }
    Ok(predicates)
}

/// Reads a time bound as epoch milliseconds or an RFC 3339 timestamp.
fn epoch_millis(value: &Value) -> Result<u64, TranslateError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| TranslateError::InvalidTime(n.to_string())),
        Value::String(text) => {
            if let Ok(millis) = text.parse::<u64>() {
                return Ok(millis);
            }
            DateTime::parse_from_rfc3339(text)
                .ok()
                .and_then(|t| u64::try_from(t.timestamp_millis()).ok())
                .ok_or_else(|| TranslateError::InvalidTime(text.clone()))
        }
        other => Err(TranslateError::InvalidTime(other.to_string())),
    }
}

// ============================================================================
// Full-text queries
// ============================================================================

fn operator(key: &str, value: &Value) -> Result<LogicalOperator, TranslateError> {
    match json::string(key, value)?.to_ascii_lowercase().as_str() {
        "and" => Ok(LogicalOperator::And),
        "or" => Ok(LogicalOperator::Or),
        other => Err(TranslateError::InvalidValue {
            key: key.to_string(),
            reason: format!("unknown operator '{other}'"),
        }),
    }
}

/// `match`: whitespace-split words, any word by default.
///
/// Accepts `{col: "text"}`, `{col: "text", "operator": "and"}` and
/// `{col: {"query": "text", "operator": "and"}}`.
pub(super) fn match_words(spec: &Value) -> Result<Vec<Predicate>, TranslateError> {
    let fields = json::object("match", spec)?;
    let sibling = fields
        .get("operator")
        .map(|v| operator("match.operator", v))
        .transpose()?;

    let mut predicates = Vec::new();
    for (column, value) in fields {
        if column == "operator" {
            continue;
        }
        let (text, combinator) = match value {
            Value::Object(inner) => {
                let mut text = None;
                let mut combinator = sibling;
                for (key, v) in inner {
                    match key.as_str() {
                        "query" => text = Some(json::string_or_number(key, v)?),
                        "operator" => combinator = Some(operator(key, v)?),
                        other => {
                            return Err(TranslateError::UnknownKey {
                                context: "match",
                                key: other.to_string(),
                            })
                        }
                    }
                }
                let text = text.ok_or(TranslateError::MissingKey {
                    context: "match",
                    key: "query",
                })?;
                (text, combinator)
            }
            other => (json::string_or_number(column, other)?, sibling),
        };
        predicates.push(Predicate::words(
            json::strip_raw(column),
            &text,
            combinator.unwrap_or(LogicalOperator::Or),
        ));
    }
    Ok(predicates)
}

/// `match_phrase`: an exact phrase, all words required.
pub(super) fn match_phrase(spec: &Value) -> Result<Vec<Predicate>, TranslateError> {
    json::object("match_phrase", spec)?
        .iter()
        .map(|(column, value)| {
            let text = match value {
                Value::Object(inner) => json::string(
                    "match_phrase.query",
                    json::required(inner, "match_phrase", "query")?,
                )?,
                other => json::string(column, other)?,
            };
            Ok(Predicate::phrase(json::strip_raw(column), text))
        })
        .collect()
}

/// `multi_match`: one query text against several fields.
pub(super) fn multi_match(spec: &Value) -> Result<Condition, TranslateError> {
    let map = json::object("multi_match", spec)?;
    let mut query = None;
    let mut kind = None;
    let mut fields = vec![ANY_COLUMN.to_string()];
    let mut combinator = LogicalOperator::Or;

    for (key, value) in map {
        match key.as_str() {
            "query" => query = Some(json::string_or_number(key, value)?),
            "type" => kind = Some(json::string(key, value)?),
            "fields" => {
                fields = json::array(key, value)?
                    .iter()
                    .map(|f| json::string(key, f).map(|f| json::strip_raw(f).to_string()))
                    .collect::<Result<_, _>>()?;
            }
            "operator" => combinator = operator(key, value)?,
            "lenient" | "boost" | "tie_breaker" => {}
            other => {
                return Err(TranslateError::UnknownKey {
                    context: "multi_match",
                    key: other.to_string(),
                })
            }
        }
    }
    let query = query.ok_or(TranslateError::MissingKey {
        context: "multi_match",
        key: "query",
    })?;
    let kind = kind.ok_or(TranslateError::MissingKey {
        context: "multi_match",
        key: "type",
    })?;

    match kind {
        "phrase_prefix" => {
            let pattern = format!("{}.*", query.trim().replace('.', ""));
            Ok(Condition::from_predicates(
                fields
                    .into_iter()
                    .map(|f| Predicate::equals(f, Literal::String(pattern.clone())))
                    .collect(),
            ))
        }
        "phrase" => Ok(Condition::from_predicates(
            fields
                .into_iter()
                .map(|f| Predicate::phrase_with(f, &query, combinator))
                .collect(),
        )),
        "best_fields" | "most_fields" => {
            let alternatives = fields
                .into_iter()
                .map(|f| Predicate::words(f, &query, combinator))
                .collect();
            Ok(Condition::from_node(
                QueryNode::new().with_or(Condition::from_predicates(alternatives)),
            ))
        }
        other => Err(TranslateError::unsupported(format!(
            "multi_match type '{other}'"
        ))),
    }
}

/// `query_string` and `simple_query_string`: delegates to the query-string parser.
pub(super) fn query_string(
    ctx: &TranslateContext,
    context: &'static str,
    spec: &Value,
) -> Result<Condition, TranslateError> {
    let mut parsed = None;
    for (key, value) in json::object(context, spec)? {
        match key.as_str() {
            "query" => parsed = Some(parse_query_string(json::string(key, value)?, ctx)),
            "analyze_wildcard" | "default_field" | "default_operator" | "fields" => {
                tracing::debug!(qid = ctx.qid, option = %key, "Ignoring query_string option");
            }
            other => {
                json::string(other, value)?;
                tracing::debug!(qid = ctx.qid, option = %other, "Ignoring query_string option");
            }
        }
    }
    parsed
        .map(|result| result.into_condition())
        .ok_or(TranslateError::MissingKey {
            context,
            key: "query",
        })
}

// ============================================================================
// Pattern queries
// ============================================================================

/// `prefix`: equality against `value*`.
pub(super) fn prefix(spec: &Value) -> Result<Vec<Predicate>, TranslateError> {
    json::object("prefix", spec)?
        .iter()
        .map(|(column, value)| {
            let text = pattern_text("prefix", column, value)?;
            Ok(Predicate::equals(
                json::strip_raw(column),
                Literal::String(format!("{text}*")),
            ))
        })
        .collect()
}

/// `regexp` and `wildcard`: equality against the raw pattern.
pub(super) fn pattern(kind: &'static str, spec: &Value) -> Result<Vec<Predicate>, TranslateError> {
    json::object(kind, spec)?
        .iter()
        .map(|(column, value)| {
            let text = pattern_text(kind, column, value)?;
            Ok(Predicate::equals(json::strip_raw(column), Literal::String(text)))
        })
        .collect()
}

fn pattern_text(kind: &'static str, column: &str, value: &Value) -> Result<String, TranslateError> {
    match value {
        Value::Object(inner) => {
            json::string_or_number(column, json::required(inner, kind, "value")?)
        }
        other => json::string_or_number(column, other),
    }
}

// ============================================================================
// Nested documents
// ============================================================================

/// `nested`: a key/value lookup inside an array of dictionaries.
///
/// Expects `bool.must` to hold a `match` on `<path>.key` and a `regexp` on
/// `<path>.value`.
pub(super) fn nested(ctx: &TranslateContext, spec: &Value) -> Result<Predicate, TranslateError> {
    let map = json::object("nested", spec)?;
    let path = json::string("nested.path", json::required(map, "nested", "path")?)?;
    let query = json::object("nested.query", json::required(map, "nested", "query")?)?;
    let bool_query = json::object("nested.query.bool", json::required(query, "nested.query", "bool")?)?;
    let must = json::array(
        "nested.query.bool.must",
        json::required(bool_query, "nested.query.bool", "must")?,
    )?;

    let key_column = format!("{path}.key");
    let value_column = format!("{path}.value");
    let mut key = None;
    let mut value = None;

    for clause in must {
        let clause = json::object("nested.query.bool.must", clause)?;
        if let Some(spec) = clause.get("match") {
            if let Some(v) = json::object("match", spec)?.get(&key_column) {
                key = Some(nested_text(&key_column, "query", v)?);
            }
        }
        if let Some(spec) = clause.get("regexp") {
            if let Some(v) = json::object("regexp", spec)?.get(&value_column) {
                value = Some(ctx.literal_from_text(&nested_text(&value_column, "value", v)?));
            }
        }
    }

    match (key, value) {
        (Some(key), Some(value)) => Ok(Predicate::dict_array(path, key, value)),
        (None, _) => Err(TranslateError::InvalidValue {
            key: key_column,
            reason: "nested query has no match on the key".to_string(),
        }),
        (_, None) => Err(TranslateError::InvalidValue {
            key: value_column,
            reason: "nested query has no regexp on the value".to_string(),
        }),
    }
}

fn nested_text(column: &str, inner_key: &'static str, value: &Value) -> Result<String, TranslateError> {
    match value {
        Value::Object(inner) => match inner.get(inner_key) {
            Some(v) => json::string_or_number(column, v),
            None => Err(TranslateError::MissingKey {
                context: "nested",
                key: inner_key,
            }),
        },
        other => json::string_or_number(column, other),
    }
}
