//! Search-DSL translator.
//!
//! Translates an Elasticsearch/OpenSearch style request body into a
//! [`QueryNode`] and an [`AggregationPipeline`], plus the resolved page size
//! and scroll session.
//!
//! # Example
//!
//! ```
//! use shared::query::{parse_request, TranslateContext};
//!
//! let ctx = TranslateContext::with_defaults(1);
//! let body = r#"{"query": {"bool": {"must": [{"term": {"level": "error"}}]}}, "size": 5}"#;
//! let translation = parse_request(body, &ctx, None).unwrap();
//! assert_eq!(translation.size, 5);
//! assert!(translation.pipeline.early_exit);
//! ```

mod aggs;
mod bool_query;
mod json;
mod leaf;

pub use aggs::build_aggregations;

use super::ast::QueryNode;
use super::context::TranslateContext;
use super::error::TranslateError;
use super::pipeline::{AggregationPipeline, SortSpec};
use crate::scroll::{ScrollSession, ScrollStore};
use bool_query::QueryBuilder;
use json::Object;
use serde_json::Value;

/// Page size when the request does not set `size`.
pub const DEFAULT_SIZE: u64 = 10;

/// Top-level keys that are accepted and have no effect on translation.
const IGNORED_KEYS: &[&str] = &[
    "seq_no_primary_term",
    "version",
    "stored_fields",
    "script_fields",
    "docvalue_fields",
    "highlight",
    "_source",
    "timeout",
    "track_total_hits",
];

/// Result of translating a search request.
#[derive(Debug, Clone, PartialEq)]
pub struct DslTranslation {
    /// The filter tree.
    pub query: QueryNode,
    /// Sort, buckets and metrics.
    pub pipeline: AggregationPipeline,
    /// Rows per page.
    pub size: u64,
    /// The scroll session, for scroll requests.
    pub scroll: Option<ScrollSession>,
}

/// Parses and translates a search request body.
///
/// An empty body is a match-all request.
///
/// # Errors
///
/// Returns [`TranslateError::InvalidJson`] for unparsable bodies and any
/// error of [`translate_request`].
pub fn parse_request(
    body: &str,
    ctx: &TranslateContext,
    scrolls: Option<&ScrollStore>,
) -> Result<DslTranslation, TranslateError> {
    let value = if body.trim().is_empty() {
        Value::Object(Object::new())
    } else {
        serde_json::from_str(body).map_err(|e| {
            tracing::warn!(qid = ctx.qid, error = %e, "Search request is not valid JSON");
            TranslateError::InvalidJson(e.to_string())
        })?
    };
    translate_request(&value, ctx, scrolls)
}

/// Translates a parsed search request.
///
/// `scrolls` resolves `scroll`/`scroll_id`; scroll requests fail without it.
///
/// # Errors
///
/// Returns an error for unknown top-level keys, wrongly typed values,
/// unsupported query or aggregation constructs, and invalid scroll contexts.
pub fn translate_request(
    request: &Value,
    ctx: &TranslateContext,
    scrolls: Option<&ScrollStore>,
) -> Result<DslTranslation, TranslateError> {
    let result = translate(request, ctx, scrolls);
    match &result {
        Ok(translation) => tracing::debug!(
            qid = ctx.qid,
            query = %translation.query,
            size = translation.size,
            "Translated search request"
        ),
        Err(e) => tracing::warn!(qid = ctx.qid, error = %e, "Search request translation failed"),
    }
    result
}

fn translate(
    request: &Value,
    ctx: &TranslateContext,
    scrolls: Option<&ScrollStore>,
) -> Result<DslTranslation, TranslateError> {
    let mut query = None;
    let mut aggs = None;
    let mut size = DEFAULT_SIZE;
    let mut sort = None;
    let mut scroll = None;
    let mut scroll_id = None;
    let mut total_hits_as_int = None;

    for (key, value) in json::object("request", request)? {
        match key.as_str() {
            "query" => query = Some(json::object(key, value)?),
            "aggs" | "aggregations" => aggs = Some(json::object(key, value)?),
            "size" => size = json::unsigned(key, value)?,
            "sort" => sort = Some(json::array(key, value)?),
            "scroll" => scroll = Some(json::string(key, value)?),
            "scroll_id" => scroll_id = Some(json::string(key, value)?),
            "rest_total_hits_as_int" => total_hits_as_int = Some(json::boolean(key, value)?),
            ignored if IGNORED_KEYS.contains(&ignored) => {
                tracing::debug!(qid = ctx.qid, key = %ignored, "Ignoring request key");
            }
            other => {
                return Err(TranslateError::UnknownKey {
                    context: "request",
                    key: other.to_string(),
                })
            }
        }
    }

    let session = if scroll.is_some() || scroll_id.is_some() {
        let store = scrolls.ok_or_else(|| TranslateError::unsupported("scroll without a scroll store"))?;
        let session = match scroll {
            Some(timeout) => store.resume_or_create(scroll_id, timeout, size)?,
            None => store.fetch(scroll_id.unwrap_or_default())?,
        };
        size = session.page_size;
        Some(session)
    } else {
        None
    };

    let mut builder = QueryBuilder::new(ctx);
    let mut node = match query {
        Some(query) => root_node(&mut builder, query)?,
        None => QueryNode::new(),
    };
    if node.matches_everything() {
        node = QueryNode::match_all(None);
    }
    node.time_range = Some(builder.time_range());

    let mut pipeline = match aggs {
        Some(aggs) => build_aggregations(aggs, ctx)?,
        None => AggregationPipeline::search_default(ctx.time_key()),
    };
    if let Some(entries) = sort {
        pipeline.first_mut().sort = Some(parse_sort(entries)?);
    }
    if let Some(as_int) = total_hits_as_int {
        pipeline.early_exit = !as_int;
    }

    Ok(DslTranslation {
        query: node,
        pipeline,
        size,
        scroll: session,
    })
}

/// Translates the top-level `query` object, which holds exactly one query.
fn root_node(builder: &mut QueryBuilder<'_>, query: &Object) -> Result<QueryNode, TranslateError> {
    let mut entries = query.iter();
    let (key, spec) = match (entries.next(), entries.next()) {
        (None, _) => return Ok(QueryNode::new()),
        (Some(entry), None) => entry,
        (Some(_), Some(_)) => {
            return Err(TranslateError::InvalidValue {
                key: "query".to_string(),
                reason: format!("expected one query, found {}", query.len()),
            })
        }
    };
    if key == "bool" {
        return builder.bool_node(spec);
    }
    let condition = builder.leaf(key, spec)?;
    if condition.is_empty() {
        Ok(QueryNode::new())
    } else {
        Ok(QueryNode::new().with_and(condition))
    }
}

/// Parses a single-entry `sort`, descending unless `asc` is given.
fn parse_sort(entries: &[Value]) -> Result<SortSpec, TranslateError> {
    let [entry] = entries else {
        return Err(TranslateError::unsupported(format!(
            "sort on {} keys",
            entries.len()
        )));
    };
    let (column, order) = match entry {
        Value::String(column) => (column.as_str(), None),
        other => {
            let map = json::object("sort", other)?;
            let mut columns = map.iter();
            let (Some((column, spec)), None) = (columns.next(), columns.next()) else {
                return Err(TranslateError::unsupported("sort entry must name one column"));
            };
            let order = match spec {
                Value::String(order) => Some(order.as_str()),
                Value::Object(options) => options
                    .get("order")
                    .map(|v| json::string("sort.order", v))
                    .transpose()?,
                other => {
                    return Err(TranslateError::WrongType {
                        key: column.clone(),
                        expected: "string or object",
                        found: json::kind_of(other),
                    })
                }
            };
            (column.as_str(), order)
        }
    };
    let ascending = match order {
        None | Some("desc") => false,
        Some("asc") => true,
        Some(other) => {
            return Err(TranslateError::InvalidValue {
                key: "sort.order".to_string(),
                reason: format!("expected 'asc' or 'desc', got '{other}'"),
            })
        }
    };
    Ok(SortSpec {
        column: json::strip_raw(column).to_string(),
        ascending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::{Literal, Predicate};
    use serde_json::json;

    fn translate_json(body: &Value) -> Result<DslTranslation, TranslateError> {
        translate_request(body, &TranslateContext::with_defaults(9), None)
    }

    #[test]
    fn test_empty_body_matches_all() {
        let ctx = TranslateContext::with_defaults(9);
        let translation = parse_request("", &ctx, None).unwrap();
        assert_eq!(translation.query, QueryNode::match_all(Some(ctx.default_time_range)));
        assert_eq!(translation.size, DEFAULT_SIZE);
        assert!(translation.pipeline.early_exit);
        let sort = translation.pipeline.first().sort.clone().unwrap();
        assert_eq!(sort.column, "timestamp");
        assert!(!sort.ascending);
    }

    #[test]
    fn test_invalid_json() {
        let ctx = TranslateContext::with_defaults(9);
        assert!(matches!(
            parse_request("{\"query\":", &ctx, None),
            Err(TranslateError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_top_level_leaf_query() {
        let translation = translate_json(&json!({"query": {"term": {"level": "error"}}})).unwrap();
        assert_eq!(
            translation.query.and_group.unwrap().predicates,
            vec![Predicate::equals("level", Literal::from("error"))]
        );
    }

    #[test]
    fn test_time_range_applies_to_root() {
        let translation = translate_json(&json!({
            "query": {"bool": {"must": [
                {"match": {"message": "timeout"}},
                {"bool": {"filter": {"range": {"timestamp": {"gte": 100, "lte": 200}}}}}
            ]}}
        }))
        .unwrap();
        let range = translation.query.time_range.unwrap();
        assert_eq!((range.start_epoch_ms, range.end_epoch_ms), (100, 200));
    }

    #[test]
    fn test_sort_forms() {
        let spec = parse_sort(&[json!({"bytes": {"order": "asc"}})]).unwrap();
        assert_eq!(spec, SortSpec { column: "bytes".to_string(), ascending: true });
        let spec = parse_sort(&[json!({"bytes": {}})]).unwrap();
        assert!(!spec.ascending);
        let spec = parse_sort(&[json!({"host.raw": "asc"})]).unwrap();
        assert_eq!(spec.column, "host");
        assert!(parse_sort(&[json!({"a": "asc"}), json!({"b": "asc"})]).is_err());
        assert!(parse_sort(&[json!({"a": "up"})]).is_err());
    }

    #[test]
    fn test_rest_total_hits_as_int() {
        let translation = translate_json(&json!({"rest_total_hits_as_int": false})).unwrap();
        assert!(translation.pipeline.early_exit);
        let translation = translate_json(&json!({"rest_total_hits_as_int": true})).unwrap();
        assert!(!translation.pipeline.early_exit);
        assert!(translate_json(&json!({"rest_total_hits_as_int": "true"})).is_err());
    }

    #[test]
    fn test_wrong_kinds_and_unknown_keys() {
        assert!(matches!(
            translate_json(&json!({"size": "10"})),
            Err(TranslateError::WrongType { .. })
        ));
        assert!(matches!(
            translate_json(&json!({"query": []})),
            Err(TranslateError::WrongType { .. })
        ));
        assert!(matches!(
            translate_json(&json!({"post_filter": {}})),
            Err(TranslateError::UnknownKey { .. })
        ));
        assert!(translate_json(&json!({"_source": false, "version": true})).is_ok());
    }

    #[test]
    fn test_scroll_requires_store() {
        assert!(matches!(
            translate_json(&json!({"scroll": "1m"})),
            Err(TranslateError::Unsupported(_))
        ));
    }
}
