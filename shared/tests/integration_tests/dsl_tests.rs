//! Integration tests for search-DSL translation.
//!
//! Tests cover:
//! - Boolean scoping of must/should/must_not
//! - Leaf query forms
//! - Time range extraction, sort and early-exit handling
//! - Scroll requests
//! - Rejections

use serde_json::json;
use shared::query::{
    parse_request, translate_request, Literal, LogicalOperator, MatchKind, Predicate, QueryNode,
    TimeRange, TranslateError, DEFAULT_SIZE, TRACE_TIME_KEY,
};
use shared::scroll::ScrollError;

use super::common::{dsl, scroll_store, test_ctx};

#[test]
fn test_boolean_scoping() {
    let translation = dsl(&json!({
        "query": {"bool": {"must": [
            {"term": {"col2": "c"}},
            {"bool": {"should": [{"term": {"col1": "a"}}, {"term": {"col1": "b"}}]}}
        ]}}
    }))
    .unwrap();

    let and = translation.query.and_group.unwrap();
    assert_eq!(and.predicates, vec![Predicate::equals("col2", Literal::from("c"))]);
    assert_eq!(and.nested_nodes.len(), 1);
    let or = and.nested_nodes[0].or_group.as_ref().unwrap();
    assert_eq!(
        or.predicates,
        vec![
            Predicate::equals("col1", Literal::from("a")),
            Predicate::equals("col1", Literal::from("b")),
        ]
    );
}

#[test]
fn test_translation_is_idempotent() {
    let body = json!({
        "query": {"bool": {
            "must": [{"match": {"message": "disk full"}}],
            "must_not": [{"exists": {"field": "ack"}}]
        }},
        "aggs": {"by_host": {"terms": {"field": "host"}, "aggs": {"p": {"avg": {"field": "cpu"}}}}},
        "size": 0
    });
    assert_eq!(dsl(&body).unwrap(), dsl(&body).unwrap());
}

#[test]
fn test_absent_query_matches_all() {
    let translation = dsl(&json!({"size": 3})).unwrap();
    assert_eq!(
        translation.query,
        QueryNode::match_all(Some(test_ctx().default_time_range))
    );
    assert_eq!(translation.size, 3);
    assert!(translation.scroll.is_none());
}

#[test]
fn test_top_level_match_all() {
    let translation = dsl(&json!({"query": {"match_all": {}}})).unwrap();
    assert!(translation.query.matches_everything());
    assert_eq!(translation.size, DEFAULT_SIZE);
}

#[test]
fn test_must_not_only() {
    let translation =
        dsl(&json!({"query": {"bool": {"must_not": {"term": {"level": "debug"}}}}})).unwrap();
    let node = translation.query;
    assert_eq!(node.and_group.unwrap().predicates, vec![Predicate::match_all()]);
    assert_eq!(
        node.exclusion_group.unwrap().predicates,
        vec![Predicate::equals("level", Literal::from("debug"))]
    );
}

#[test]
fn test_match_operator_forms() {
    let translation = dsl(&json!({
        "query": {"match": {"message": {"query": "connection refused", "operator": "and"}}}
    }))
    .unwrap();
    match &translation.query.and_group.unwrap().predicates[..] {
        [Predicate::Match(m)] => {
            assert_eq!(m.column, "message");
            assert_eq!(m.words, vec!["connection", "refused"]);
            assert_eq!(m.combinator, LogicalOperator::And);
            assert_eq!(m.kind, MatchKind::Words);
        }
        other => panic!("Unexpected predicates {other:?}"),
    }
}

#[test]
fn test_query_string_inside_bool() {
    let translation = dsl(&json!({
        "query": {"bool": {"filter": [
            {"query_string": {"query": "(col1:abc AND col2:abcd) OR col3:eee", "analyze_wildcard": true}}
        ]}}
    }))
    .unwrap();
    let and = translation.query.and_group.unwrap();
    assert!(and.predicates.is_empty());
    let nested = &and.nested_nodes[0];
    assert_eq!(nested.and_group.as_ref().unwrap().predicates.len(), 2);
    assert_eq!(
        nested.or_group.as_ref().unwrap().predicates,
        vec![Predicate::equals("col3", Literal::from("eee"))]
    );
}

#[test]
fn test_time_range_from_range_query() {
    let translation = dsl(&json!({
        "query": {"bool": {"filter": [{"range": {"timestamp": {
            "gte": "2024-01-01T00:00:00Z",
            "lte": 1_704_067_300_000u64,
            "format": "epoch_millis"
        }}}]}}
    }))
    .unwrap();
    assert_eq!(
        translation.query.time_range,
        Some(TimeRange::new(1_704_067_200_000, 1_704_067_300_000))
    );
    assert!(translation.query.matches_everything());
}

#[test]
fn test_trace_query_uses_trace_time_key() {
    let ctx = test_ctx().with_trace_query(true);
    let translation = translate_request(
        &json!({"query": {"range": {TRACE_TIME_KEY: {"gte": 10, "lte": 20}}}}),
        &ctx,
        None,
    )
    .unwrap();
    assert_eq!(translation.query.time_range, Some(TimeRange::new(10, 20)));
    let sort = translation.pipeline.first().sort.clone().unwrap();
    assert_eq!(sort.column, TRACE_TIME_KEY);
}

#[test]
fn test_explicit_sort_and_total_hits() {
    let translation = dsl(&json!({
        "sort": [{"bytes": {"order": "asc"}}],
        "rest_total_hits_as_int": true
    }))
    .unwrap();
    let sort = translation.pipeline.first().sort.clone().unwrap();
    assert_eq!(sort.column, "bytes");
    assert!(sort.ascending);
    assert!(!translation.pipeline.early_exit);
}

#[test]
fn test_nested_dictionary_query() {
    let translation = dsl(&json!({
        "query": {"nested": {
            "path": "labels",
            "query": {"bool": {"must": [
                {"match": {"labels.key": "region"}},
                {"regexp": {"labels.value": "eu-west-1"}}
            ]}}
        }}
    }))
    .unwrap();
    assert_eq!(
        translation.query.and_group.unwrap().predicates,
        vec![Predicate::dict_array("labels", "region", Literal::from("eu-west-1"))]
    );
}

#[test]
fn test_scroll_lifecycle() {
    let (store, _clock) = scroll_store();
    let ctx = test_ctx();

    let first = translate_request(&json!({"scroll": "1m", "size": 25}), &ctx, Some(&*store)).unwrap();
    let session = first.scroll.unwrap();
    assert_eq!(first.size, 25);
    assert_eq!(session.page_size, 25);

    let next = translate_request(
        &json!({"scroll": "5m", "scroll_id": session.id}),
        &ctx,
        Some(&*store),
    )
    .unwrap();
    let resumed = next.scroll.unwrap();
    assert_eq!(resumed.id, session.id);
    assert_eq!(next.size, 25);
    assert_eq!(resumed.expiry_spec, "5m");

    let fetched = translate_request(&json!({"scroll_id": session.id}), &ctx, Some(&*store)).unwrap();
    assert_eq!(fetched.scroll.unwrap().id, session.id);
}

#[test]
fn test_scroll_errors() {
    let (store, _clock) = scroll_store();
    let ctx = test_ctx();

    let result = translate_request(&json!({"scroll_id": "never-created"}), &ctx, Some(&*store));
    assert!(matches!(
        result,
        Err(TranslateError::Scroll(ScrollError::InvalidSearchContext(_)))
    ));

    let result = translate_request(&json!({"scroll": "1d"}), &ctx, Some(&*store));
    assert!(matches!(
        result,
        Err(TranslateError::Scroll(ScrollError::UnsupportedTimeUnit(_)))
    ));
}

#[test]
fn test_rejections() {
    assert!(matches!(
        dsl(&json!({"query": {"terms": {"user.id": []}}})),
        Err(TranslateError::EmptyTerms(_))
    ));
    assert!(dsl(&json!({"query": {"prefix": {"user.name": {"value": ["SK"]}}}})).is_err());
    assert!(dsl(&json!({"query": {"term": {"user": ["a", "b"]}}})).is_err());
    assert!(dsl(&json!({"query": {"exists": {}}})).is_err());
    assert!(dsl(&json!({"query": {"term": {"a": 1}, "match_all": {}}})).is_err());
    assert!(matches!(
        parse_request("not json", &test_ctx(), None),
        Err(TranslateError::InvalidJson(_))
    ));
}
