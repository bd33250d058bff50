//! Integration tests for aggregation requests.
//!
//! Tests cover:
//! - Date histogram interval and bound conversion
//! - Terms buckets with and without metrics
//! - Unsupported aggregation kinds

use serde_json::json;
use shared::query::{MetricFunction, MetricSpec, TranslateError, DEFAULT_TERMS_SIZE};

use super::common::dsl;

#[test]
fn test_date_histogram_unit_conversion() {
    let translation = dsl(&json!({
        "size": 0,
        "aggs": {"over_time": {"date_histogram": {
            "field": "timestamp",
            "interval": "2h",
            "extended_bounds": {"min": 0, "max": 10}
        }}}
    }))
    .unwrap();
    let time_bucket = translation.pipeline.first().time_bucket.clone().unwrap();
    assert_eq!(time_bucket.interval_ms, 7_200_000);
    assert_eq!(time_bucket.start_time, Some(0));
    assert_eq!(time_bucket.end_time, Some(10_000));
    assert_eq!(time_bucket.name.as_deref(), Some("over_time"));
    assert_eq!(translation.size, 0);
}

#[test]
fn test_terms_without_metric_counts() {
    let translation = dsl(&json!({"aggs": {"2": {"terms": {"field": "vpcName"}}}})).unwrap();
    let stage = translation.pipeline.first();
    let bucket = stage.bucket.as_ref().unwrap();
    assert_eq!(bucket.metrics, vec![MetricSpec::new("vpcName", MetricFunction::Count)]);
    assert_eq!(bucket.group_by_columns, vec!["vpcName"]);
    assert_eq!(bucket.bucket_count, DEFAULT_TERMS_SIZE);
    assert_eq!(bucket.name.as_deref(), Some("2"));
    assert!(!translation.pipeline.early_exit);
    assert!(stage.sort.is_none());
}

#[test]
fn test_nested_bucket_takes_top_level_name() {
    let translation = dsl(&json!({
        "aggs": {"2": {"aggs": {
            "agg1": {"terms": {"field": "vpcName"}},
            "3": {"avg": {"field": "a"}}
        }}}
    }))
    .unwrap();
    let bucket = translation.pipeline.first().bucket.clone().unwrap();
    assert_eq!(bucket.group_by_columns, vec!["vpcName"]);
    assert_eq!(bucket.metrics, vec![MetricSpec::new("a", MetricFunction::Avg)]);
    assert_eq!(bucket.name.as_deref(), Some("2"));
}

#[test]
fn test_nested_terms_histogram_and_metrics() {
    let translation = dsl(&json!({
        "aggregations": {"hosts": {
            "terms": {"field": "host.raw", "size": 5},
            "aggs": {
                "per_minute": {
                    "date_histogram": {"field": "timestamp", "fixed_interval": "1m"},
                    "aggs": {
                        "bytes": {"sum": {"field": "bytes"}},
                        "users": {"cardinality": {"field": "user"}}
                    }
                }
            }
        }}
    }))
    .unwrap();
    let stage = translation.pipeline.first();
    let bucket = stage.bucket.as_ref().unwrap();
    assert_eq!(bucket.group_by_columns, vec!["host"]);
    assert_eq!(bucket.bucket_count, 5);
    assert_eq!(
        bucket.metrics,
        vec![
            MetricSpec::new("bytes", MetricFunction::Sum),
            MetricSpec::new("user", MetricFunction::Cardinality),
        ]
    );
    assert_eq!(stage.time_bucket.as_ref().unwrap().interval_ms, 60_000);
}

#[test]
fn test_unsupported_aggregations_rejected() {
    for aggs in [
        json!({"h": {"histogram": {"field": "bytes", "interval": 10}}}),
        json!({"f": {"filters": {"filters": {}}}}),
        json!({"p": {"percentiles": {"field": "latency"}}}),
    ] {
        assert!(matches!(
            dsl(&json!({"aggs": aggs})),
            Err(TranslateError::Unsupported(_))
        ));
    }
}

#[test]
fn test_malformed_aggregations_rejected() {
    assert!(dsl(&json!({"aggs": {"a": {"avg": {}}}})).is_err());
    assert!(dsl(&json!({"aggs": {"a": {"terms": {"field": 3}}}})).is_err());
    assert!(matches!(
        dsl(&json!({"aggs": {"t": {"date_histogram": {"interval": "5x"}}}})),
        Err(TranslateError::InvalidInterval(_))
    ));
    assert!(matches!(
        dsl(&json!({"aggs": {"t": {"date_histogram": {
            "interval": "1h",
            "extended_bounds": {"min": "now-1d"}
        }}}})),
        Err(TranslateError::InvalidBounds(_))
    ));
}
