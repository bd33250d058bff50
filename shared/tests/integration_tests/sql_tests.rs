//! Integration tests for SQL translation.
//!
//! Tests cover:
//! - Projection, renames and hardcoded columns
//! - Aggregates with GROUP BY, ORDER BY and LIMIT
//! - WHERE scoping
//! - SHOW and DESCRIBE
//! - Rejections

use shared::query::{
    translate_sql, FilterOperator, Literal, MetricFunction, MetricSpec, Predicate, ShowRequest,
    StageKind, TranslateError, DEFAULT_BUCKET_LIMIT,
};

use super::common::{sql, test_ctx, NOW_MS};

#[test]
fn test_translation_is_idempotent() {
    let statement = "SELECT host, avg(latency) AS mean FROM logs WHERE status >= 500 \
                     AND (region = 'eu' OR region = 'us') GROUP BY host ORDER BY host DESC LIMIT 5";
    assert_eq!(sql(statement), sql(statement));
}

#[test]
fn test_rename_round_trip() {
    let translation = sql("SELECT col AS alias FROM t");
    let projection = translation.pipeline.first().projection.clone().unwrap();
    assert_eq!(projection.rename_columns.get("col").map(String::as_str), Some("alias"));
    assert!(projection.include_columns.contains(&"col".to_string()));
    assert_eq!(translation.columns, vec!["col"]);
}

#[test]
fn test_default_time_range_on_root() {
    let translation = sql("SELECT * FROM logs");
    let range = translation.query.time_range.unwrap();
    assert_eq!(range.end_epoch_ms, NOW_MS);
    assert!(range.start_epoch_ms < NOW_MS);
    assert_eq!(range, test_ctx().default_time_range);
}

#[test]
fn test_group_by_with_metrics_and_sort() {
    let translation =
        sql("SELECT service, count(*), max(bytes) FROM logs GROUP BY service ORDER BY service ASC LIMIT 3");
    let stage = translation.pipeline.first();
    assert_eq!(stage.limit, Some(3));

    let bucket = stage.bucket.as_ref().unwrap();
    assert_eq!(bucket.group_by_columns, vec!["service"]);
    assert_eq!(bucket.bucket_count, 3);
    assert_eq!(
        bucket.metrics,
        vec![
            MetricSpec::new("*", MetricFunction::Count),
            MetricSpec::new("bytes", MetricFunction::Max),
        ]
    );

    let sort = stage.sort.as_ref().unwrap();
    assert_eq!(sort.column, "service");
    assert!(sort.ascending);
}

#[test]
fn test_default_limit() {
    let translation = sql("SELECT count(*) FROM logs");
    assert_eq!(translation.pipeline.first().limit, Some(DEFAULT_BUCKET_LIMIT));
    assert!(translation.pipeline.first().bucket.is_none());
}

#[test]
fn test_renames_get_a_trailing_projection_stage() {
    let translation = sql("SELECT count(*) AS total, 'prod' AS env FROM logs");
    let stages = translation.pipeline.stages();
    assert_eq!(stages.len(), 2);
    assert_eq!(stages[1].kind, StageKind::Projection);

    let renames = stages[1].projection.as_ref().unwrap();
    assert_eq!(renames.rename_aggregation_columns["count(*)"], "total");
    assert_eq!(renames.rename_hardcoded_columns["prod"], "env");
    assert!(renames.hardcoded_columns.is_empty());
}

#[test]
fn test_where_mixed_scoping() {
    let translation = sql("SELECT * FROM logs WHERE level = 'error' AND (service = 'api' OR service = 'web')");
    let and = translation.query.and_group.unwrap();
    assert_eq!(and.nested_nodes.len(), 2);
    assert_eq!(
        and.nested_nodes[0].and_group.as_ref().unwrap().predicates,
        vec![Predicate::equals("level", Literal::from("error"))]
    );
    let or = and.nested_nodes[1].or_group.as_ref().unwrap();
    assert_eq!(or.nested_nodes.len(), 2);
}

#[test]
fn test_where_operators() {
    let translation = sql("SELECT * FROM logs WHERE bytes < '1,000'");
    assert_eq!(
        translation.query.and_group.unwrap().predicates,
        vec![Predicate::compare("bytes", FilterOperator::LessThan, Literal::Integer(1000))]
    );

    let translation = sql("SELECT * FROM logs WHERE host <> 'db'");
    assert_eq!(
        translation.query.and_group.unwrap().predicates,
        vec![Predicate::compare("host", FilterOperator::NotEquals, Literal::from("db"))]
    );
}

#[test]
fn test_like_is_equality_on_pattern() {
    let translation = sql("SELECT * FROM logs WHERE host LIKE web%");
    assert_eq!(
        translation.query.and_group.unwrap().predicates,
        vec![Predicate::equals("host", Literal::from("web%"))]
    );
}

#[test]
fn test_hyphenated_table_name() {
    let translation = sql("SELECT * FROM ind-2024 LIMIT 1");
    assert_eq!(translation.pipeline.table, "ind-2024");
}

#[test]
fn test_show_and_describe() {
    let translation = sql("SHOW TABLES LIKE 'log%'");
    assert_eq!(
        translation.pipeline.show,
        Some(ShowRequest::Tables {
            like: "log%".to_string()
        })
    );

    let translation = sql("SHOW COLUMNS FROM metrics");
    assert_eq!(
        translation.pipeline.show,
        Some(ShowRequest::Columns {
            table: "metrics".to_string()
        })
    );

    assert_eq!(sql("DESC metrics").pipeline.show, translation.pipeline.show);
}

#[test]
fn test_rejections() {
    let ctx = test_ctx();
    for statement in [
        "SELECT * FROM a, b",
        "SELECT * FROM a ORDER BY x, y",
        "SELECT percentile(x) FROM a",
    ] {
        assert!(
            matches!(translate_sql(statement, &ctx), Err(TranslateError::Unsupported(_))),
            "{statement} should be unsupported"
        );
    }
    assert!(matches!(
        translate_sql("SELECT * FROM a LIMIT -1", &ctx),
        Err(TranslateError::InvalidLimit(_))
    ));
    assert!(matches!(translate_sql("", &ctx), Err(TranslateError::Sql(_))));
}
