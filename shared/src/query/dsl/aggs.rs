//! Aggregation tree builder.
//!
//! Walks a `{name: {kind: params, ...}, ...}` aggregation body and folds it
//! into one pipeline stage. Every `terms` aggregation, at any depth, adds a
//! group-by column to the same [`BucketSpec`]; statistical aggregations add
//! metrics to it; `date_histogram` sets the [`TimeBucketSpec`].

use super::json::{self, Object};
use crate::query::context::TranslateContext;
use crate::query::error::TranslateError;
use crate::query::pipeline::{
    AggregationPipeline, BucketSpec, MetricFunction, MetricSpec, TimeBucketSpec,
    DEFAULT_TERMS_SIZE,
};
use serde_json::Value;

const WEEK_MS: u64 = 7 * 86_400_000;

/// Bounds at or above this are taken as milliseconds, below it as seconds.
const MILLIS_THRESHOLD: u64 = 99_999_999_999;

/// Builds the pipeline for an `aggs` body.
///
/// The pipeline does not exit early: buckets need the full match set.
///
/// # Errors
///
/// Returns an error for unsupported aggregation kinds (`histogram`,
/// `filters`, anything unknown), for statistical or `terms` aggregations
/// without a string `field`, and for malformed intervals or bounds.
///
/// # Examples
///
/// ```
/// use shared::query::{build_aggregations, MetricFunction, TranslateContext};
///
/// let aggs = serde_json::json!({"2": {"terms": {"field": "vpcName"}}});
/// let ctx = TranslateContext::with_defaults(1);
/// let pipeline = build_aggregations(aggs.as_object().unwrap(), &ctx).unwrap();
/// let bucket = pipeline.first().bucket.as_ref().unwrap();
/// assert_eq!(bucket.metrics[0].function, MetricFunction::Count);
/// ```
pub fn build_aggregations(
    aggs: &Object,
    ctx: &TranslateContext,
) -> Result<AggregationPipeline, TranslateError> {
    let mut tree = AggregationTree::default();
    tree.walk(aggs, ctx)?;

    // Responses are keyed by the top-level aggregation name, whatever the nesting.
    let top_level_name = aggs.keys().last().cloned();
    if let Some(bucket) = tree.bucket.as_mut() {
        bucket.name = top_level_name;
        if !bucket.group_by_columns.is_empty() && bucket.metrics.is_empty() {
            bucket.metrics = bucket
                .group_by_columns
                .iter()
                .map(|column| MetricSpec::new(column.clone(), MetricFunction::Count))
                .collect();
        }
    }

    let mut pipeline = AggregationPipeline::new("*");
    let stage = pipeline.first_mut();
    stage.bucket = tree.bucket;
    stage.time_bucket = tree.time_bucket;
    tracing::debug!(
        qid = ctx.qid,
        bucket = ?stage.bucket,
        time_bucket = ?stage.time_bucket,
        "Built aggregation pipeline"
    );
    Ok(pipeline)
}

#[derive(Debug, Default)]
struct AggregationTree {
    bucket: Option<BucketSpec>,
    time_bucket: Option<TimeBucketSpec>,
}

impl AggregationTree {
    fn walk(&mut self, aggs: &Object, ctx: &TranslateContext) -> Result<(), TranslateError> {
        for (name, body) in aggs {
            for (kind, params) in json::object(name, body)? {
                if let Some(function) = metric_function(kind) {
                    self.metric(kind, function, params)?;
                    continue;
                }
                match kind.as_str() {
                    "terms" => self.terms(params, ctx)?,
                    "date_histogram" => self.date_histogram(name, params)?,
                    "aggs" | "aggregations" => self.walk(json::object(kind, params)?, ctx)?,
                    "meta" => {}
                    "histogram" | "filters" => {
                        return Err(TranslateError::unsupported(format!(
                            "{kind} aggregation '{name}'"
                        )))
                    }
                    other => {
                        return Err(TranslateError::unsupported(format!(
                            "aggregation type '{other}'"
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn bucket(&mut self) -> &mut BucketSpec {
        self.bucket.get_or_insert_with(|| BucketSpec {
            bucket_count: DEFAULT_TERMS_SIZE,
            ..BucketSpec::default()
        })
    }

    fn metric(
        &mut self,
        kind: &str,
        function: MetricFunction,
        params: &Value,
    ) -> Result<(), TranslateError> {
        let params = json::object(kind, params)?;
        let field = json::string("field", json::required(params, "metric aggregation", "field")?)?;
        self.bucket()
            .metrics
            .push(MetricSpec::new(json::strip_raw(field), function));
        Ok(())
    }

    fn terms(&mut self, params: &Value, ctx: &TranslateContext) -> Result<(), TranslateError> {
        let params = json::object("terms", params)?;
        let field = json::string("terms.field", json::required(params, "terms", "field")?)?;
        let size = match params.get("size") {
            Some(value) => value.as_u64().unwrap_or_else(|| {
                tracing::warn!(qid = ctx.qid, size = %value, "Ignoring non-numeric terms size");
                DEFAULT_TERMS_SIZE
            }),
            None => DEFAULT_TERMS_SIZE,
        };

        let bucket = self.bucket();
        bucket.group_by_columns.push(json::strip_raw(field).to_string());
        bucket.bucket_count = size;
        Ok(())
    }

    fn date_histogram(&mut self, name: &str, params: &Value) -> Result<(), TranslateError> {
        let params = json::object("date_histogram", params)?;
        let (key, value) = ["interval", "fixed_interval", "calendar_interval"]
            .into_iter()
            .find_map(|key| params.get(key).map(|value| (key, value)))
            .ok_or(TranslateError::MissingKey {
                context: "date_histogram",
                key: "interval",
            })?;
        let interval_ms = parse_interval(json::string(key, value)?)?;

        let (start_time, end_time) = match params.get("extended_bounds") {
            Some(bounds) => {
                let bounds = json::object("extended_bounds", bounds)?;
                (bound(bounds, "min")?, bound(bounds, "max")?)
            }
            None => (None, None),
        };

        self.time_bucket = Some(TimeBucketSpec {
            interval_ms,
            start_time,
            end_time,
            name: Some(name.to_string()),
        });
        Ok(())
    }
}

fn metric_function(kind: &str) -> Option<MetricFunction> {
    match kind {
        "avg" => Some(MetricFunction::Avg),
        "min" => Some(MetricFunction::Min),
        "max" => Some(MetricFunction::Max),
        "sum" => Some(MetricFunction::Sum),
        "cardinality" => Some(MetricFunction::Cardinality),
        "count" | "value_count" => Some(MetricFunction::Count),
        _ => None,
    }
}

/// Parses `<count><unit>` into milliseconds.
///
/// `M`, `q` and `y` are fixed multiples of weeks, not calendar units.
fn parse_interval(text: &str) -> Result<u64, TranslateError> {
    let invalid = || TranslateError::InvalidInterval(text.to_string());
    let split = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let count: u64 = digits.parse().map_err(|_| invalid())?;
    let unit_ms = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => WEEK_MS,
        "M" => 4 * WEEK_MS,
        "q" => 12 * WEEK_MS,
        "y" => 48 * WEEK_MS,
        _ => return Err(invalid()),
    };
    count.checked_mul(unit_ms).ok_or_else(invalid)
}

/// Reads one `extended_bounds` value, normalized to milliseconds.
fn bound(bounds: &Object, key: &str) -> Result<Option<u64>, TranslateError> {
    let Some(value) = bounds.get(key) else {
        return Ok(None);
    };
    let raw = value.as_u64().ok_or_else(|| {
        TranslateError::InvalidBounds(format!("{key} must be a non-negative integer, got {value}"))
    })?;
    if raw >= MILLIS_THRESHOLD {
        Ok(Some(raw))
    } else {
        Ok(Some(raw.saturating_mul(1_000)))
    }
}
