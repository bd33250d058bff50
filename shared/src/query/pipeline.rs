//! Aggregation pipeline: the ordered projection, bucket and metric stages
//! applied after filtering.

use super::ast::Literal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Default bucket cap for SQL `GROUP BY` and row cap for SQL queries.
pub const DEFAULT_BUCKET_LIMIT: u64 = 100;

/// Default bucket cap for search-DSL `terms` aggregations.
pub const DEFAULT_TERMS_SIZE: u64 = 10_000;

/// Aggregate functions usable as metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFunction {
    /// Row count
    Count,
    /// Arithmetic mean
    Avg,
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Sum
    Sum,
    /// Distinct value count
    Cardinality,
}

impl MetricFunction {
    /// Looks up a metric function by name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(Self::Count),
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "sum" => Some(Self::Sum),
            "cardinality" => Some(Self::Cardinality),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetricFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Avg => write!(f, "avg"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
            Self::Sum => write!(f, "sum"),
            Self::Cardinality => write!(f, "cardinality"),
        }
    }
}

/// Scalar math functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathFunction {
    /// Round, with optional precision
    Round,
    /// Ceiling
    Ceil,
    /// Absolute value
    Abs,
    /// Square root
    Sqrt,
    /// Natural exponent
    Exp,
}

impl MathFunction {
    /// Looks up a math function by name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "round" => Some(Self::Round),
            "ceil" => Some(Self::Ceil),
            "abs" => Some(Self::Abs),
            "sqrt" => Some(Self::Sqrt),
            "exp" => Some(Self::Exp),
            _ => None,
        }
    }

    /// Largest number of arguments the function accepts.
    #[must_use]
    pub fn max_args(self) -> usize {
        match self {
            Self::Round => 2,
            _ => 1,
        }
    }
}

impl std::fmt::Display for MathFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Round => write!(f, "round"),
            Self::Ceil => write!(f, "ceil"),
            Self::Abs => write!(f, "abs"),
            Self::Sqrt => write!(f, "sqrt"),
            Self::Exp => write!(f, "exp"),
        }
    }
}

/// Operator of an internal [`NumericExpr`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "function")]
pub enum NumericOp {
    /// Scalar math.
    Math(MathFunction),
    /// Metric function wrapping a column reference.
    Metric(MetricFunction),
}

/// Leaf of a [`NumericExpr`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericTerminal {
    /// A constant.
    Literal(Literal),
    /// A column reference.
    Field(String),
    /// The output of an aggregate computed earlier, e.g. `sum(x)`.
    PreAggregated(String),
}

/// Binary expression tree used by computed columns and math functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericExpr {
    /// A leaf value.
    Terminal(NumericTerminal),
    /// An operator applied to one or two operands.
    Op {
        /// The operator.
        op: NumericOp,
        /// First operand.
        left: Box<NumericExpr>,
        /// Optional second operand, e.g. the precision of `round`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right: Option<Box<NumericExpr>>,
    },
}

impl NumericExpr {
    /// A column reference leaf.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Terminal(NumericTerminal::Field(name.into()))
    }

    /// A constant leaf.
    #[must_use]
    pub fn literal(value: Literal) -> Self {
        Self::Terminal(NumericTerminal::Literal(value))
    }

    /// A leaf naming an already-aggregated value.
    #[must_use]
    pub fn pre_aggregated(text: impl Into<String>) -> Self {
        Self::Terminal(NumericTerminal::PreAggregated(text.into()))
    }

    /// An internal node.
    #[must_use]
    pub fn op(op: NumericOp, left: NumericExpr, right: Option<NumericExpr>) -> Self {
        Self::Op {
            op,
            left: Box::new(left),
            right: right.map(Box::new),
        }
    }
}

/// A computed column built from a numeric expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetColumn {
    /// Output column name.
    pub name: String,
    /// Expression producing the value.
    pub expr: NumericExpr,
}

/// Column selection and renaming.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSpec {
    /// Columns to keep. Empty means all columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_columns: Vec<String>,
    /// Raw column renames, original to alias.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rename_columns: BTreeMap<String, String>,
    /// Aggregate output renames, lower-cased call text to alias.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rename_aggregation_columns: BTreeMap<String, String>,
    /// Literal output columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hardcoded_columns: Vec<String>,
    /// Literal column names, literal text to output name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rename_hardcoded_columns: BTreeMap<String, String>,
    /// Math over raw columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub math_columns: Vec<LetColumn>,
    /// Computed column over aggregated values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub let_column: Option<LetColumn>,
}

impl ProjectionSpec {
    /// Returns true if any rename map has entries.
    #[must_use]
    pub fn has_renames(&self) -> bool {
        !self.rename_columns.is_empty()
            || !self.rename_aggregation_columns.is_empty()
            || !self.rename_hardcoded_columns.is_empty()
    }

    /// Copies only the rename maps.
    #[must_use]
    pub fn renames_only(&self) -> Self {
        Self {
            rename_columns: self.rename_columns.clone(),
            rename_aggregation_columns: self.rename_aggregation_columns.clone(),
            rename_hardcoded_columns: self.rename_hardcoded_columns.clone(),
            ..Self::default()
        }
    }
}

/// An aggregate computed per bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Input column.
    pub column: String,
    /// Aggregate function.
    pub function: MetricFunction,
}

impl MetricSpec {
    /// Creates a metric.
    #[must_use]
    pub fn new(column: impl Into<String>, function: MetricFunction) -> Self {
        Self {
            column: column.into(),
            function,
        }
    }
}

/// Group-by bucketing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    /// Group-by columns, in order.
    pub group_by_columns: Vec<String>,
    /// Maximum number of buckets.
    pub bucket_count: u64,
    /// Metrics computed per bucket.
    pub metrics: Vec<MetricSpec>,
    /// Name used to correlate nested aggregation results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Fixed-interval time bucketing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucketSpec {
    /// Bucket width in milliseconds.
    pub interval_ms: u64,
    /// Lower bound in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    /// Upper bound in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    /// Name used to correlate nested aggregation results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Row ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Column to sort by.
    pub column: String,
    /// Ascending when true.
    pub ascending: bool,
}

/// Role of a pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// The first stage, applied to matched rows.
    #[default]
    Query,
    /// Adds a computed column over aggregated values.
    Computed,
    /// Applies renames after aggregation.
    Projection,
}

/// One stage of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    /// Stage role.
    pub kind: StageKind,
    /// Column selection and renames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<ProjectionSpec>,
    /// Group-by bucketing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<BucketSpec>,
    /// Time bucketing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_bucket: Option<TimeBucketSpec>,
    /// Whole-result metrics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricSpec>,
    /// Row ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    /// Row cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl PipelineStage {
    /// Creates an empty stage of the given kind.
    #[must_use]
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

/// `SHOW` requests from SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowRequest {
    /// List tables whose name matches `like`.
    Tables {
        /// Name pattern, `.*` when absent.
        like: String,
    },
    /// List the columns of one table.
    Columns {
        /// Table to describe.
        table: String,
    },
}

/// Ordered chain of stages applied after filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationPipeline {
    /// Target table, `*` for all.
    pub table: String,
    /// Set for `SHOW` statements instead of a row query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<ShowRequest>,
    /// Stop counting matches once enough rows are found.
    pub early_exit: bool,
    /// Stages in execution order. Never empty.
    #[serde(deserialize_with = "non_empty_stages")]
    stages: Vec<PipelineStage>,
}

fn non_empty_stages<'de, D>(deserializer: D) -> Result<Vec<PipelineStage>, D::Error>
where
    D: Deserializer<'de>,
{
    let stages = Vec::<PipelineStage>::deserialize(deserializer)?;
    if stages.is_empty() {
        return Err(serde::de::Error::invalid_length(0, &"at least one stage"));
    }
    Ok(stages)
}

impl AggregationPipeline {
    /// A pipeline with one empty query stage.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            show: None,
            early_exit: false,
            stages: vec![PipelineStage::new(StageKind::Query)],
        }
    }

    /// The default search pipeline: early exit, newest rows first.
    #[must_use]
    pub fn search_default(timestamp_key: &str) -> Self {
        let mut pipeline = Self::new("*");
        pipeline.early_exit = true;
        pipeline.first_mut().sort = Some(SortSpec {
            column: timestamp_key.to_string(),
            ascending: false,
        });
        pipeline
    }

    /// Stages in execution order, starting with the query stage.
    #[must_use]
    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// The first stage.
    #[must_use]
    pub fn first(&self) -> &PipelineStage {
        &self.stages[0]
    }

    /// The first stage, mutably.
    pub fn first_mut(&mut self) -> &mut PipelineStage {
        &mut self.stages[0]
    }

    /// Appends a stage.
    pub fn push(&mut self, stage: PipelineStage) {
        self.stages.push(stage);
    }

    /// Iterates over the projections of every stage that has one.
    pub fn projections(&self) -> impl Iterator<Item = &ProjectionSpec> {
        self.stages.iter().filter_map(|s| s.projection.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_function_from_name() {
        assert_eq!(MetricFunction::from_name("SUM"), Some(MetricFunction::Sum));
        assert_eq!(MetricFunction::from_name("cardinality"), Some(MetricFunction::Cardinality));
        assert_eq!(MetricFunction::from_name("median"), None);
    }

    #[test]
    fn test_math_function_arity() {
        assert_eq!(MathFunction::Round.max_args(), 2);
        assert_eq!(MathFunction::Sqrt.max_args(), 1);
        assert_eq!(MathFunction::from_name("Ceil"), Some(MathFunction::Ceil));
    }

    #[test]
    fn test_search_default_pipeline() {
        let pipeline = AggregationPipeline::search_default("timestamp");
        assert!(pipeline.early_exit);
        assert_eq!(pipeline.stages().len(), 1);
        assert_eq!(
            pipeline.first().sort,
            Some(SortSpec {
                column: "timestamp".to_string(),
                ascending: false
            })
        );
    }

    #[test]
    fn test_pipeline_rejects_empty_stages() {
        let pipeline = AggregationPipeline::search_default("timestamp");
        let mut json = serde_json::to_value(&pipeline).unwrap();
        let decoded: AggregationPipeline = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(decoded, pipeline);

        json["stages"] = serde_json::json!([]);
        assert!(serde_json::from_value::<AggregationPipeline>(json).is_err());
    }

    #[test]
    fn test_projection_renames_only() {
        let mut projection = ProjectionSpec {
            include_columns: vec!["a".to_string()],
            ..ProjectionSpec::default()
        };
        assert!(!projection.has_renames());
        projection
            .rename_columns
            .insert("a".to_string(), "alpha".to_string());
        let renames = projection.renames_only();
        assert!(renames.has_renames());
        assert!(renames.include_columns.is_empty());
    }

    #[test]
    fn test_numeric_expr_serialization() {
        let expr = NumericExpr::op(
            NumericOp::Math(MathFunction::Round),
            NumericExpr::pre_aggregated("sum(x)"),
            Some(NumericExpr::literal(Literal::Integer(2))),
        );
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json["op"]["op"]["kind"], "math");
        assert_eq!(json["op"]["op"]["function"], "round");
        assert_eq!(json["op"]["left"]["terminal"]["pre_aggregated"], "sum(x)");
    }
}
