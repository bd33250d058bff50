//! Translation of parsed SQL into a query node and pipeline.

use super::parser::{
    parse_statement, Comparison, ComparisonOp, FunctionArg, FunctionCall, SelectExpr, SelectItem,
    SelectStatement, SqlStatement, WhereExpr,
};
use crate::query::ast::{Condition, FilterOperator, Predicate, QueryNode};
use crate::query::context::TranslateContext;
use crate::query::error::TranslateError;
use crate::query::pipeline::{
    AggregationPipeline, BucketSpec, LetColumn, MathFunction, MetricFunction, MetricSpec,
    NumericExpr, NumericOp, PipelineStage, ProjectionSpec, ShowRequest, SortSpec, StageKind,
    DEFAULT_BUCKET_LIMIT,
};

/// Result of translating a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlTranslation {
    /// The filter tree.
    pub query: QueryNode,
    /// Projection, buckets, metrics, sort and limit.
    pub pipeline: AggregationPipeline,
    /// Plainly selected columns, in select-list order.
    pub columns: Vec<String>,
}

/// Translates a SQL statement.
///
/// # Errors
///
/// Returns an error if the statement does not parse, names more than one
/// table, orders by more than one key, has a non-integer `LIMIT`, calls an
/// unknown function, or places `*` anywhere but last.
///
/// # Examples
///
/// ```
/// use shared::query::{translate_sql, TranslateContext};
///
/// let ctx = TranslateContext::with_defaults(1);
/// let translation = translate_sql("SELECT host AS h FROM logs", &ctx).unwrap();
/// let projection = translation.pipeline.first().projection.as_ref().unwrap();
/// assert_eq!(projection.include_columns, vec!["host"]);
/// assert_eq!(projection.rename_columns["host"], "h");
/// ```
pub fn translate_sql(sql: &str, ctx: &TranslateContext) -> Result<SqlTranslation, TranslateError> {
    let result = parse_statement(sql)
        .map_err(TranslateError::from)
        .and_then(|statement| translate_statement(statement, ctx));
    match &result {
        Ok(translation) => tracing::debug!(
            qid = ctx.qid,
            query = %translation.query,
            columns = ?translation.columns,
            "Translated SQL statement"
        ),
        Err(e) => tracing::warn!(qid = ctx.qid, sql = %sql, error = %e, "SQL translation failed"),
    }
    result
}

fn translate_statement(
    statement: SqlStatement,
    ctx: &TranslateContext,
) -> Result<SqlTranslation, TranslateError> {
    match statement {
        SqlStatement::Select(select) => translate_select(select, ctx),
        SqlStatement::ShowTables { like } => Ok(show(
            "*",
            ShowRequest::Tables {
                like: like.unwrap_or_else(|| ".*".to_string()),
            },
            ctx,
        )),
        SqlStatement::ShowColumns { table } => {
            let name = table.clone();
            Ok(show(&name, ShowRequest::Columns { table }, ctx))
        }
    }
}

fn show(table: &str, request: ShowRequest, ctx: &TranslateContext) -> SqlTranslation {
    let mut pipeline = AggregationPipeline::new(table);
    pipeline.show = Some(request);
    SqlTranslation {
        query: QueryNode::match_all(Some(ctx.default_time_range)),
        pipeline,
        columns: Vec::new(),
    }
}

// ============================================================================
// SELECT
// ============================================================================

/// Select-list state collected while walking the items.
#[derive(Debug, Default)]
struct SelectPlan {
    projection: ProjectionSpec,
    columns: Vec<String>,
    metrics: Vec<MetricSpec>,
    computed: Vec<LetColumn>,
}

fn translate_select(
    select: SelectStatement,
    ctx: &TranslateContext,
) -> Result<SqlTranslation, TranslateError> {
    let table = match select.tables.as_slice() {
        [] => "*".to_string(),
        [table] if table.eq_ignore_ascii_case("dual") => "*".to_string(),
        [table] => table.clone(),
        tables => {
            return Err(TranslateError::unsupported(format!(
                "{} tables in FROM",
                tables.len()
            )))
        }
    };

    let limit = match &select.limit {
        Some(text) => text
            .parse::<u64>()
            .map_err(|_| TranslateError::InvalidLimit(text.clone()))?,
        None => DEFAULT_BUCKET_LIMIT,
    };

    let sort = match select.order_by.as_slice() {
        [] => None,
        [item] => Some(SortSpec {
            column: item.column.clone(),
            ascending: item.ascending,
        }),
        items => {
            return Err(TranslateError::unsupported(format!(
                "ORDER BY on {} keys",
                items.len()
            )))
        }
    };

    let star_positions: Vec<usize> = select
        .items
        .iter()
        .enumerate()
        .filter(|(_, item)| matches!(item, SelectItem::Star))
        .map(|(i, _)| i)
        .collect();
    match star_positions.as_slice() {
        [] => {}
        [i] if *i + 1 == select.items.len() => {}
        _ => return Err(TranslateError::unsupported("* must appear once, as the last select item")),
    }

    let mut plan = SelectPlan::default();
    for item in select.items {
        if let SelectItem::Expr { expr, alias } = item {
            plan.add(expr, alias, ctx)?;
        }
    }

    let mut pipeline = AggregationPipeline::new(table);
    let stage = pipeline.first_mut();
    stage.limit = Some(limit);
    stage.sort = sort;
    stage.metrics.clone_from(&plan.metrics);
    if !select.group_by.is_empty() {
        stage.bucket = Some(BucketSpec {
            group_by_columns: select.group_by,
            bucket_count: limit,
            metrics: plan.metrics,
            name: None,
        });
    }
    if plan.projection != ProjectionSpec::default() {
        stage.projection = Some(plan.projection.clone());
    }

    for let_column in plan.computed {
        let mut computed = PipelineStage::new(StageKind::Computed);
        computed.projection = Some(ProjectionSpec {
            let_column: Some(let_column),
            ..ProjectionSpec::default()
        });
        pipeline.push(computed);
    }
    if plan.projection.has_renames() {
        let mut renames = PipelineStage::new(StageKind::Projection);
        renames.projection = Some(plan.projection.renames_only());
        pipeline.push(renames);
    }

    Ok(SqlTranslation {
        query: where_node(select.where_clause, ctx),
        pipeline,
        columns: plan.columns,
    })
}

impl SelectPlan {
    fn add(
        &mut self,
        expr: SelectExpr,
        alias: Option<String>,
        ctx: &TranslateContext,
    ) -> Result<(), TranslateError> {
        match expr {
            SelectExpr::Column(column) => {
                if let Some(alias) = alias {
                    self.projection.rename_columns.insert(column.clone(), alias);
                }
                self.projection.include_columns.push(column.clone());
                self.columns.push(column);
            }
            SelectExpr::Literal(text) => {
                self.projection
                    .rename_hardcoded_columns
                    .insert(text.clone(), alias.unwrap_or_else(|| text.clone()));
                self.projection.hardcoded_columns.push(text);
            }
            SelectExpr::Function(call) => self.add_function(call, alias, ctx)?,
        }
        Ok(())
    }

    fn add_function(
        &mut self,
        call: FunctionCall,
        alias: Option<String>,
        ctx: &TranslateContext,
    ) -> Result<(), TranslateError> {
        if let Some(math) = MathFunction::from_name(&call.name) {
            return self.add_math(math, call, alias, ctx);
        }
        let Some(function) = MetricFunction::from_name(&call.name) else {
            return Err(TranslateError::unsupported(format!("function '{}'", call.name)));
        };
        self.metrics.push(MetricSpec::new(call.arg_text(), function));
        if let Some(alias) = alias {
            self.projection
                .rename_aggregation_columns
                .insert(call.to_string().to_lowercase(), alias);
        }
        Ok(())
    }

    fn add_math(
        &mut self,
        math: MathFunction,
        call: FunctionCall,
        alias: Option<String>,
        ctx: &TranslateContext,
    ) -> Result<(), TranslateError> {
        if call.args.is_empty() || call.args.len() > math.max_args() {
            return Err(TranslateError::InvalidValue {
                key: call.to_string(),
                reason: format!(
                    "{math} takes 1 to {} arguments, got {}",
                    math.max_args(),
                    call.args.len()
                ),
            });
        }
        let label = call.to_string();
        let right = call.args.get(1).map(|arg| numeric_arg(arg, ctx)).transpose()?;

        match &call.args[0] {
            FunctionArg::Expr(SelectExpr::Function(inner)) => {
                if let Some(function) = MetricFunction::from_name(&inner.name) {
                    self.metrics.push(MetricSpec::new(inner.arg_text(), function));
                    self.computed.push(LetColumn {
                        name: alias.unwrap_or(label),
                        expr: NumericExpr::op(
                            NumericOp::Math(math),
                            NumericExpr::pre_aggregated(inner.to_string()),
                            right,
                        ),
                    });
                    return Ok(());
                }
            }
            FunctionArg::Expr(_) => {}
            FunctionArg::Star => {
                return Err(TranslateError::InvalidValue {
                    key: label,
                    reason: "* is not a numeric argument".to_string(),
                })
            }
        }

        let left = numeric_arg(&call.args[0], ctx)?;
        self.projection.math_columns.push(LetColumn {
            name: label.clone(),
            expr: NumericExpr::op(NumericOp::Math(math), left, right),
        });
        if let Some(alias) = alias {
            self.projection.rename_columns.insert(label, alias);
        }
        Ok(())
    }
}

/// Converts a function argument into a numeric expression leaf or sub-tree.
fn numeric_arg(arg: &FunctionArg, ctx: &TranslateContext) -> Result<NumericExpr, TranslateError> {
    match arg {
        FunctionArg::Star => Err(TranslateError::InvalidValue {
            key: "*".to_string(),
            reason: "* is not a numeric argument".to_string(),
        }),
        FunctionArg::Expr(SelectExpr::Column(column)) => Ok(NumericExpr::field(column.clone())),
        FunctionArg::Expr(SelectExpr::Literal(text)) => {
            Ok(NumericExpr::literal(ctx.literal_from_text(text)))
        }
        FunctionArg::Expr(SelectExpr::Function(call)) => {
            let left = call
                .args
                .first()
                .map(|arg| numeric_arg(arg, ctx))
                .transpose()?
                .ok_or_else(|| TranslateError::InvalidValue {
                    key: call.to_string(),
                    reason: "missing argument".to_string(),
                })?;
            if let Some(math) = MathFunction::from_name(&call.name) {
                let right = call.args.get(1).map(|arg| numeric_arg(arg, ctx)).transpose()?;
                Ok(NumericExpr::op(NumericOp::Math(math), left, right))
            } else if let Some(function) = MetricFunction::from_name(&call.name) {
                Ok(NumericExpr::op(NumericOp::Metric(function), left, None))
            } else {
                Err(TranslateError::unsupported(format!("function '{}'", call.name)))
            }
        }
    }
}

// ============================================================================
// WHERE
// ============================================================================

/// Builds the root node: match-all when there is no `WHERE`.
fn where_node(expr: Option<WhereExpr>, ctx: &TranslateContext) -> QueryNode {
    let mut node = QueryNode::match_all(Some(ctx.default_time_range));
    let Some(expr) = expr else {
        return node;
    };
    match unwrap_parens(expr) {
        WhereExpr::Comparison(comparison) => {
            node.and_group = Some(Condition::from_predicates(vec![predicate(comparison, ctx)]));
        }
        expr @ WhereExpr::And(..) => {
            node.and_group = Some(nested(and_operands(expr), ctx));
        }
        expr @ WhereExpr::Or(..) => {
            node.or_group = Some(nested(or_operands(expr), ctx));
        }
        WhereExpr::Paren(_) => {}
    }
    node
}

fn unwrap_parens(expr: WhereExpr) -> WhereExpr {
    match expr {
        WhereExpr::Paren(inner) => unwrap_parens(*inner),
        other => other,
    }
}

/// A condition holding one nested node per operand.
fn nested(operands: Vec<WhereExpr>, ctx: &TranslateContext) -> Condition {
    Condition {
        predicates: Vec::new(),
        nested_nodes: operands.into_iter().map(|e| expr_node(e, ctx)).collect(),
    }
}

/// Flattens a left-associative AND chain. Parenthesized operands stay whole.
fn and_operands(expr: WhereExpr) -> Vec<WhereExpr> {
    match expr {
        WhereExpr::And(left, right) => {
            let mut operands = and_operands(*left);
            operands.push(*right);
            operands
        }
        other => vec![other],
    }
}

fn or_operands(expr: WhereExpr) -> Vec<WhereExpr> {
    match expr {
        WhereExpr::Or(left, right) => {
            let mut operands = or_operands(*left);
            operands.push(*right);
            operands
        }
        other => vec![other],
    }
}

fn expr_node(expr: WhereExpr, ctx: &TranslateContext) -> QueryNode {
    match expr {
        WhereExpr::Comparison(comparison) => QueryNode::new().with_and(Condition::from_predicates(
            vec![predicate(comparison, ctx)],
        )),
        expr @ WhereExpr::And(..) => QueryNode::new().with_and(nested(and_operands(expr), ctx)),
        expr @ WhereExpr::Or(..) => QueryNode::new().with_or(nested(or_operands(expr), ctx)),
        WhereExpr::Paren(inner) => expr_node(*inner, ctx),
    }
}

fn predicate(comparison: Comparison, ctx: &TranslateContext) -> Predicate {
    let operator = match comparison.operator {
        ComparisonOp::Eq | ComparisonOp::Like => FilterOperator::Equals,
        ComparisonOp::NotEq => FilterOperator::NotEquals,
        ComparisonOp::Lt => FilterOperator::LessThan,
        ComparisonOp::LtEq => FilterOperator::LessThanOrEqualTo,
        ComparisonOp::Gt => FilterOperator::GreaterThan,
        ComparisonOp::GtEq => FilterOperator::GreaterThanOrEqualTo,
    };
    Predicate::compare(
        comparison.column,
        operator,
        ctx.literal_from_text(&comparison.value.text),
    )
}
