//! `bool` recursion and leaf dispatch.

use super::json;
use super::leaf;
use crate::query::ast::{Condition, Predicate, QueryNode, TimeRange};
use crate::query::context::TranslateContext;
use crate::query::error::TranslateError;
use serde_json::Value;

/// Which group of a node a `bool` clause feeds.
#[derive(Debug, Clone, Copy)]
enum Group {
    And,
    Or,
    Exclusion,
}

/// Builds query nodes for one request.
///
/// The time range is shared by the whole request: a `range` on the time
/// column anywhere in the tree narrows it.
pub(super) struct QueryBuilder<'a> {
    ctx: &'a TranslateContext,
    time_range: TimeRange,
}

impl<'a> QueryBuilder<'a> {
    pub(super) fn new(ctx: &'a TranslateContext) -> Self {
        Self {
            ctx,
            time_range: ctx.default_time_range,
        }
    }

    /// The request time range after every leaf has been visited.
    pub(super) fn time_range(&self) -> TimeRange {
        self.time_range
    }

    /// Translates the body of a `bool` query.
    pub(super) fn bool_node(&mut self, spec: &Value) -> Result<QueryNode, TranslateError> {
        let mut node = QueryNode::new();
        for (key, value) in json::object("bool", spec)? {
            let group = match key.as_str() {
                "must" | "filter" => Group::And,
                "should" => Group::Or,
                "must_not" => Group::Exclusion,
                "minimum_should_match" | "boost" | "_name" => {
                    tracing::debug!(qid = self.ctx.qid, option = %key, "Ignoring bool option");
                    continue;
                }
                other => {
                    return Err(TranslateError::UnknownKey {
                        context: "bool",
                        key: other.to_string(),
                    })
                }
            };
            let condition = self.clauses(key, value)?;
            if condition.is_empty() {
                continue;
            }
            match group {
                Group::And => node.join_and(condition),
                Group::Or => node.join_or(condition),
                Group::Exclusion => node.join_exclusion(condition),
            }
        }

        if node.exclusion_group.is_some() && node.and_group.is_none() && node.or_group.is_none() {
            node.and_group = Some(Condition::from_predicates(vec![Predicate::match_all()]));
        }
        Ok(node)
    }

    /// Joins every leaf of a clause list into one condition.
    fn clauses(&mut self, key: &str, value: &Value) -> Result<Condition, TranslateError> {
        let mut condition = Condition::new();
        for item in json::one_or_many(key, value)? {
            for (leaf_key, spec) in item {
                condition.join(self.leaf(leaf_key, spec)?);
            }
        }
        Ok(condition)
    }

    /// Translates one leaf query, or a nested `bool`, into a condition.
    pub(super) fn leaf(&mut self, key: &str, spec: &Value) -> Result<Condition, TranslateError> {
        let ctx = self.ctx;
        let condition = match key {
            "term" => Condition::from_predicates(leaf::term(ctx, spec)?),
            "terms" => Condition::from_predicates(leaf::terms(spec)?),
            "range" => Condition::from_predicates(leaf::range(ctx, spec, &mut self.time_range)?),
            "match" => Condition::from_predicates(leaf::match_words(spec)?),
            "match_phrase" => Condition::from_predicates(leaf::match_phrase(spec)?),
            "prefix" => Condition::from_predicates(leaf::prefix(spec)?),
            "regexp" => Condition::from_predicates(leaf::pattern("regexp", spec)?),
            "wildcard" => Condition::from_predicates(leaf::pattern("wildcard", spec)?),
            "exists" => Condition::from_predicates(vec![leaf::exists(spec)?]),
            "multi_match" => leaf::multi_match(spec)?,
            "match_all" => {
                json::object(key, spec)?;
                Condition::from_predicates(vec![Predicate::match_all()])
            }
            "query_string" => leaf::query_string(ctx, "query_string", spec)?,
            "simple_query_string" => leaf::query_string(ctx, "simple_query_string", spec)?,
            "nested" => Condition::from_predicates(vec![leaf::nested(ctx, spec)?]),
            "bool" => {
                let node = self.bool_node(spec)?;
                if node.matches_everything() {
                    Condition::new()
                } else {
                    Condition::from_node(node)
                }
            }
            other => {
                return Err(TranslateError::UnknownKey {
                    context: "query",
                    key: other.to_string(),
                })
            }
        };
        Ok(condition)
    }
}
