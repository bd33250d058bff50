//! Query-string mini-language.
//!
//! Parses strings such as `col1:abc AND col2:abcd`, `(a AND b) OR c` or
//! `col1:(x OR y)` into predicates:
//!
//! - `column:value` becomes an equality predicate.
//! - bare text becomes a word match on `*`, or an equality on the current
//!   column when one is still in effect.
//! - double-quoted bare text becomes a phrase match on `*`.
//!
//! The input is split on `(` and `)` first, then each piece on `" AND "`, then
//! each AND segment on `" OR "`. Segments without `OR` feed the AND-group,
//! alternatives feed the OR-group.
//!
//! A column named by `column:value` stays in effect for following bare
//! values. Without parentheses it is cleared at every AND and OR boundary.
//! With parentheses it is cleared only after the first `)` of a bracket group,
//! so `col1:(x OR y)` applies `col1` to both alternatives.
//!
//! # Example
//!
//! ```
//! use shared::query::{parse_query_string, QueryStringResult, TranslateContext};
//!
//! let ctx = TranslateContext::with_defaults(1);
//! match parse_query_string("col1:abc AND col2:abcd", &ctx) {
//!     QueryStringResult::Tree(node) => {
//!         assert_eq!(node.and_group.unwrap().predicates.len(), 2);
//!     }
//!     QueryStringResult::Flat(_) => panic!("expected a tree"),
//! }
//! ```

use super::ast::{Condition, LogicalOperator, Predicate, QueryNode, ANY_COLUMN};
use super::context::TranslateContext;

/// Output of [`parse_query_string`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryStringResult {
    /// A single clause without connectives or quotes.
    Flat(Vec<Predicate>),
    /// A boolean sub-tree with AND and OR groups.
    Tree(QueryNode),
}

impl QueryStringResult {
    /// Wraps the result as a condition: flat predicates directly, a tree as a nested node.
    #[must_use]
    pub fn into_condition(self) -> Condition {
        match self {
            Self::Flat(predicates) => Condition::from_predicates(predicates),
            Self::Tree(node) => Condition::from_node(node),
        }
    }
}

/// Parses a query string.
#[must_use]
pub fn parse_query_string(text: &str, ctx: &TranslateContext) -> QueryStringResult {
    let bracket_groups: Vec<&str> = text.split('(').collect();
    let bracketed = bracket_groups.len() > 1;

    let mut and_predicates = Vec::new();
    let mut or_predicates = Vec::new();
    let mut column: Option<String> = None;

    for group in bracket_groups {
        for (index, piece) in group.split(')').enumerate() {
            if index > 0 {
                column = None;
            }
            for segment in piece.split(" AND ") {
                if !bracketed {
                    column = None;
                }
                let alternatives: Vec<&str> = segment.split(" OR ").collect();
                if alternatives.len() == 1 {
                    if let Some(pred) = clause(segment, &mut column, ctx) {
                        and_predicates.push(pred);
                    }
                    continue;
                }
                for alternative in alternatives {
                    if !bracketed {
                        column = None;
                    }
                    if let Some(pred) = clause(alternative, &mut column, ctx) {
                        or_predicates.push(pred);
                    }
                }
            }
        }
    }

    let compound = text.contains(" AND ") || text.contains(" OR ") || text.contains('"');
    if !compound {
        return QueryStringResult::Flat(and_predicates);
    }

    let mut node = QueryNode::new();
    if !and_predicates.is_empty() {
        node.and_group = Some(Condition::from_predicates(and_predicates));
    }
    if !or_predicates.is_empty() {
        node.or_group = Some(Condition::from_predicates(or_predicates));
    }
    tracing::debug!(qid = ctx.qid, query = %text, node = %node, "Parsed query string");
    QueryStringResult::Tree(node)
}

/// Turns one token into a predicate, updating the column in effect.
fn clause(token: &str, column: &mut Option<String>, ctx: &TranslateContext) -> Option<Predicate> {
    if token.trim().is_empty() {
        return None;
    }
    match token.split_once(':') {
        Some((name, value)) => {
            let name = name.trim();
            *column = (!name.is_empty()).then(|| name.to_string());
            value_predicate(column.as_deref(), value.trim(), ctx)
        }
        None => value_predicate(column.as_deref(), token.trim(), ctx),
    }
}

fn value_predicate(column: Option<&str>, value: &str, ctx: &TranslateContext) -> Option<Predicate> {
    if value.is_empty() {
        return None;
    }
    let unquoted = value.replace('"', "");
    Some(match column {
        Some(column) => Predicate::equals(column, ctx.literal_from_text(unquoted.trim())),
        None if value.contains('"') => Predicate::phrase(ANY_COLUMN, &unquoted),
        None => Predicate::words(ANY_COLUMN, &unquoted, LogicalOperator::Or),
    })
}
