//! Canonical query AST shared by the SQL and search-DSL translators.
//!
//! A [`QueryNode`] carries up to three groups of filters. Everything inside
//! `and_group` and `exclusion_group` is combined with AND, everything inside
//! `or_group` with OR. A node with no groups matches every record.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

/// Column name meaning "any column".
pub const ANY_COLUMN: &str = "*";

/// Comparison operators for expression predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equal (=)
    Equals,
    /// Not equal (!=, <>)
    NotEquals,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal (>=)
    GreaterThanOrEqualTo,
    /// Less than (<)
    LessThan,
    /// Less than or equal (<=)
    LessThanOrEqualTo,
    /// Column has a value
    IsNotNull,
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equals => write!(f, "="),
            Self::NotEquals => write!(f, "!="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqualTo => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqualTo => write!(f, "<="),
            Self::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Logical operators for combining words or groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    /// Logical AND
    And,
    /// Logical OR
    Or,
}

impl std::fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// A typed literal on the right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl Literal {
    /// Returns the string payload, if this is a string literal.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the literal without quoting.
    #[must_use]
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(fl) => fl.to_string(),
            Self::Boolean(b) => b.to_string(),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{s}'"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// A comparison between a column and an optional literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionPredicate {
    /// Column name, or `*` for any column.
    pub column: String,
    /// The comparison operator.
    pub operator: FilterOperator,
    /// Right-hand side. `None` only for [`FilterOperator::IsNotNull`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal: Option<Literal>,
}

impl std::fmt::Display for ExpressionPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.literal {
            Some(literal) => write!(f, "{} {} {}", self.column, self.operator, literal),
            None => write!(f, "{} {}", self.column, self.operator),
        }
    }
}

/// How a [`MatchPredicate`] compares its words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MatchKind {
    /// Independent words.
    Words,
    /// An exact phrase.
    Phrase {
        /// The trimmed phrase text.
        text: String,
    },
    /// A key/value pair inside an array of dictionaries.
    DictArray {
        /// Dictionary key to look up.
        key: String,
        /// Value the key must hold.
        value: Literal,
    },
}

/// Tokenized free-text, phrase, or dictionary-array match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPredicate {
    /// Column name, or `*` for any column.
    pub column: String,
    /// Tokens to match, in input order.
    pub words: Vec<String>,
    /// Whether all words (AND) or any word (OR) must match.
    pub combinator: LogicalOperator,
    /// Match flavour.
    #[serde(flatten)]
    pub kind: MatchKind,
}

impl MatchPredicate {
    /// Returns true for phrase matches.
    #[must_use]
    pub fn is_phrase(&self) -> bool {
        matches!(self.kind, MatchKind::Phrase { .. })
    }

    /// Returns the phrase text, set only for phrase matches.
    #[must_use]
    pub fn phrase_text(&self) -> Option<&str> {
        match &self.kind {
            MatchKind::Phrase { text } => Some(text),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            MatchKind::Words => write!(
                f,
                "{} MATCH {} [{}]",
                self.column,
                self.combinator,
                self.words.join(", ")
            ),
            MatchKind::Phrase { text } => write!(f, "{} PHRASE '{text}'", self.column),
            MatchKind::DictArray { key, value } => {
                write!(f, "{} DICT '{key}' = {value}", self.column)
            }
        }
    }
}

/// A single filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Predicate {
    /// Column comparison.
    Expression(ExpressionPredicate),
    /// Word, phrase or dictionary match.
    Match(MatchPredicate),
}

impl Predicate {
    /// Builds a comparison predicate.
    #[must_use]
    pub fn compare(column: impl Into<String>, operator: FilterOperator, literal: Literal) -> Self {
        Self::Expression(ExpressionPredicate {
            column: column.into(),
            operator,
            literal: Some(literal),
        })
    }

    /// Builds an equality predicate.
    #[must_use]
    pub fn equals(column: impl Into<String>, literal: Literal) -> Self {
        Self::compare(column, FilterOperator::Equals, literal)
    }

    /// Builds an `IS NOT NULL` predicate.
    #[must_use]
    pub fn not_null(column: impl Into<String>) -> Self {
        Self::Expression(ExpressionPredicate {
            column: column.into(),
            operator: FilterOperator::IsNotNull,
            literal: None,
        })
    }

    /// The `* = *` predicate that matches every record.
    #[must_use]
    pub fn match_all() -> Self {
        Self::equals(ANY_COLUMN, Literal::from(ANY_COLUMN))
    }

    /// Builds a word match, splitting `text` on whitespace.
    #[must_use]
    pub fn words(column: impl Into<String>, text: &str, combinator: LogicalOperator) -> Self {
        Self::Match(MatchPredicate {
            column: column.into(),
            words: text.split_whitespace().map(str::to_string).collect(),
            combinator,
            kind: MatchKind::Words,
        })
    }

    /// Builds a word match from an explicit word list.
    #[must_use]
    pub fn word_list(
        column: impl Into<String>,
        words: Vec<String>,
        combinator: LogicalOperator,
    ) -> Self {
        Self::Match(MatchPredicate {
            column: column.into(),
            words,
            combinator,
            kind: MatchKind::Words,
        })
    }

    /// Builds a phrase match. Words are split on single spaces of the trimmed text.
    #[must_use]
    pub fn phrase(column: impl Into<String>, text: &str) -> Self {
        Self::phrase_with(column, text, LogicalOperator::And)
    }

    /// Builds a phrase match with an explicit word combinator.
    #[must_use]
    pub fn phrase_with(
        column: impl Into<String>,
        text: &str,
        combinator: LogicalOperator,
    ) -> Self {
        let text = text.trim();
        Self::Match(MatchPredicate {
            column: column.into(),
            words: text.split(' ').map(str::to_string).collect(),
            combinator,
            kind: MatchKind::Phrase {
                text: text.to_string(),
            },
        })
    }

    /// Builds a dictionary-array match on `column`.
    #[must_use]
    pub fn dict_array(column: impl Into<String>, key: impl Into<String>, value: Literal) -> Self {
        Self::Match(MatchPredicate {
            column: column.into(),
            words: Vec::new(),
            combinator: LogicalOperator::And,
            kind: MatchKind::DictArray {
                key: key.into(),
                value,
            },
        })
    }

    /// Returns the column this predicate filters on.
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Expression(e) => &e.column,
            Self::Match(m) => &m.column,
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expression(e) => write!(f, "{e}"),
            Self::Match(m) => write!(f, "{m}"),
        }
    }
}

/// Predicates and nested nodes joined by their group's connective.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Direct predicates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<Predicate>,
    /// Sub-expressions, combined with the same connective as `predicates`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_nodes: Vec<QueryNode>,
}

impl Condition {
    /// Creates an empty condition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a condition holding only `predicates`.
    #[must_use]
    pub fn from_predicates(predicates: Vec<Predicate>) -> Self {
        Self {
            predicates,
            nested_nodes: Vec::new(),
        }
    }

    /// Creates a condition holding one nested node.
    #[must_use]
    pub fn from_node(node: QueryNode) -> Self {
        Self {
            predicates: Vec::new(),
            nested_nodes: vec![node],
        }
    }

    /// Appends the predicates and nested nodes of `other`.
    pub fn join(&mut self, other: Condition) {
        self.predicates.extend(other.predicates);
        self.nested_nodes.extend(other.nested_nodes);
    }

    /// Returns true if there is nothing in this condition.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty() && self.nested_nodes.is_empty()
    }

    fn fmt_joined(&self, f: &mut std::fmt::Formatter<'_>, sep: &str) -> std::fmt::Result {
        let parts = self
            .predicates
            .iter()
            .map(ToString::to_string)
            .chain(self.nested_nodes.iter().map(|n| format!("({n})")));
        for (i, part) in parts.enumerate() {
            if i > 0 {
                write!(f, " {sep} ")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

/// Inclusive time bounds in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Lower bound.
    pub start_epoch_ms: u64,
    /// Upper bound.
    pub end_epoch_ms: u64,
}

impl TimeRange {
    /// Creates a time range from explicit bounds.
    #[must_use]
    pub fn new(start_epoch_ms: u64, end_epoch_ms: u64) -> Self {
        Self {
            start_epoch_ms,
            end_epoch_ms,
        }
    }

    /// The window ending at `now_ms` and starting `months` calendar months earlier.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared::query::TimeRange;
    ///
    /// // 2024-04-01T00:00:00Z
    /// let range = TimeRange::last_months(1_711_929_600_000, 3);
    /// // 2024-01-01T00:00:00Z
    /// assert_eq!(range.start_epoch_ms, 1_704_067_200_000);
    /// ```
    #[must_use]
    pub fn last_months(now_ms: u64, months: u32) -> Self {
        let start = i64::try_from(now_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .and_then(|now| now.checked_sub_months(Months::new(months)))
            .and_then(|start| u64::try_from(start.timestamp_millis()).ok())
            .unwrap_or(0);
        Self::new(start, now_ms)
    }
}

/// A node of the filter tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryNode {
    /// Everything that must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and_group: Option<Condition>,
    /// At least one of these must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or_group: Option<Condition>,
    /// None of these may match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusion_group: Option<Condition>,
    /// Time bounds for the query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

impl QueryNode {
    /// Creates an empty node that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A node whose AND-group holds the single `* = *` predicate.
    #[must_use]
    pub fn match_all(time_range: Option<TimeRange>) -> Self {
        Self {
            and_group: Some(Condition::from_predicates(vec![Predicate::match_all()])),
            time_range,
            ..Self::default()
        }
    }

    /// Sets the time range.
    #[must_use]
    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }

    /// Sets the AND-group, replacing any existing one.
    #[must_use]
    pub fn with_and(mut self, condition: Condition) -> Self {
        self.and_group = Some(condition);
        self
    }

    /// Sets the OR-group, replacing any existing one.
    #[must_use]
    pub fn with_or(mut self, condition: Condition) -> Self {
        self.or_group = Some(condition);
        self
    }

    /// Merges `condition` into the AND-group.
    pub fn join_and(&mut self, condition: Condition) {
        join_group(&mut self.and_group, condition);
    }

    /// Merges `condition` into the OR-group.
    pub fn join_or(&mut self, condition: Condition) {
        join_group(&mut self.or_group, condition);
    }

    /// Merges `condition` into the exclusion group.
    pub fn join_exclusion(&mut self, condition: Condition) {
        join_group(&mut self.exclusion_group, condition);
    }

    /// Returns true when no group is populated.
    #[must_use]
    pub fn matches_everything(&self) -> bool {
        self.and_group.is_none() && self.or_group.is_none() && self.exclusion_group.is_none()
    }
}

fn join_group(group: &mut Option<Condition>, condition: Condition) {
    match group {
        Some(existing) => existing.join(condition),
        None => *group = Some(condition),
    }
}

impl std::fmt::Display for QueryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.matches_everything() {
            return write!(f, "*");
        }
        let mut first = true;
        for (label, group, sep) in [
            ("ALL", &self.and_group, "AND"),
            ("ANY", &self.or_group, "OR"),
            ("NONE", &self.exclusion_group, "AND"),
        ] {
            if let Some(condition) = group {
                if !first {
                    write!(f, " ")?;
                }
                first = false;
                write!(f, "{label}[")?;
                condition.fmt_joined(f, sep)?;
                write!(f, "]")?;
            }
        }
        Ok(())
    }
}
