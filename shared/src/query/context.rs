//! Read-only context threaded through every translator entry point.

use super::ast::{Literal, TimeRange};
use super::codec::{LiteralCodec, ValueCodec};
use crate::clock::{Clock, SystemClock};
use crate::config::TranslatorConfig;
use serde_json::Value;
use std::sync::Arc;

/// Time column used by trace-style queries.
pub const TRACE_TIME_KEY: &str = "startTimeMillis";

/// Per-request translation context.
///
/// Holds the request id used in log lines, the configured timestamp column,
/// the default time range, and the value codec.
#[derive(Debug, Clone)]
pub struct TranslateContext {
    /// Request id, included in every log line.
    pub qid: u64,
    /// Column whose `range` predicates set the query time range.
    pub timestamp_key: String,
    /// Time range used when the query does not set one.
    pub default_time_range: TimeRange,
    /// Treat `startTimeMillis` as the time column.
    pub trace_query: bool,
    codec: Arc<dyn ValueCodec>,
}

impl TranslateContext {
    /// Builds a context from configuration, reading the current time from `clock`.
    #[must_use]
    pub fn new(qid: u64, config: &TranslatorConfig, clock: &dyn Clock) -> Self {
        Self {
            qid,
            timestamp_key: config.timestamp_key.clone(),
            default_time_range: TimeRange::last_months(
                clock.now_millis(),
                config.default_lookback_months,
            ),
            trace_query: false,
            codec: Arc::new(LiteralCodec),
        }
    }

    /// Builds a context from default configuration and the system clock.
    #[must_use]
    pub fn with_defaults(qid: u64) -> Self {
        Self::new(qid, &TranslatorConfig::default(), &SystemClock)
    }

    /// Marks the request as a trace-style query.
    #[must_use]
    pub fn with_trace_query(mut self, trace_query: bool) -> Self {
        self.trace_query = trace_query;
        self
    }

    /// Replaces the value codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn ValueCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the default time range.
    #[must_use]
    pub fn with_default_time_range(mut self, range: TimeRange) -> Self {
        self.default_time_range = range;
        self
    }

    /// Returns true if `column` is the time column for this request.
    #[must_use]
    pub fn is_time_column(&self, column: &str) -> bool {
        column == self.timestamp_key || (self.trace_query && column == TRACE_TIME_KEY)
    }

    /// The column used for the default sort: the trace time key for trace queries.
    #[must_use]
    pub fn time_key(&self) -> &str {
        if self.trace_query {
            TRACE_TIME_KEY
        } else {
            &self.timestamp_key
        }
    }

    /// Types a literal taken from query text.
    #[must_use]
    pub fn literal_from_text(&self, text: &str) -> Literal {
        self.codec.from_text(text)
    }

    /// Types a JSON scalar, degrading to its JSON text when the codec refuses it.
    #[must_use]
    pub fn literal_from_json(&self, value: &Value) -> Literal {
        match self.codec.from_json(value) {
            Ok(literal) => literal,
            Err(e) => {
                tracing::warn!(qid = self.qid, error = %e, value = %value, "Literal coercion failed, using text");
                Literal::String(value.to_string())
            }
        }
    }
}
