//! Common test utilities and helpers for integration tests.

use serde_json::Value;
use shared::clock::ManualClock;
use shared::config::TranslatorConfig;
use shared::query::{
    translate_request, translate_sql, DslTranslation, SqlTranslation, TranslateContext,
    TranslateError,
};
use shared::scroll::ScrollStore;
use std::sync::Arc;

/// Fixed "now" for every test context: 2024-01-01T00:00:00Z.
pub const NOW_MS: u64 = 1_704_067_200_000;

/// Creates a translation context with default configuration and a frozen clock.
pub fn test_ctx() -> TranslateContext {
    TranslateContext::new(42, &TranslatorConfig::default(), &ManualClock::new(NOW_MS))
}

/// Translates a SQL statement, panicking on failure.
pub fn sql(statement: &str) -> SqlTranslation {
    translate_sql(statement, &test_ctx())
        .unwrap_or_else(|e| panic!("SQL '{statement}' failed: {e}"))
}

/// Translates a search request without a scroll store.
pub fn dsl(body: &Value) -> Result<DslTranslation, TranslateError> {
    translate_request(body, &test_ctx(), None)
}

/// Creates an in-memory scroll store and its clock.
pub fn scroll_store() -> (Arc<ScrollStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(NOW_MS));
    let store = Arc::new(ScrollStore::in_memory(clock.clone()));
    (store, clock)
}
