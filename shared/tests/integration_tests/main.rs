//! Integration tests for the Tessera translators and scroll store.
//!
//! These tests drive the public API end to end: SQL and search-DSL requests
//! in, canonical query trees and pipelines out.

mod aggregation_tests;
mod common;
mod dsl_tests;
mod query_string_tests;
mod scroll_tests;
mod sql_tests;
