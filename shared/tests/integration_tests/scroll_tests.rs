//! Integration tests for scroll sessions.
//!
//! Tests cover:
//! - Page clamping against the cached hit count
//! - Expiry through sweeps and the background reaper
//! - Recovery from the session log

use serde_json::{json, Value};
use shared::clock::ManualClock;
use shared::config::ScrollConfig;
use shared::scroll::{ScrollError, ScrollResults, ScrollStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use super::common::{scroll_store, NOW_MS};

fn hits(n: u64) -> Vec<Value> {
    (0..n).map(|i| json!({ "_id": i.to_string() })).collect()
}

#[test]
fn test_page_clamp_at_end_of_results() {
    let (store, _clock) = scroll_store();
    let session = store.create("1m", 10).unwrap();
    store
        .cache_results(&session.id, ScrollResults::new(hits(25)))
        .unwrap();

    store.page(&session.id).unwrap();
    store.page(&session.id).unwrap();
    assert_eq!(store.fetch(&session.id).unwrap().offset, 20);

    let page = store.page(&session.id).unwrap();
    assert_eq!(page.hits.len(), 5);
    assert_eq!(page.offset, 25);
    assert_eq!(store.fetch(&session.id).unwrap().offset, 25);
}

#[test]
fn test_total_hits_may_exceed_cache() {
    let (store, _clock) = scroll_store();
    let session = store.create("30s", 2).unwrap();
    store
        .cache_results(&session.id, ScrollResults::new(hits(2)).with_total_hits(1_000))
        .unwrap();
    let page = store.page(&session.id).unwrap();
    assert_eq!(page.total_hits, 1_000);
    assert_eq!(page.scroll_id, session.id);
}

#[test]
fn test_unknown_id_is_invalid_context() {
    let (store, _clock) = scroll_store();
    assert!(matches!(
        store.fetch("never-created"),
        Err(ScrollError::InvalidSearchContext(_))
    ));
    assert!(matches!(
        store.page("never-created"),
        Err(ScrollError::InvalidSearchContext(_))
    ));
}

#[test]
fn test_expired_sessions_stay_known() {
    let (store, clock) = scroll_store();
    let session = store.create("500ms", 10).unwrap();
    clock.advance(501);
    assert_eq!(store.sweep().unwrap(), 1);
    assert_eq!(store.len().unwrap(), 1);
    assert!(!store.is_valid(&session.id));
    assert!(matches!(
        store.cache_results(&session.id, ScrollResults::new(hits(1))),
        Err(ScrollError::InvalidSearchContext(_))
    ));
}

#[test]
fn test_restart_recovers_offsets() {
    let dir = TempDir::new().unwrap();
    let config = ScrollConfig::with_data_path(dir.path());
    let clock = Arc::new(ManualClock::new(NOW_MS));

    let (live, expired) = {
        let store = ScrollStore::open(&config, clock.clone()).unwrap();
        let live = store.create("1h", 3).unwrap();
        let expired = store.create("1s", 3).unwrap();
        store.cache_results(&live.id, ScrollResults::new(hits(10))).unwrap();
        store.page(&live.id).unwrap();
        clock.advance(2_000);
        assert_eq!(store.sweep().unwrap(), 1);
        (live.id, expired.id)
    };

    let store = ScrollStore::open(&config, clock).unwrap();
    assert_eq!(store.len().unwrap(), 2);
    assert!(!store.is_valid(&expired));
    let page = store.page(&live).unwrap();
    assert_eq!(page.hits[0], json!({"_id": "3"}));
    assert_eq!(page.offset, 6);
}

#[tokio::test]
async fn test_reaper_runs_until_cancelled() {
    let (store, clock) = scroll_store();
    let first = store.create("1s", 1).unwrap();
    let cancel = Arc::clone(&store).spawn_reaper(Duration::from_millis(10));

    clock.advance(1_001);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!store.is_valid(&first.id));

    cancel.cancel();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let second = store.create("1s", 1).unwrap();
    clock.advance(1_001);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(store.is_valid(&second.id));
}
