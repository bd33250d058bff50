//! Scroll sessions.
//!
//! A scroll session is a server-side cursor over a cached result set. Search
//! requests that carry `scroll` create or resume a session; later pages are
//! served from the cache until the session's timeout passes and the reaper
//! invalidates it.
//!
//! Every mutation is recorded through a [`ScrollPersistence`] backend so the
//! session table survives a restart.
//!
//! # Example
//!
//! ```
//! use shared::clock::ManualClock;
//! use shared::scroll::{ScrollResults, ScrollStore};
//! use std::sync::Arc;
//!
//! let store = ScrollStore::in_memory(Arc::new(ManualClock::new(0)));
//! let session = store.create("1m", 2).unwrap();
//! store
//!     .cache_results(&session.id, ScrollResults::new(vec![1.into(), 2.into(), 3.into()]))
//!     .unwrap();
//!
//! assert_eq!(store.page(&session.id).unwrap().hits.len(), 2);
//! assert_eq!(store.page(&session.id).unwrap().hits.len(), 1);
//! ```

mod persist;

pub use persist::{FilePersistence, InMemoryPersistence, ScrollPersistence, SESSION_LOG};

use crate::clock::Clock;
use crate::config::ScrollConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Errors that can occur during scroll operations.
#[derive(Debug, Error)]
pub enum ScrollError {
    /// The scroll id is unknown, expired, or has no cached results.
    #[error("Invalid search context: {0}")]
    InvalidSearchContext(String),

    /// The timeout is not `<digits><unit>`.
    #[error("Invalid scroll timeout: '{0}'")]
    InvalidTimeout(String),

    /// The timeout unit is recognized but not supported for scrolls.
    #[error("Unsupported scroll time unit: '{0}'")]
    UnsupportedTimeUnit(String),

    /// Failed to acquire lock on the session table.
    #[error("Failed to acquire lock on scroll store")]
    LockError,

    /// Reading or writing session files failed.
    #[error("Scroll I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cached results could not be encoded or decoded.
    #[error("Scroll serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Parses a scroll timeout such as `30s` or `1m` into milliseconds.
///
/// Supported units are `ms`, `s`, `m` and `h`. Surrounding whitespace is
/// ignored; callers store the trimmed text.
///
/// # Errors
///
/// Returns [`ScrollError::UnsupportedTimeUnit`] for `d`, `micros` and `nanos`,
/// and [`ScrollError::InvalidTimeout`] for anything else that is not
/// `<digits><unit>`.
pub fn parse_timeout(spec: &str) -> Result<u64, ScrollError> {
    let pattern = Regex::new(r"^([0-9]+)([a-z]+)$")
        .map_err(|e| ScrollError::InvalidTimeout(e.to_string()))?;
    let invalid = || ScrollError::InvalidTimeout(spec.to_string());
    let captures = pattern.captures(spec.trim()).ok_or_else(invalid)?;
    let amount: u64 = captures[1].parse().map_err(|_| invalid())?;
    let unit_ms: u64 = match &captures[2] {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        unit @ ("d" | "micros" | "nanos") => {
            return Err(ScrollError::UnsupportedTimeUnit(unit.to_string()))
        }
        _ => return Err(invalid()),
    };
    amount.checked_mul(unit_ms).ok_or_else(invalid)
}

/// Cursor state of one scroll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollSession {
    /// Opaque id handed back to the client.
    pub id: String,
    /// Hits per page.
    pub page_size: u64,
    /// Hits already returned.
    pub offset: u64,
    /// The timeout as the client sent it, trimmed, e.g. `1m`.
    pub expiry_spec: String,
    /// Absolute expiry, in epoch milliseconds.
    pub expiry_epoch_ms: u64,
    /// False once expired.
    pub valid: bool,
}

impl ScrollSession {
    /// Returns true if the session's expiry is before `now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expiry_epoch_ms < now_ms
    }
}

/// Full result set cached for a scroll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollResults {
    /// Total matching hits, which may exceed the cached hits.
    pub total_hits: u64,
    /// The cached hits, in result order.
    pub hits: Vec<Value>,
}

impl ScrollResults {
    /// Caches `hits`, counting all of them as the total.
    #[must_use]
    pub fn new(hits: Vec<Value>) -> Self {
        Self {
            total_hits: hits.len() as u64,
            hits,
        }
    }

    /// Sets a total larger than the cached hits.
    #[must_use]
    pub fn with_total_hits(mut self, total_hits: u64) -> Self {
        self.total_hits = total_hits;
        self
    }
}

/// One page of a scroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollPage {
    /// Id for the next request.
    pub scroll_id: String,
    /// Total matching hits.
    pub total_hits: u64,
    /// The hits of this page.
    pub hits: Vec<Value>,
    /// Offset after this page.
    pub offset: u64,
}

#[derive(Debug)]
struct Entry {
    session: ScrollSession,
    results: Option<ScrollResults>,
}

/// Session table shared by all requests.
///
/// Lookups take the read lock. Mutations take the write lock and persist
/// while holding it, so concurrent pages of one scroll never race on its
/// offset.
#[derive(Debug)]
pub struct ScrollStore {
    entries: RwLock<HashMap<String, Entry>>,
    persistence: Box<dyn ScrollPersistence>,
    clock: Arc<dyn Clock>,
}

impl ScrollStore {
    /// Creates an empty store over the given backend.
    #[must_use]
    pub fn new(persistence: Box<dyn ScrollPersistence>, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            persistence,
            clock,
        }
    }

    /// Creates an empty store that persists to memory only.
    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Box::new(InMemoryPersistence::new()), clock)
    }

    /// Opens the store under the configured scroll directory and replays its log.
    ///
    /// Cached results of recovered sessions are loaded on first page.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the log cannot be read.
    pub fn open(config: &ScrollConfig, clock: Arc<dyn Clock>) -> Result<Self, ScrollError> {
        let persistence = FilePersistence::new(config.scroll_dir())?;
        Self::recover(Box::new(persistence), clock)
    }

    /// Creates a store over `persistence`, restoring every recorded session.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot replay its sessions.
    pub fn recover(
        persistence: Box<dyn ScrollPersistence>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ScrollError> {
        let sessions = persistence.replay_sessions()?;
        let entries: HashMap<String, Entry> = sessions
            .into_iter()
            .map(|session| {
                (
                    session.id.clone(),
                    Entry {
                        session,
                        results: None,
                    },
                )
            })
            .collect();
        tracing::info!(sessions = entries.len(), "Recovered scroll sessions");
        Ok(Self {
            entries: RwLock::new(entries),
            persistence,
            clock,
        })
    }

    /// Starts a new session expiring `timeout` from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout does not parse or the session cannot be persisted.
    pub fn create(&self, timeout: &str, page_size: u64) -> Result<ScrollSession, ScrollError> {
        let timeout = timeout.trim();
        let timeout_ms = parse_timeout(timeout)?;
        let session = ScrollSession {
            id: Uuid::new_v4().to_string(),
            page_size,
            offset: 0,
            expiry_spec: timeout.to_string(),
            expiry_epoch_ms: self.clock.now_millis().saturating_add(timeout_ms),
            valid: true,
        };

        let mut entries = self.entries.write().map_err(|_| ScrollError::LockError)?;
        self.persistence.append_session(&session)?;
        entries.insert(
            session.id.clone(),
            Entry {
                session: session.clone(),
                results: None,
            },
        );
        tracing::debug!(scroll_id = %session.id, timeout = %timeout, page_size, "Created scroll session");
        Ok(session)
    }

    /// Returns a live session.
    ///
    /// # Errors
    ///
    /// Returns [`ScrollError::InvalidSearchContext`] if the id is unknown or the
    /// session was invalidated.
    pub fn fetch(&self, id: &str) -> Result<ScrollSession, ScrollError> {
        let entries = self.entries.read().map_err(|_| ScrollError::LockError)?;
        match entries.get(id) {
            Some(entry) if entry.session.valid => Ok(entry.session.clone()),
            Some(_) => Err(ScrollError::InvalidSearchContext(format!("scroll '{id}' has expired"))),
            None => Err(ScrollError::InvalidSearchContext(format!("unknown scroll '{id}'"))),
        }
    }

    /// Returns true if the id names a live session.
    #[must_use]
    pub fn is_valid(&self, id: &str) -> bool {
        self.fetch(id).is_ok()
    }

    /// Resolves the scroll of a search request.
    ///
    /// Without an id a new session is created. With an id, the live session is
    /// returned and its expiry pushed to `timeout` from now.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid timeout, an unknown or expired id, or a
    /// persistence failure.
    pub fn resume_or_create(
        &self,
        scroll_id: Option<&str>,
        timeout: &str,
        page_size: u64,
    ) -> Result<ScrollSession, ScrollError> {
        let Some(id) = scroll_id else {
            return self.create(timeout, page_size);
        };
        let timeout = timeout.trim();
        let timeout_ms = parse_timeout(timeout)?;
        let now = self.clock.now_millis();

        let mut entries = self.entries.write().map_err(|_| ScrollError::LockError)?;
        let entry = live_entry(&mut entries, id)?;
        entry.session.expiry_spec = timeout.to_string();
        entry.session.expiry_epoch_ms = now.saturating_add(timeout_ms);
        self.persistence.append_session(&entry.session)?;
        tracing::debug!(scroll_id = %id, timeout = %timeout, "Resumed scroll session");
        Ok(entry.session.clone())
    }

    /// Stores the full result set of a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not live or the results cannot be persisted.
    pub fn cache_results(&self, id: &str, results: ScrollResults) -> Result<(), ScrollError> {
        let mut entries = self.entries.write().map_err(|_| ScrollError::LockError)?;
        let entry = live_entry(&mut entries, id)?;
        self.persistence.write_results(id, &results)?;
        tracing::debug!(scroll_id = %id, hits = results.hits.len(), "Cached scroll results");
        entry.results = Some(results);
        Ok(())
    }

    /// Returns the next page and advances the session's offset.
    ///
    /// The page holds at most `page_size` hits and never reads past the cached
    /// hits. The new offset and the result cache are persisted before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not live, has no cached results, or
    /// cannot be persisted.
    pub fn page(&self, id: &str) -> Result<ScrollPage, ScrollError> {
        let mut entries = self.entries.write().map_err(|_| ScrollError::LockError)?;
        let entry = live_entry(&mut entries, id)?;
        if entry.results.is_none() {
            entry.results = self.persistence.read_results(id)?;
        }
        let Some(results) = entry.results.as_ref() else {
            return Err(ScrollError::InvalidSearchContext(format!(
                "scroll '{id}' has no cached results"
            )));
        };

        let available = results.hits.len() as u64;
        let start = entry.session.offset.min(available);
        let end = start.saturating_add(entry.session.page_size).min(available);
        let hits = usize::try_from(start)
            .ok()
            .zip(usize::try_from(end).ok())
            .map(|(start, end)| results.hits[start..end].to_vec())
            .unwrap_or_default();

        entry.session.offset = end;
        self.persistence.append_session(&entry.session)?;
        self.persistence.write_results(id, results)?;
        tracing::debug!(scroll_id = %id, offset = end, hits = hits.len(), "Served scroll page");

        Ok(ScrollPage {
            scroll_id: id.to_string(),
            total_hits: results.total_hits,
            hits,
            offset: end,
        })
    }

    /// Invalidates every live session whose expiry has passed.
    ///
    /// Expired sessions stay in the table so later lookups report them as
    /// expired rather than unknown. Their result caches are deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned. Per-session persistence
    /// failures are logged and the session is retried on the next sweep.
    pub fn sweep(&self) -> Result<usize, ScrollError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().map_err(|_| ScrollError::LockError)?;
        let mut expired = 0;
        for (id, entry) in entries.iter_mut() {
            if !entry.session.valid || !entry.session.is_expired(now) {
                continue;
            }
            let mut terminal = entry.session.clone();
            terminal.valid = false;
            if let Err(e) = self.persistence.append_session(&terminal) {
                tracing::error!(scroll_id = %id, error = %e, "Failed to persist expired scroll session");
                continue;
            }
            entry.session = terminal;
            entry.results = None;
            if let Err(e) = self.persistence.remove_results(id) {
                tracing::error!(scroll_id = %id, error = %e, "Failed to remove scroll results");
            }
            tracing::info!(scroll_id = %id, "Scroll session expired");
            expired += 1;
        }
        Ok(expired)
    }

    /// Number of sessions in the table, live or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize, ScrollError> {
        Ok(self.entries.read().map_err(|_| ScrollError::LockError)?.len())
    }

    /// Returns true if the table is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, ScrollError> {
        Ok(self.len()? == 0)
    }

    /// Spawns the reaper, which calls [`ScrollStore::sweep`] every `every`.
    ///
    /// Must be called from within a Tokio runtime. Cancel the returned token
    /// to stop the task.
    pub fn spawn_reaper(self: Arc<Self>, every: Duration) -> CancellationToken {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        tokio::spawn(async move {
            run_reaper(self, every, cancel_clone).await;
        });

        cancel
    }
}

/// Looks up a session that may still be used.
fn live_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    id: &str,
) -> Result<&'a mut Entry, ScrollError> {
    match entries.get_mut(id) {
        Some(entry) if entry.session.valid => Ok(entry),
        Some(_) => Err(ScrollError::InvalidSearchContext(format!("scroll '{id}' has expired"))),
        None => Err(ScrollError::InvalidSearchContext(format!("unknown scroll '{id}'"))),
    }
}

async fn run_reaper(store: Arc<ScrollStore>, every: Duration, cancel: CancellationToken) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = every.as_secs_f64(), "Scroll reaper started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!("Scroll reaper shutting down");
                break;
            }
            _ = ticker.tick() => {
                match store.sweep() {
                    Ok(0) => tracing::debug!("Scroll reaper: no expired sessions"),
                    Ok(expired) => tracing::info!(expired, "Scroll reaper invalidated sessions"),
                    Err(e) => tracing::warn!(error = %e, "Scroll reaper sweep failed"),
                }
            }
        }
    }
}
