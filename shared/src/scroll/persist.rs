//! Durable storage for scroll sessions.
//!
//! Session metadata goes to an append-only `scroll.csv` log, one row per
//! mutation. Replaying the log keeps the last row for each id. Cached result
//! sets live in one `<id>.json` file per session, rewritten on every page.

use super::{ScrollError, ScrollResults, ScrollSession};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Name of the session log inside the scroll directory.
pub const SESSION_LOG: &str = "scroll.csv";

/// Storage backend for scroll sessions.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait ScrollPersistence: Send + Sync + std::fmt::Debug {
    /// Records the current state of a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn append_session(&self, session: &ScrollSession) -> Result<(), ScrollError>;

    /// Returns the latest recorded state of every session.
    ///
    /// # Errors
    ///
    /// Returns an error if the log exists but cannot be read.
    fn replay_sessions(&self) -> Result<Vec<ScrollSession>, ScrollError>;

    /// Replaces the cached result set of a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the results cannot be serialized or written.
    fn write_results(&self, id: &str, results: &ScrollResults) -> Result<(), ScrollError>;

    /// Loads the cached result set of a session, if one was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    fn read_results(&self, id: &str) -> Result<Option<ScrollResults>, ScrollError>;

    /// Deletes the cached result set of a session. Missing results are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the results exist but cannot be removed.
    fn remove_results(&self, id: &str) -> Result<(), ScrollError>;
}

// ============================================================================
// File-backed persistence
// ============================================================================

/// Persistence rooted at a per-host scroll directory.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    /// Opens the scroll directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ScrollError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The scroll directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(SESSION_LOG)
    }

    fn results_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl ScrollPersistence for FilePersistence {
    fn append_session(&self, session: &ScrollSession) -> Result<(), ScrollError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        writeln!(file, "{}", to_row(session))?;
        Ok(())
    }

    fn replay_sessions(&self) -> Result<Vec<ScrollSession>, ScrollError> {
        let text = match fs::read_to_string(self.log_path()) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(latest_per_id(text.lines().enumerate().filter_map(
            |(number, line)| match from_row(line) {
                Some(session) => Some(session),
                None => {
                    tracing::warn!(line = number + 1, row = %line, "Skipping malformed scroll log row");
                    None
                }
            },
        )))
    }

    fn write_results(&self, id: &str, results: &ScrollResults) -> Result<(), ScrollError> {
        let json = serde_json::to_vec(results)?;
        fs::write(self.results_path(id), json)?;
        Ok(())
    }

    fn read_results(&self, id: &str) -> Result<Option<ScrollResults>, ScrollError> {
        match fs::read(self.results_path(id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_results(&self, id: &str) -> Result<(), ScrollError> {
        match fs::remove_file(self.results_path(id)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Formats a log row: `id,expiry_spec,offset,page_size,expiry_epoch_ms,valid`.
///
/// Fields are not quoted. Ids are UUIDs and `expiry_spec` has already passed
/// [`super::parse_timeout`], which admits only `<digits><unit>` with no commas,
/// whitespace or newlines, so no field can split a row.
fn to_row(session: &ScrollSession) -> String {
    format!(
        "{},{},{},{},{},{}",
        session.id,
        session.expiry_spec,
        session.offset,
        session.page_size,
        session.expiry_epoch_ms,
        session.valid
    )
}

fn from_row(line: &str) -> Option<ScrollSession> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    let [id, expiry_spec, offset, page_size, expiry_epoch_ms, valid] = fields.as_slice() else {
        return None;
    };
    if id.is_empty() {
        return None;
    }
    Some(ScrollSession {
        id: (*id).to_string(),
        expiry_spec: (*expiry_spec).to_string(),
        offset: offset.parse().ok()?,
        page_size: page_size.parse().ok()?,
        expiry_epoch_ms: expiry_epoch_ms.parse().ok()?,
        valid: valid.parse().ok()?,
    })
}

/// Keeps the last state per id, ordered by first appearance.
fn latest_per_id(rows: impl Iterator<Item = ScrollSession>) -> Vec<ScrollSession> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut sessions: Vec<ScrollSession> = Vec::new();
    for session in rows {
        match index.get(&session.id) {
            Some(&i) => sessions[i] = session,
            None => {
                index.insert(session.id.clone(), sessions.len());
                sessions.push(session);
            }
        }
    }
    sessions
}

// ============================================================================
// In-memory persistence
// ============================================================================

/// Persistence kept in process memory, for tests and ephemeral use.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    rows: RwLock<Vec<ScrollSession>>,
    results: RwLock<HashMap<String, ScrollResults>>,
}

impl InMemoryPersistence {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of session rows recorded so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn row_count(&self) -> Result<usize, ScrollError> {
        Ok(self.rows.read().map_err(|_| ScrollError::LockError)?.len())
    }
}

impl ScrollPersistence for InMemoryPersistence {
    fn append_session(&self, session: &ScrollSession) -> Result<(), ScrollError> {
        self.rows
            .write()
            .map_err(|_| ScrollError::LockError)?
            .push(session.clone());
        Ok(())
    }

    fn replay_sessions(&self) -> Result<Vec<ScrollSession>, ScrollError> {
        let rows = self.rows.read().map_err(|_| ScrollError::LockError)?;
        Ok(latest_per_id(rows.iter().cloned()))
    }

    fn write_results(&self, id: &str, results: &ScrollResults) -> Result<(), ScrollError> {
        self.results
            .write()
            .map_err(|_| ScrollError::LockError)?
            .insert(id.to_string(), results.clone());
        Ok(())
    }

    fn read_results(&self, id: &str) -> Result<Option<ScrollResults>, ScrollError> {
        let results = self.results.read().map_err(|_| ScrollError::LockError)?;
        Ok(results.get(id).cloned())
    }

    fn remove_results(&self, id: &str) -> Result<(), ScrollError> {
        self.results
            .write()
            .map_err(|_| ScrollError::LockError)?
            .remove(id);
        Ok(())
    }
}
