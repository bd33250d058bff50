//! Scroll session storage settings.

use super::{env_or, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Scroll store configuration.
///
/// Configuration values can be set via environment variables:
/// - `TESSERA_DATA_PATH`: root data directory (default: "data/")
/// - `TESSERA_HOST_ID`: per-host directory name (default: "localhost")
/// - `TESSERA_SCROLL_REAPER_SECS`: seconds between expiry sweeps (default: 60)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ScrollConfig {
    /// Root data directory.
    pub data_path: PathBuf,

    /// Host identifier, used as a subdirectory of `data_path`.
    #[validate(length(min = 1, message = "Host id cannot be empty"))]
    pub host_id: String,

    /// Interval between reaper sweeps, in seconds.
    #[validate(range(min = 1, message = "Reaper interval must be at least one second"))]
    pub reaper_interval_secs: u64,
}

impl ScrollConfig {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or if the
    /// resulting values fail validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            data_path: env_or("TESSERA_DATA_PATH", defaults.data_path)?,
            host_id: env_or("TESSERA_HOST_ID", defaults.host_id)?,
            reaper_interval_secs: env_or(
                "TESSERA_SCROLL_REAPER_SECS",
                defaults.reaper_interval_secs,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Creates a configuration rooted at `data_path` with default host and interval.
    #[must_use]
    pub fn with_data_path(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            ..Self::default()
        }
    }

    /// Directory holding the session log and cached result files.
    #[must_use]
    pub fn scroll_dir(&self) -> PathBuf {
        self.data_path.join(&self.host_id).join("scroll")
    }

    /// Returns the reaper interval as a `Duration`.
    #[must_use]
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/"),
            host_id: "localhost".to_string(),
            reaper_interval_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_dir_layout() {
        let config = ScrollConfig {
            data_path: PathBuf::from("/var/tessera"),
            host_id: "node-1".to_string(),
            reaper_interval_secs: 60,
        };
        assert_eq!(config.scroll_dir(), PathBuf::from("/var/tessera/node-1/scroll"));
    }

    #[test]
    fn test_reaper_interval() {
        let config = ScrollConfig::default();
        assert_eq!(config.reaper_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_empty_host_rejected() {
        let config = ScrollConfig {
            host_id: String::new(),
            ..ScrollConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
