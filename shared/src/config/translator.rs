//! Translator settings shared by the SQL and search-DSL front ends.

use super::{env_or, ConfigError};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default name of the timestamp column.
pub const DEFAULT_TIMESTAMP_KEY: &str = "timestamp";

/// Default lookback window for queries without an explicit time range.
pub const DEFAULT_LOOKBACK_MONTHS: u32 = 3;

/// Process-wide translator configuration.
///
/// Configuration values can be set via environment variables:
/// - `TESSERA_TIMESTAMP_KEY`: column holding the event time (default: "timestamp")
/// - `TESSERA_LOOKBACK_MONTHS`: default query window in months (default: 3)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TranslatorConfig {
    /// Column whose `range` predicates set the query time range.
    #[validate(length(min = 1, message = "Timestamp key cannot be empty"))]
    pub timestamp_key: String,

    /// Length of the default time range, counted back from now.
    #[validate(range(min = 1, max = 120, message = "Lookback must be 1 to 120 months"))]
    pub default_lookback_months: u32,
}

impl TranslatorConfig {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `TESSERA_LOOKBACK_MONTHS` is set but is not a number
    /// - the resulting values fail validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            timestamp_key: env_or("TESSERA_TIMESTAMP_KEY", DEFAULT_TIMESTAMP_KEY.to_string())?,
            default_lookback_months: env_or("TESSERA_LOOKBACK_MONTHS", DEFAULT_LOOKBACK_MONTHS)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Overrides the timestamp column.
    #[must_use]
    pub fn with_timestamp_key(mut self, key: impl Into<String>) -> Self {
        self.timestamp_key = key.into();
        self
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            timestamp_key: DEFAULT_TIMESTAMP_KEY.to_string(),
            default_lookback_months: DEFAULT_LOOKBACK_MONTHS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TranslatorConfig::default();
        assert_eq!(config.timestamp_key, "timestamp");
        assert_eq!(config.default_lookback_months, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_timestamp_key_rejected() {
        let config = TranslatorConfig::default().with_timestamp_key("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_lookback_rejected() {
        let config = TranslatorConfig {
            default_lookback_months: 0,
            ..TranslatorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
