//! Configuration module for Tessera.
//!
//! Settings are read from `TESSERA_*` environment variables with defaults, then
//! checked with `validator` before use.

pub mod scroll;
pub mod translator;

pub use scroll::ScrollConfig;
pub use translator::TranslatorConfig;

use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable was set but could not be parsed.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue {
        /// The environment variable name.
        var: String,
        /// The raw value that failed to parse.
        value: String,
    },

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Reads `var` from the environment, falling back to `default` when it is unset.
pub(crate) fn env_or<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default_when_unset() {
        let value: u32 = env_or("TESSERA_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            var: "TESSERA_LOOKBACK_MONTHS".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value for TESSERA_LOOKBACK_MONTHS: 'abc'");
    }
}
