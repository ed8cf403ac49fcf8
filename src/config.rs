//! Configuration Module
//!
//! Handles loading cache parameters from environment variables or any serde source.

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CacheError, Result};

/// Cache construction parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Maximum total size of the cache, in size units (entries by default)
    pub maxsize: usize,
    /// Time-to-live of every entry, in milliseconds
    pub ttl_ms: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAXSIZE` - Maximum cache size (default: 1024)
    /// - `CACHE_TTL_MS` - Entry TTL in milliseconds (default: 300000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            maxsize: env::var("CACHE_MAXSIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.maxsize),
            ttl_ms: env::var("CACHE_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.ttl_ms),
        }
    }

    /// Entry TTL as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Rejects a zero maxsize or ttl.
    pub fn validate(&self) -> Result<()> {
        validate(self.maxsize, self.ttl())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            maxsize: 1024,
            ttl_ms: 300_000,
        }
    }
}

/// Shared parameter check used by every constructor.
pub(crate) fn validate(maxsize: usize, ttl: Duration) -> Result<()> {
    if maxsize == 0 {
        return Err(CacheError::Configuration(
            "maxsize must be positive".to_string(),
        ));
    }
    if ttl.is_zero() {
        return Err(CacheError::Configuration("ttl must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.maxsize, 1024);
        assert_eq!(config.ttl(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        env::remove_var("CACHE_MAXSIZE");
        env::remove_var("CACHE_TTL_MS");

        let config = CacheConfig::from_env();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_config_rejects_zero_values() {
        let config = CacheConfig {
            maxsize: 0,
            ttl_ms: 10,
        };
        assert!(matches!(config.validate(), Err(CacheError::Configuration(_))));

        let config = CacheConfig {
            maxsize: 10,
            ttl_ms: 0,
        };
        assert!(matches!(config.validate(), Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_config_deserialize() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"maxsize": 10, "ttl_ms": 500}"#).unwrap();
        assert_eq!(config.maxsize, 10);
        assert_eq!(config.ttl(), Duration::from_millis(500));
    }
}
