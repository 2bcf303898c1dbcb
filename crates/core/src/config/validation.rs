//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `version_url` is empty or not http(s)
    /// - `check_interval_secs` is 0 or exceeds one day
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.version_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid { field: "version_url".into(), reason: "must not be empty".into() });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "version_url".into(),
                reason: "must use the http or https scheme".into(),
            });
        }

        if self.check_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "check_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.check_interval_secs > 86_400 {
            return Err(ConfigError::Invalid {
                field: "check_interval_secs".into(),
                reason: "must not exceed one day (86400s)".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.timeout_ms / 1000 >= self.check_interval_secs {
            tracing::warn!(
                timeout_ms = self.timeout_ms,
                check_interval_secs = self.check_interval_secs,
                "timeout_ms is not shorter than the check interval; \
                 slow checks will cause ticks to be skipped"
            );
        }

        Ok(())
    }
}
