//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FRESHWATCH_*)
//! 2. TOML config file (if FRESHWATCH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FRESHWATCH_*)
/// 2. TOML config file (if FRESHWATCH_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// URL of the version metadata document.
    ///
    /// Set via FRESHWATCH_VERSION_URL environment variable.
    #[serde(default = "default_version_url")]
    pub version_url: String,

    /// Seconds between two scheduled checks.
    ///
    /// Set via FRESHWATCH_CHECK_INTERVAL_SECS environment variable.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Run one check immediately when polling starts.
    ///
    /// Set via FRESHWATCH_CHECK_ON_STARTUP environment variable.
    #[serde(default = "default_true")]
    pub check_on_startup: bool,

    /// Path to the SQLite key-value store.
    ///
    /// Set via FRESHWATCH_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Root directory whose subdirectories are the client cache buckets.
    ///
    /// Set via FRESHWATCH_CACHE_DIR environment variable. When unset, cache
    /// invalidation is a no-op.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// User-Agent string for HTTP requests and audit entries.
    ///
    /// Set via FRESHWATCH_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via FRESHWATCH_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Page URL recorded in audit entries. Defaults to `version_url`.
    ///
    /// Set via FRESHWATCH_PAGE_URL environment variable.
    #[serde(default)]
    pub page_url: Option<String>,

    /// Shell command run to reload the content after a refresh.
    ///
    /// Set via FRESHWATCH_RELOAD_COMMAND environment variable.
    #[serde(default)]
    pub reload_command: Option<String>,
}

fn default_version_url() -> String {
    "http://localhost:8080/version.json".into()
}

fn default_check_interval_secs() -> u64 {
    60
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./freshwatch.sqlite")
}

fn default_user_agent() -> String {
    "freshwatch/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version_url: default_version_url(),
            check_interval_secs: default_check_interval_secs(),
            check_on_startup: true,
            db_path: default_db_path(),
            cache_dir: None,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            page_url: None,
            reload_command: None,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Polling interval as Duration.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// URL recorded in audit entries.
    pub fn page_url(&self) -> &str {
        self.page_url.as_deref().unwrap_or(&self.version_url)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FRESHWATCH_`
    /// 2. TOML file from `FRESHWATCH_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FRESHWATCH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FRESHWATCH_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.version_url, "http://localhost:8080/version.json");
        assert_eq!(config.check_interval_secs, 60);
        assert!(config.check_on_startup);
        assert_eq!(config.db_path, PathBuf::from("./freshwatch.sqlite"));
        assert!(config.cache_dir.is_none());
        assert_eq!(config.user_agent, "freshwatch/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert!(config.page_url.is_none());
        assert!(config.reload_command.is_none());
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.check_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_page_url_falls_back_to_version_url() {
        let config = AppConfig::default();
        assert_eq!(config.page_url(), config.version_url);

        let config = AppConfig { page_url: Some("https://blog.example.com/".into()), ..Default::default() };
        assert_eq!(config.page_url(), "https://blog.example.com/");
    }

    #[test]
    fn test_load_layers_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "freshwatch.toml",
                r#"
                version_url = "https://example.com/version.json"
                check_interval_secs = 120
                "#,
            )?;
            jail.set_env("FRESHWATCH_CONFIG_FILE", "freshwatch.toml");
            jail.set_env("FRESHWATCH_CHECK_INTERVAL_SECS", "30");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.version_url, "https://example.com/version.json");
            assert_eq!(config.check_interval_secs, 30);
            assert_eq!(config.user_agent, "freshwatch/0.1");
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("FRESHWATCH_CHECK_INTERVAL_SECS", "0");
            let result = AppConfig::load();
            assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "check_interval_secs"));
            Ok(())
        });
    }
}
