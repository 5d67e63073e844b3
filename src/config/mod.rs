pub mod validation;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Where the chat backend lives and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Upper bound on the wait for the next body chunk; `null` disables it.
    #[serde(default = "default_idle_read_timeout_secs")]
    pub idle_read_timeout_secs: Option<u64>,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub http_use_env_proxy: bool,
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:927".to_string()
}
fn default_chat_path() -> String {
    "/api/rag/chat".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    5
}
#[allow(clippy::unnecessary_wraps)]
fn default_idle_read_timeout_secs() -> Option<u64> {
    Some(120)
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl BackendConfig {
    /// Full chat endpoint URL, joined without doubling slashes.
    #[must_use]
    pub fn chat_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.chat_path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    #[must_use]
    pub fn idle_read_timeout(&self) -> Option<Duration> {
        self.idle_read_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_path: default_chat_path(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_read_timeout_secs: default_idle_read_timeout_secs(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            http_use_env_proxy: false,
            proxy: None,
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub show_thoughts: bool,
    #[serde(default = "default_true")]
    pub show_traces: bool,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            show_thoughts: true,
            show_traces: true,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load the config at `path`, falling back to defaults when the file does not exist.
///
/// # Errors
///
/// Same as [`load_config`], except a missing file is not an error.
pub fn load_config_or_default(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    match load_config(path) {
        Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            Ok(AppConfig::default())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.backend.chat_path, "/api/rag/chat");
        assert_eq!(config.backend.idle_read_timeout_secs, Some(120));
        assert!(!config.backend.http_use_env_proxy);
        assert!(config.features.show_thoughts);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.backend.base_url, "http://127.0.0.1:927");
        assert_eq!(config.backend.connect_timeout_secs, 5);
        assert_eq!(config.features.log_level, "INFO");
    }

    #[test]
    fn test_explicit_null_disables_idle_timeout() {
        let config = parse_config("backend:\n  idle_read_timeout_secs: null\n").unwrap();
        assert!(config.backend.idle_read_timeout().is_none());
    }

    #[test]
    fn test_chat_url_joins_slashes() {
        let backend = BackendConfig {
            base_url: "http://localhost:927/".to_string(),
            ..BackendConfig::default()
        };
        assert_eq!(backend.chat_url(), "http://localhost:927/api/rag/chat");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config_or_default("does-not-exist.yaml").unwrap();
        assert_eq!(config.backend.chat_path, "/api/rag/chat");
    }
}
