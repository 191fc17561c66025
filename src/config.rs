//! Application configuration
//!
//! A single TOML file holds the broker settings and the device topics:
//!
//! ```toml
//! device_topics = ["devices/temp-1", "devices/humidity-1"]
//!
//! [broker]
//! endpoint = "wss://broker.emqx.io:8084/mqtt"
//! clean_session = true
//! connect_timeout_ms = 30000
//! keep_alive_sec = 60
//! reconnect_period_ms = 1000
//! ```
//!
//! The file lives at `$TELEMETRY_PUBLISHER_CONFIG` or
//! `~/.config/telemetry-publisher/config.toml` and is created with defaults on
//! first start.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::mqtt::config::BrokerConfig;

const CONFIG_DIR: &str = ".config/telemetry-publisher";
const CONFIG_FILE: &str = "config.toml";
pub const CONFIG_PATH_ENV: &str = "TELEMETRY_PUBLISHER_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Topics published on every tick, in this order
    pub device_topics: Vec<String>,
    pub broker: BrokerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_topics: vec!["devices/temp-1".to_string(), "devices/humidity-1".to_string()],
            broker: BrokerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_topics(&self.device_topics)?;
        self.broker.validate()?;
        Ok(())
    }

    /// Reads and validates the config at `path`.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Writes a default config to `path` unless a file already exists there.
    pub async fn ensure_default(path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if tokio::fs::try_exists(path).await.map_err(io_err)? {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let content = toml::to_string_pretty(&Self::default())?;
        tokio::fs::write(path, content).await.map_err(io_err)?;

        info!("Wrote default config to {}", path.display());
        Ok(())
    }

    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        Self::ensure_default(path).await?;
        Self::load(path).await
    }
}

/// Config file location, honouring [`CONFIG_PATH_ENV`].
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    let mut path = get_home_dir();
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

/// Checks that `topics` is a usable publish set: non-empty, no empty names,
/// no MQTT wildcards and no duplicates.
pub fn validate_topics(topics: &[String]) -> Result<(), ConfigError> {
    if topics.is_empty() {
        return Err(ConfigError::Invalid("no device topics configured".to_string()));
    }

    let mut seen = HashSet::new();
    for topic in topics {
        if topic.is_empty() {
            return Err(ConfigError::Invalid("empty device topic".to_string()));
        }
        if topic.contains(['+', '#']) {
            return Err(ConfigError::Invalid(format!(
                "device topic '{topic}' contains a wildcard"
            )));
        }
        if !seen.insert(topic.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "device topic '{topic}' listed twice"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "telemetry-publisher-{}-{}",
            name,
            std::process::id()
        ));
        path.push(CONFIG_FILE);
        path
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            device_topics = ["plant/a"]

            [broker]
            endpoint = "mqtt://localhost:1883"
            "#,
        )
        .unwrap();

        assert_eq!(config.device_topics, vec!["plant/a".to_string()]);
        assert_eq!(config.broker.endpoint, "mqtt://localhost:1883");
        assert!(config.broker.clean_session);
        assert_eq!(config.broker.connect_timeout_ms, 30_000);
        assert_eq!(config.broker.keep_alive_sec, 60);
        assert_eq!(config.broker.reconnect_period_ms, 1_000);
    }

    #[test]
    fn empty_file_yields_default_config() {
        assert_eq!(AppConfig::from_toml_str("").unwrap(), AppConfig::default());
    }

    #[test]
    fn invalid_topics_are_rejected() {
        assert!(validate_topics(&[]).is_err());
        assert!(validate_topics(&["".to_string()]).is_err());
        assert!(validate_topics(&["devices/+".to_string()]).is_err());
        assert!(validate_topics(&["a".to_string(), "a".to_string()]).is_err());
        assert!(validate_topics(&["a".to_string(), "b".to_string()]).is_ok());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let result = AppConfig::from_toml_str("device_topics = 3");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn bad_endpoint_is_invalid() {
        let result = AppConfig::from_toml_str(
            r#"
            [broker]
            endpoint = "ftp://example.com"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn default_file_is_created_once_and_loaded() {
        let path = temp_config_path("create");
        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;

        let config = AppConfig::load_or_create(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());

        tokio::fs::write(&path, "device_topics = [\"custom/topic\"]\n")
            .await
            .unwrap();
        let config = AppConfig::load_or_create(&path).await.unwrap();
        assert_eq!(config.device_topics, vec!["custom/topic".to_string()]);

        tokio::fs::remove_dir_all(path.parent().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let path = temp_config_path("missing");
        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
