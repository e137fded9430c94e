//! Configuration for the telemetry collector and CLI.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port the collector listens on
    pub port: u16,

    /// Shared bearer token; unset means the collector accepts anyone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Path for the record store and the CLI's local storage
    pub data_path: PathBuf,

    /// Collector base URL used by `stats`, `ping` and `simulate`
    pub endpoint: String,

    /// Per-request timeout for client calls
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Refresh interval for `stats --watch`
    #[serde(with = "duration_serde")]
    pub stats_refresh: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("visit-telemetry");

        Self {
            port: 8787,
            auth_token: None,
            data_path: data_dir,
            endpoint: "http://127.0.0.1:8787".to_string(),
            request_timeout: Duration::from_secs(10),
            stats_refresh: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("visit-telemetry")
            .join("config.json")
    }

    /// Record log used by `serve`.
    pub fn store_path(&self) -> PathBuf {
        self.data_path.join("store.jsonl")
    }

    /// Local storage used by the CLI agent and the offline stats fallback.
    pub fn local_storage_path(&self) -> PathBuf {
        self.data_path.join("local_storage.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8787);
        assert!(config.auth_token.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.store_path().ends_with("store.jsonl"));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let mut config = Config::default();
        config.auth_token = Some("secret".to_string());
        config.stats_refresh = Duration::from_secs(30);

        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.auth_token.as_deref(), Some("secret"));
        assert_eq!(parsed.stats_refresh, Duration::from_secs(30));
    }

    #[test]
    fn test_token_is_omitted_when_unset() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json.get("auth_token").is_none());
        assert_eq!(json["request_timeout"], 10);
    }
}
