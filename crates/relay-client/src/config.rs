//! Client configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (RELAY_URL)
//! - TOML configuration file

use anyhow::{Context, Result};
use relay_core::{ConstructionError, EntityConfig, FeatureMap};
use relay_transport::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::client::ClientOptions;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Broker endpoint.
    #[serde(default = "default_url")]
    pub url: String,

    /// Reconnection policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// WebSocket transport settings.
    #[serde(default)]
    pub websocket: WebSocketSettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Feature key to topic segment bindings.
    #[serde(default)]
    pub features: FeatureMap,

    /// Entities whose feature switches are bootstrapped.
    #[serde(default)]
    pub entities: EntityConfig,
}

/// Reconnection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound on any delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Growth factor between attempts.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    /// Give up after this many consecutive failures. Unlimited if unset.
    #[serde(default)]
    pub max_attempts: Option<usize>,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum inbound frame size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Connect and handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_url() -> String {
    std::env::var("RELAY_URL").unwrap_or_else(|_| "ws://127.0.0.1:5000/ws".to_string())
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000 // 30 seconds
}

fn default_multiplier() -> u32 {
    2
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect: ReconnectConfig::default(),
            websocket: WebSocketSettings::default(),
            metrics: MetricsConfig::default(),
            features: FeatureMap::default(),
            entities: EntityConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            max_attempts: None,
        }
    }
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl ReconnectConfig {
    /// The backoff policy these settings describe.
    #[must_use]
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
            self.max_attempts,
        )
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "relay.toml",
            "/etc/relay/relay.toml",
            "~/.config/relay/relay.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Client options for this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the feature map is invalid.
    pub fn options(&self) -> Result<ClientOptions, ConstructionError> {
        self.features.validate()?;

        Ok(ClientOptions::new(self.url.clone())
            .with_entities(self.entities.clone())
            .with_features(self.features.clone())
            .with_reconnect(self.reconnect.backoff()))
    }

    /// WebSocket transport settings.
    #[cfg(feature = "websocket")]
    #[must_use]
    pub fn websocket_config(&self) -> relay_transport::WebSocketConfig {
        relay_transport::WebSocketConfig {
            max_message_size: self.websocket.max_message_size,
            connect_timeout: Duration::from_millis(self.websocket.connect_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::FeatureBinding;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.reconnect.initial_delay_ms, 500);
        assert_eq!(config.reconnect.max_attempts, None);
        assert!(!config.metrics.enabled);
        assert_eq!(config.features, FeatureMap::default());
        assert!(config.entities.is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            url = "ws://broker:5000/ws"

            [reconnect]
            initial_delay_ms = 100
            max_attempts = 5

            [metrics]
            enabled = true

            [entities.front.detect]
            enabled = true
            [entities.front.record]
            enabled = false
            [entities.front.snapshots]
            enabled = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.url, "ws://broker:5000/ws");
        assert_eq!(config.reconnect.initial_delay_ms, 100);
        assert_eq!(config.reconnect.max_delay_ms, 30_000);
        assert_eq!(config.reconnect.max_attempts, Some(5));
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
        assert!(config.entities.contains("front"));

        let options = config.options().unwrap();
        assert_eq!(options.url, "ws://broker:5000/ws");
        assert_eq!(options.reconnect.initial_delay(), Duration::from_millis(100));
        assert_eq!(options.reconnect.next_delay(5), None);
    }

    #[test]
    fn test_custom_features() {
        let toml_str = r#"
            [[features]]
            key = "audio"
            topic = "audio"

            [[features]]
            key = "motion"
            topic = "motion"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.features.len(), 2);
        assert_eq!(
            config.features.get("motion"),
            Some(&FeatureBinding::new("motion", "motion"))
        );
    }

    #[test]
    fn test_invalid_features_rejected() {
        let toml_str = r#"
            [[features]]
            key = "detect"
            topic = "a/b"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.options(),
            Err(ConstructionError::InvalidBinding { .. })
        ));
    }

    #[cfg(feature = "websocket")]
    #[test]
    fn test_websocket_config() {
        let config = Config::default();
        let ws = config.websocket_config();
        assert_eq!(ws.max_message_size, 1024 * 1024);
        assert_eq!(ws.connect_timeout, Duration::from_secs(10));
    }
}
