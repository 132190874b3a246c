//! Courier configuration system.
//!
//! TOML file based with `COURIER_*` environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub redis: RedisConfig,
    pub sender: SenderConfig,

    /// Default domain provider-facing callback URLs are built against.
    /// A channel's `callback_domain` config overrides it.
    pub domain: String,

    /// Version string reported in the outbound User-Agent.
    pub version: String,

    /// Build the TLS-insecure client for providers with broken certs.
    pub allow_insecure_tls: bool,

    /// Backend selection for the binary ("memory" for development).
    pub backend: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            redis: RedisConfig::default(),
            sender: SenderConfig::default(),
            domain: "localhost:8080".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            allow_insecure_tls: true,
            backend: "memory".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sender.workers == 0 {
            return Err(ConfigError::ValidationError(
                "sender.workers must be at least 1".to_string(),
            ));
        }
        if self.domain.is_empty() {
            return Err(ConfigError::ValidationError("domain cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Redis configuration (access-token cache).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// Send worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Number of pre-spawned send workers draining the outgoing queue.
    pub workers: usize,
    /// Per-message send timeout in seconds.
    pub send_timeout_seconds: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            send_timeout_seconds: 35,
        }
    }
}
