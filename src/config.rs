//! Configuration loading.
//!
//! Loads transport configuration from a YAML file. All fields are
//! optional; accessor methods apply defaults so a missing or empty file
//! yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default TCP bind address for the acceptor.
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4600";

/// Default handshake watchdog timeout in milliseconds.
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 30_000;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// TCP transport configuration (`transport.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Bind address for the acceptor (`transport.bind_addr`).
    /// Defaults to "0.0.0.0:4600".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<String>,

    /// Handshake watchdog timeout in milliseconds
    /// (`transport.handshake_timeout_ms`). Defaults to 30000. A peer
    /// that stalls mid-handshake is terminated when this expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake_timeout_ms: Option<u64>,
}

impl TransportConfig {
    /// Get the bind address, using the default if not configured.
    pub fn bind_addr(&self) -> &str {
        self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    /// Get the handshake timeout, using the default if not configured.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(
            self.handshake_timeout_ms
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_MS),
        )
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transport configuration (`transport.*`).
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.transport.bind_addr(), "0.0.0.0:4600");
        assert_eq!(
            config.transport.handshake_timeout(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_parse_yaml() {
        let config: Config = serde_yaml::from_str(
            "transport:\n  bind_addr: \"127.0.0.1:7000\"\n  handshake_timeout_ms: 5000\n",
        )
        .unwrap();
        assert_eq!(config.transport.bind_addr(), "127.0.0.1:7000");
        assert_eq!(config.transport.handshake_timeout(), Duration::from_secs(5));
    }
}
