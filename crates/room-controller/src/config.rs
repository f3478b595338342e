//! Room Controller configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! default; the service holds no secrets.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default WebSocket gateway bind address.
pub const DEFAULT_WS_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default presence sample interval in seconds.
///
/// Clients report one presence sample per interval; each sample accrues this
/// many seconds of total time. The controller trusts the caller's cadence
/// and does not clock it independently.
pub const DEFAULT_SAMPLE_INTERVAL_SECONDS: u64 = 10;

/// Room Controller configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket gateway bind address (default: "0.0.0.0:8000").
    pub ws_bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Presence sample interval in seconds (default: 10).
    pub sample_interval_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let ws_bind_address = vars
            .get("RC_WS_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WS_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("RC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let sample_interval_seconds = vars
            .get("RC_SAMPLE_INTERVAL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SAMPLE_INTERVAL_SECONDS);

        if sample_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "RC_SAMPLE_INTERVAL_SECONDS must be non-zero".to_string(),
            ));
        }

        Ok(Config {
            ws_bind_address,
            health_bind_address,
            sample_interval_seconds,
        })
    }
}
