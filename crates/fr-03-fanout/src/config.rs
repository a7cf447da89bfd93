//! Fan-out configuration.

use serde::{Deserialize, Serialize};
use shared_types::ConfigError;
use std::time::Duration;

/// Connection manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Hard ceiling on live connections
    pub max_connections: usize,
    /// Per-connection send timeout during broadcast (in milliseconds)
    pub send_timeout_ms: u64,
    /// Time between heartbeat sweeps (in seconds)
    pub heartbeat_interval_secs: u64,
    /// Time a connection has to accept a probe (in seconds)
    pub heartbeat_window_secs: u64,
    /// Drop connections with no client activity (`touch`) for this long.
    /// `None` leaves liveness to the probe alone.
    pub idle_timeout_secs: Option<u64>,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            send_timeout_ms: 2_000,
            heartbeat_interval_secs: 30,
            heartbeat_window_secs: 10,
            idle_timeout_secs: None,
        }
    }
}

impl FanoutConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::require_nonzero("max_connections", self.max_connections as u64)?;
        ConfigError::require_nonzero("send_timeout_ms", self.send_timeout_ms)?;
        ConfigError::require_nonzero("heartbeat_interval_secs", self.heartbeat_interval_secs)?;
        ConfigError::require_nonzero("heartbeat_window_secs", self.heartbeat_window_secs)?;
        if self.heartbeat_window_secs > self.heartbeat_interval_secs {
            return Err(ConfigError::Inconsistent(
                "heartbeat_window_secs exceeds heartbeat_interval_secs".into(),
            ));
        }
        if let Some(idle) = self.idle_timeout_secs {
            ConfigError::require_nonzero("idle_timeout_secs", idle)?;
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_window(&self) -> Duration {
        Duration::from_secs(self.heartbeat_window_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}
