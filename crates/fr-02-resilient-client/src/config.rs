//! Client configuration.

use serde::{Deserialize, Serialize};
use shared_types::ConfigError;
use std::time::Duration;

/// What the client does when the breaker says a call is doomed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerMode {
    /// Log and proceed; callers read `is_open()` / `can_attempt()` themselves.
    #[default]
    Advisory,
    /// Reject with `ClientError::CircuitOpen` while the breaker is open.
    Enforcing,
}

/// Resilient client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-attempt request timeout (in milliseconds)
    pub timeout_ms: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff base (in milliseconds); attempt `n` waits `base * 2^n`
    pub base_delay_ms: u64,
    /// Backoff ceiling, also applied to server wait hints (in milliseconds)
    pub max_delay_ms: u64,
    /// Consecutive failed calls before the breaker opens
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is allowed (in seconds)
    pub recovery_timeout_secs: u64,
    pub breaker_mode: BreakerMode,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            breaker_mode: BreakerMode::Advisory,
            user_agent: format!("feed-relay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::require_nonzero("timeout_ms", self.timeout_ms)?;
        ConfigError::require_nonzero("failure_threshold", u64::from(self.failure_threshold))?;
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::Inconsistent(format!(
                "max_delay_ms ({}) is below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}
