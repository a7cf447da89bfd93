//! Bus configuration.

use serde::{Deserialize, Serialize};
use shared_types::ConfigError;
use std::time::Duration;

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of the shared ingress queue
    pub ingress_capacity: usize,
    /// Capacity of every per-handler queue
    pub handler_queue_capacity: usize,
    /// Concurrency used when a subscription does not specify one
    pub default_concurrency: usize,
    /// Grace period for in-flight handlers on stop (in milliseconds)
    pub stop_grace_ms: u64,
    /// Number of recent handler failures kept for inspection
    pub error_ring_capacity: usize,
    /// Sliding window used for rate counters (in seconds)
    pub rate_window_secs: u64,
    /// Number of recent handler latencies kept for percentiles
    pub latency_samples: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            ingress_capacity: crate::DEFAULT_INGRESS_CAPACITY,
            handler_queue_capacity: crate::DEFAULT_HANDLER_QUEUE_CAPACITY,
            default_concurrency: 4,
            stop_grace_ms: 5_000,
            error_ring_capacity: 100,
            rate_window_secs: 60,
            latency_samples: 1_024,
        }
    }
}

impl BusConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::require_nonzero("ingress_capacity", self.ingress_capacity as u64)?;
        ConfigError::require_nonzero("handler_queue_capacity", self.handler_queue_capacity as u64)?;
        ConfigError::require_nonzero("default_concurrency", self.default_concurrency as u64)?;
        ConfigError::require_nonzero("rate_window_secs", self.rate_window_secs)?;
        Ok(())
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stop_grace(), Duration::from_secs(5));
        assert_eq!(config.rate_window(), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_ingress_rejected() {
        let config = BusConfig {
            ingress_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "ingress_capacity", .. })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BusConfig = serde_json::from_str(r#"{"ingress_capacity": 8}"#).unwrap();
        assert_eq!(config.ingress_capacity, 8);
        assert_eq!(config.handler_queue_capacity, crate::DEFAULT_HANDLER_QUEUE_CAPACITY);
    }
}
