//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Logging and metrics settings for one relay process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name stamped on every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive such as `info,shared_bus=debug`
    pub log_level: String,

    /// Emit one JSON object per log line
    pub json_logs: bool,

    /// Include the emitting module path in log lines
    pub with_target: bool,

    /// Prometheus scrape port, exposed by whatever serves `gather()`
    pub metrics_port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "feed-relay".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            with_target: true,
            metrics_port: 9100,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FR_SERVICE_NAME`: Service name (default: feed-relay)
    /// - `FR_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `FR_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `FR_LOG_TARGET`: Include module targets (default: true)
    /// - `FR_METRICS_PORT`: Prometheus metrics port (default: 9100)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("FR_SERVICE_NAME")
                .unwrap_or_else(|_| "feed-relay".to_string()),

            log_level: env::var("FR_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("FR_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),

            with_target: env::var("FR_LOG_TARGET")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),

            metrics_port: env::var("FR_METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9100),
        }
    }

    /// Same as the default but at the given level, for tests and tools.
    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            log_level: level.into(),
            ..Self::default()
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
