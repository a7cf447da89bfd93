//! # Runtime Configuration
//!
//! Unified configuration for every component the relay wires together.
//!
//! ## Loading order
//!
//! 1. Defaults
//! 2. JSON file named by `FR_CONFIG` (optional)
//! 3. Environment overrides (`FR_INGRESS_CAPACITY`, `FR_MAX_CONNECTIONS`, ...)
//! 4. `validate()`

use crate::error::RuntimeError;
use fr_02_resilient_client::{BreakerMode, ClientConfig};
use fr_03_fanout::FanoutConfig;
use serde::{Deserialize, Serialize};
use shared_bus::BusConfig;
use shared_types::ConfigError;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_ENV: &str = "FR_CONFIG";

/// Complete relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub bus: BusConfig,
    /// Shared by every provider client.
    pub client: ClientConfig,
    pub fanout: FanoutConfig,
    pub monitor: MonitorConfig,
    pub providers: Vec<ProviderConfig>,
}

impl RuntimeConfig {
    /// Load from `FR_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, RuntimeError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file. Missing sections fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| RuntimeError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| RuntimeError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// # Environment Variables
    ///
    /// - `FR_INGRESS_CAPACITY`: bus ingress queue capacity
    /// - `FR_HANDLER_QUEUE_CAPACITY`: per-handler queue capacity
    /// - `FR_STOP_GRACE_MS`: bus stop grace period
    /// - `FR_MAX_CONNECTIONS`: live connection ceiling
    /// - `FR_IDLE_TIMEOUT_SECS`: drop connections without client activity
    /// - `FR_MAX_RETRIES`: client retries per call
    /// - `FR_BREAKER_MODE`: `advisory` or `enforcing`
    /// - `FR_MONITOR_INTERVAL_SECS`: health check period
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FR_INGRESS_CAPACITY") {
            self.bus.ingress_capacity = parse_env("FR_INGRESS_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("FR_HANDLER_QUEUE_CAPACITY") {
            self.bus.handler_queue_capacity = parse_env("FR_HANDLER_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("FR_STOP_GRACE_MS") {
            self.bus.stop_grace_ms = parse_env("FR_STOP_GRACE_MS", &v)?;
        }
        if let Some(v) = lookup("FR_MAX_CONNECTIONS") {
            self.fanout.max_connections = parse_env("FR_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("FR_IDLE_TIMEOUT_SECS") {
            self.fanout.idle_timeout_secs = Some(parse_env("FR_IDLE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("FR_MAX_RETRIES") {
            self.client.max_retries = parse_env("FR_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("FR_BREAKER_MODE") {
            self.client.breaker_mode = match v.to_ascii_lowercase().as_str() {
                "advisory" => BreakerMode::Advisory,
                "enforcing" => BreakerMode::Enforcing,
                other => {
                    return Err(ConfigError::invalid(
                        "FR_BREAKER_MODE",
                        format!("expected advisory or enforcing, got '{other}'"),
                    ))
                }
            };
        }
        if let Some(v) = lookup("FR_MONITOR_INTERVAL_SECS") {
            self.monitor.interval_secs = parse_env("FR_MONITOR_INTERVAL_SECS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bus.validate()?;
        self.client.validate()?;
        self.fanout.validate()?;
        self.monitor.validate()?;

        let mut seen = HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::Inconsistent(format!(
                    "provider '{}' configured twice",
                    provider.name
                )));
            }
        }
        Ok(())
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

fn parse_env<T: FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(field, format!("'{value}': {e}")))
}

/// One upstream odds provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Also the rate-limiter key and the breaker name.
    pub name: String,
    pub odds_url: String,
    /// Provider-wide budget; `None` means unlimited.
    pub rate_per_minute: Option<u32>,
    /// Time between ingestion runs (in seconds)
    pub poll_interval_secs: u64,
    /// Header carrying the API key, e.g. `x-api-key`
    pub api_key_header: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            odds_url: String::new(),
            rate_per_minute: Some(60),
            poll_interval_secs: 60,
            api_key_header: None,
            api_key: None,
            enabled: true,
        }
    }
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, odds_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            odds_url: odds_url.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("providers.name", "cannot be empty"));
        }
        if self.odds_url.trim().is_empty() {
            return Err(ConfigError::invalid(
                "providers.odds_url",
                format!("missing for provider '{}'", self.name),
            ));
        }
        ConfigError::require_nonzero("providers.poll_interval_secs", self.poll_interval_secs)?;
        if self.api_key.is_some() && self.api_key_header.is_none() {
            return Err(ConfigError::Inconsistent(format!(
                "provider '{}' has an api_key but no api_key_header",
                self.name
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Health monitor thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Time between health checks (in seconds)
    pub interval_secs: u64,
    /// Reports kept in memory
    pub history_capacity: usize,
    pub queue_yellow_percent: f64,
    pub queue_red_percent: f64,
    pub failure_rate_yellow: f64,
    pub failure_rate_red: f64,
    pub p95_yellow_ms: f64,
    pub p95_red_ms: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            history_capacity: 120,
            queue_yellow_percent: 50.0,
            queue_red_percent: 80.0,
            failure_rate_yellow: 0.05,
            failure_rate_red: 0.20,
            p95_yellow_ms: 500.0,
            p95_red_ms: 2_000.0,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::require_nonzero("monitor.interval_secs", self.interval_secs)?;
        ConfigError::require_nonzero("monitor.history_capacity", self.history_capacity as u64)?;
        check_pair("queue percent", self.queue_yellow_percent, self.queue_red_percent)?;
        check_pair("failure rate", self.failure_rate_yellow, self.failure_rate_red)?;
        check_pair("p95 latency", self.p95_yellow_ms, self.p95_red_ms)?;
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn check_pair(name: &str, yellow: f64, red: f64) -> Result<(), ConfigError> {
    if !(yellow.is_finite() && red.is_finite()) || yellow < 0.0 || yellow > red {
        return Err(ConfigError::Inconsistent(format!(
            "{name} thresholds must satisfy 0 <= yellow ({yellow}) <= red ({red})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RuntimeConfig::default();
        config
            .apply_env(env(&[
                ("FR_INGRESS_CAPACITY", "64"),
                ("FR_MAX_CONNECTIONS", "10"),
                ("FR_IDLE_TIMEOUT_SECS", "90"),
                ("FR_BREAKER_MODE", "Enforcing"),
            ]))
            .unwrap();
        assert_eq!(config.bus.ingress_capacity, 64);
        assert_eq!(config.fanout.max_connections, 10);
        assert_eq!(config.fanout.idle_timeout_secs, Some(90));
        assert_eq!(config.client.breaker_mode, BreakerMode::Enforcing);
    }

    #[test]
    fn test_bad_env_value_names_the_variable() {
        let mut config = RuntimeConfig::default();
        let err = config
            .apply_env(env(&[("FR_MAX_CONNECTIONS", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "FR_MAX_CONNECTIONS", .. }
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{
                "bus": { "ingress_capacity": 32 },
                "providers": [{ "name": "alpha", "odds_url": "https://alpha.example/odds" }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.bus.ingress_capacity, 32);
        assert_eq!(config.bus.default_concurrency, BusConfig::default().default_concurrency);
        assert_eq!(config.providers[0].rate_per_minute, Some(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let config = RuntimeConfig {
            providers: vec![
                ProviderConfig::new("alpha", "https://a.example/odds"),
                ProviderConfig::new("alpha", "https://b.example/odds"),
            ],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Inconsistent(_))));
    }

    #[test]
    fn test_api_key_requires_header() {
        let provider = ProviderConfig {
            api_key: Some("secret".into()),
            ..ProviderConfig::new("alpha", "https://a.example/odds")
        };
        assert!(provider.validate().is_err());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let monitor = MonitorConfig {
            p95_yellow_ms: 3_000.0,
            p95_red_ms: 1_000.0,
            ..Default::default()
        };
        assert!(matches!(monitor.validate(), Err(ConfigError::Inconsistent(_))));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let provider = ProviderConfig {
            api_key_header: Some("x-api-key".into()),
            api_key: Some("secret".into()),
            ..ProviderConfig::new("alpha", "https://a.example/odds")
        };
        let json = serde_json::to_string(&provider).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = RuntimeConfig::from_file("/nonexistent/relay.json").unwrap_err();
        assert!(matches!(err, RuntimeError::Load { .. }));
    }
}
