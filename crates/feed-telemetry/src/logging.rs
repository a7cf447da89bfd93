//! Structured logging.
//!
//! Plain output for terminals, one JSON object per line inside containers
//! so a log shipper can index the structured fields (`provider`,
//! `handler`, `event_id`, `connection_id`, ...) without regex parsing.

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the level filter. `RUST_LOG` wins when it parses, then the
/// configured level.
pub fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Config(format!("log filter '{}': {e}", config.log_level)))
}

/// Install the global subscriber.
///
/// Fails with [`TelemetryError::LoggerInit`] if a subscriber is already set,
/// which happens when tests or embedding applications initialise first.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;

    let result = if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(config.with_target)
            .with_thread_ids(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .try_init()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(config.with_target);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggerInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        json_logs = config.json_logs,
        "Logging initialised"
    );
    Ok(())
}

/// Log a provider-scoped event with the standard `provider` field.
#[macro_export]
macro_rules! log_provider_event {
    ($level:ident, $provider:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            provider = %$provider,
            $($($field)*,)?
            $msg
        )
    };
}
