//! # Feed Relay
//!
//! Entry point for the relay process.
//!
//! ## Startup Sequence
//!
//! 1. Initialise logging and metrics
//! 2. Load configuration (`FR_CONFIG` file, then environment)
//! 3. Build components and start background tasks
//! 4. Wait for Ctrl-C, then shut down in reverse order

use anyhow::{Context, Result};
use feed_telemetry::{init_telemetry, TelemetryConfig};
use relay_runtime::{RelayRuntime, RuntimeConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("Failed to initialise telemetry")?;

    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    info!(
        providers = config.enabled_providers().count(),
        ingress_capacity = config.bus.ingress_capacity,
        breaker_mode = ?config.client.breaker_mode,
        "Configuration loaded"
    );

    let runtime = RelayRuntime::new(config).context("Failed to build relay runtime")?;
    runtime.start().context("Failed to start relay runtime")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down");

    runtime.shutdown().await;
    Ok(())
}
