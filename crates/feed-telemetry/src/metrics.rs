//! Prometheus metrics for the relay.
//!
//! All metrics follow the naming convention: `fr_<component>_<metric>_<unit>`
//!
//! Bus figures are mirrored from [`BusStatsSnapshot`]s rather than bumped
//! inline on the hot path, so the bus itself stays free of metric calls and
//! the exported values always agree with `EventBus::stats()`.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec,
    Opts, Registry, TextEncoder,
};
use shared_bus::BusStatsSnapshot;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EVENT BUS
    // =========================================================================

    /// Bus totals by outcome (published, handled, failed, dropped)
    pub static ref BUS_EVENTS: GaugeVec = GaugeVec::new(
        Opts::new("fr_bus_events_total", "Event bus totals as of the last snapshot"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Per-handler deliveries dropped because the handler queue was full
    pub static ref BUS_DELIVERY_DROPPED: Gauge = Gauge::new(
        "fr_bus_delivery_dropped_total",
        "Handler deliveries dropped on a full handler queue"
    ).expect("metric creation failed");

    /// Ingress queue usage
    pub static ref BUS_INGRESS_USAGE: Gauge = Gauge::new(
        "fr_bus_ingress_usage_percent",
        "Ingress queue fill level"
    ).expect("metric creation failed");

    /// Handler queue usage
    pub static ref BUS_HANDLER_QUEUE_USAGE: GaugeVec = GaugeVec::new(
        Opts::new("fr_bus_handler_queue_usage_percent", "Handler queue fill level"),
        &["handler"]
    ).expect("metric creation failed");

    /// Handler latency percentiles
    pub static ref BUS_HANDLER_LATENCY: GaugeVec = GaugeVec::new(
        Opts::new("fr_bus_handler_latency_ms", "Handler latency over recent invocations"),
        &["quantile"]  // quantile: p50/p95/p99
    ).expect("metric creation failed");

    /// Publish rate over the sliding window
    pub static ref BUS_EVENTS_PER_SEC: Gauge = Gauge::new(
        "fr_bus_events_per_second",
        "Accepted events per second over the stats window"
    ).expect("metric creation failed");

    /// Handler failure ratio
    pub static ref BUS_FAILURE_RATE: Gauge = Gauge::new(
        "fr_bus_failure_ratio",
        "Failed invocations over completed invocations"
    ).expect("metric creation failed");

    // =========================================================================
    // PROVIDERS
    // =========================================================================

    /// Circuit state per provider (1 = open)
    pub static ref CIRCUIT_OPEN: GaugeVec = GaugeVec::new(
        Opts::new("fr_provider_circuit_open", "Whether the provider circuit is open"),
        &["provider"]
    ).expect("metric creation failed");

    /// Consecutive failures per provider
    pub static ref CIRCUIT_FAILURES: GaugeVec = GaugeVec::new(
        Opts::new("fr_provider_consecutive_failures", "Consecutive failed provider calls"),
        &["provider"]
    ).expect("metric creation failed");

    /// Ingestion runs per provider and result
    pub static ref INGEST_RUNS: IntCounterVec = IntCounterVec::new(
        Opts::new("fr_ingest_runs_total", "Ingestion job runs"),
        &["provider", "result"]  // result: ok/error
    ).expect("metric creation failed");

    /// Time spent waiting on the provider rate limiter
    pub static ref RATE_LIMIT_WAIT: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "fr_rate_limit_wait_seconds",
            "Time spent waiting for a provider token"
        ).buckets(exponential_buckets(0.001, 4.0, 10).unwrap_or_default()),
        &["provider"]
    ).expect("metric creation failed");

    // =========================================================================
    // FAN-OUT
    // =========================================================================

    /// Live client connections
    pub static ref CONNECTIONS_LIVE: Gauge = Gauge::new(
        "fr_fanout_connections_live",
        "Live client connections"
    ).expect("metric creation failed");

    /// Connections dropped by failed sends or probes
    pub static ref CONNECTIONS_DROPPED: Gauge = Gauge::new(
        "fr_fanout_connections_dropped_total",
        "Connections removed after a failed send or heartbeat"
    ).expect("metric creation failed");

    // =========================================================================
    // HEALTH
    // =========================================================================

    /// Current alert level (0 = green, 1 = yellow, 2 = red)
    pub static ref ALERT_LEVEL: Gauge = Gauge::new(
        "fr_health_alert_level",
        "Health monitor alert level"
    ).expect("metric creation failed");
}

/// Handle returned once the metrics are registered.
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    _private: (),
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; collectors that are already registered
/// are left in place.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Event bus
        Box::new(BUS_EVENTS.clone()),
        Box::new(BUS_DELIVERY_DROPPED.clone()),
        Box::new(BUS_INGRESS_USAGE.clone()),
        Box::new(BUS_HANDLER_QUEUE_USAGE.clone()),
        Box::new(BUS_HANDLER_LATENCY.clone()),
        Box::new(BUS_EVENTS_PER_SEC.clone()),
        Box::new(BUS_FAILURE_RATE.clone()),
        // Providers
        Box::new(CIRCUIT_OPEN.clone()),
        Box::new(CIRCUIT_FAILURES.clone()),
        Box::new(INGEST_RUNS.clone()),
        Box::new(RATE_LIMIT_WAIT.clone()),
        // Fan-out
        Box::new(CONNECTIONS_LIVE.clone()),
        Box::new(CONNECTIONS_DROPPED.clone()),
        // Health
        Box::new(ALERT_LEVEL.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { _private: () })
}

/// Mirror a bus snapshot into the bus gauges.
pub fn record_bus_snapshot(snapshot: &BusStatsSnapshot) {
    let totals = &snapshot.totals;
    BUS_EVENTS.with_label_values(&["published"]).set(totals.published as f64);
    BUS_EVENTS.with_label_values(&["handled"]).set(totals.handled as f64);
    BUS_EVENTS.with_label_values(&["failed"]).set(totals.failed as f64);
    BUS_EVENTS.with_label_values(&["dropped"]).set(totals.dropped as f64);
    BUS_DELIVERY_DROPPED.set(snapshot.delivery_dropped_total as f64);

    BUS_INGRESS_USAGE.set(snapshot.ingress_usage_percent());
    for handler in &snapshot.handlers {
        let usage = if handler.queue_capacity == 0 {
            0.0
        } else {
            handler.queue_depth as f64 * 100.0 / handler.queue_capacity as f64
        };
        BUS_HANDLER_QUEUE_USAGE
            .with_label_values(&[handler.name.as_str()])
            .set(usage);
    }

    BUS_HANDLER_LATENCY.with_label_values(&["p50"]).set(snapshot.latency.p50_ms);
    BUS_HANDLER_LATENCY.with_label_values(&["p95"]).set(snapshot.latency.p95_ms);
    BUS_HANDLER_LATENCY.with_label_values(&["p99"]).set(snapshot.latency.p99_ms);
    BUS_EVENTS_PER_SEC.set(snapshot.events_per_sec);
    BUS_FAILURE_RATE.set(snapshot.failure_rate());
}

/// Record the breaker state of one provider client.
pub fn record_circuit(provider: &str, open: bool, failure_count: u32) {
    CIRCUIT_OPEN
        .with_label_values(&[provider])
        .set(if open { 1.0 } else { 0.0 });
    CIRCUIT_FAILURES
        .with_label_values(&[provider])
        .set(f64::from(failure_count));
}

/// Record the connection registry totals.
pub fn record_connections(live: usize, dropped_total: u64) {
    CONNECTIONS_LIVE.set(live as f64);
    CONNECTIONS_DROPPED.set(dropped_total as f64);
}

/// Encode all metrics as Prometheus text format.
pub fn gather() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
