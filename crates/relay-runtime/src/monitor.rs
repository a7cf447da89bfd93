//! # Health Monitor
//!
//! Periodically turns a bus snapshot, the provider breakers and the
//! connection registry into one [`HealthReport`].
//!
//! | Signal | Yellow | Red |
//! |--------|--------|-----|
//! | queue usage (ingress or worst handler) | `queue_yellow_percent` | `queue_red_percent` |
//! | handler failure rate | `failure_rate_yellow` | `failure_rate_red` |
//! | p95 handler latency | `p95_yellow_ms` | `p95_red_ms` |
//! | any provider circuit open | always | never |
//!
//! The report level is the worst signal.

use crate::config::MonitorConfig;
use chrono::{DateTime, Utc};
use feed_telemetry::{record_bus_snapshot, record_circuit, record_connections, ALERT_LEVEL};
use fr_02_resilient_client::ResilientClient;
use fr_03_fanout::ConnectionManager;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_bus::{BusStatsSnapshot, EventBus, RingBuffer};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Traffic-light health level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Green,
    Yellow,
    Red,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Green => "green",
            AlertLevel::Yellow => "yellow",
            AlertLevel::Red => "red",
        }
    }

    fn gauge_value(self) -> f64 {
        match self {
            AlertLevel::Green => 0.0,
            AlertLevel::Yellow => 1.0,
            AlertLevel::Red => 2.0,
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluated health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub at: DateTime<Utc>,
    pub level: AlertLevel,
    /// Human-readable cause for every non-green signal
    pub reasons: Vec<String>,
    pub queue_usage_percent: f64,
    pub failure_rate: f64,
    pub p95_ms: f64,
    pub open_circuits: Vec<String>,
    pub live_connections: usize,
    pub bus: BusStatsSnapshot,
}

/// Grade one signal against its thresholds.
fn grade(value: f64, yellow: f64, red: f64) -> AlertLevel {
    if value >= red {
        AlertLevel::Red
    } else if value >= yellow {
        AlertLevel::Yellow
    } else {
        AlertLevel::Green
    }
}

/// Evaluate bus-level signals only. Returns the worst level and the reasons.
pub fn assess(config: &MonitorConfig, snapshot: &BusStatsSnapshot) -> (AlertLevel, Vec<String>) {
    let queue = snapshot
        .ingress_usage_percent()
        .max(snapshot.max_handler_queue_usage_percent());
    let checks = [
        (
            "queue usage",
            queue,
            grade(queue, config.queue_yellow_percent, config.queue_red_percent),
            "%",
        ),
        (
            "failure rate",
            snapshot.failure_rate(),
            grade(
                snapshot.failure_rate(),
                config.failure_rate_yellow,
                config.failure_rate_red,
            ),
            "",
        ),
        (
            "p95 latency",
            snapshot.latency.p95_ms,
            grade(snapshot.latency.p95_ms, config.p95_yellow_ms, config.p95_red_ms),
            "ms",
        ),
    ];

    let mut level = AlertLevel::Green;
    let mut reasons = Vec::new();
    for (name, value, graded, unit) in checks {
        if graded > AlertLevel::Green {
            reasons.push(format!("{name} {value:.2}{unit} is {graded}"));
        }
        level = level.max(graded);
    }
    (level, reasons)
}

pub struct HealthMonitor {
    config: MonitorConfig,
    bus: EventBus,
    clients: Vec<Arc<ResilientClient>>,
    fanout: Option<Arc<ConnectionManager>>,
    history: Mutex<RingBuffer<HealthReport>>,
}

impl HealthMonitor {
    pub fn new(config: MonitorConfig, bus: EventBus) -> Self {
        let history = Mutex::new(RingBuffer::new(config.history_capacity));
        Self {
            config,
            bus,
            clients: Vec::new(),
            fanout: None,
            history,
        }
    }

    /// Watch a provider client's breaker.
    pub fn with_client(mut self, client: Arc<ResilientClient>) -> Self {
        self.clients.push(client);
        self
    }

    pub fn with_fanout(mut self, manager: Arc<ConnectionManager>) -> Self {
        self.fanout = Some(manager);
        self
    }

    /// Evaluate now, record the report and update the metrics.
    pub fn check(&self) -> HealthReport {
        let snapshot = self.bus.stats();
        let (mut level, mut reasons) = assess(&self.config, &snapshot);

        let mut open_circuits = Vec::new();
        for client in &self.clients {
            let open = client.is_open();
            record_circuit(client.name(), open, client.circuit().failure_count());
            if open {
                open_circuits.push(client.name().to_string());
            }
        }
        if !open_circuits.is_empty() {
            reasons.push(format!("provider circuit open: {}", open_circuits.join(", ")));
            level = level.max(AlertLevel::Yellow);
        }

        let live_connections = match &self.fanout {
            Some(manager) => {
                let stats = manager.stats();
                record_connections(stats.live, stats.dropped_connections);
                stats.live
            }
            None => 0,
        };

        record_bus_snapshot(&snapshot);
        ALERT_LEVEL.set(level.gauge_value());

        let report = HealthReport {
            at: Utc::now(),
            level,
            reasons,
            queue_usage_percent: snapshot
                .ingress_usage_percent()
                .max(snapshot.max_handler_queue_usage_percent()),
            failure_rate: snapshot.failure_rate(),
            p95_ms: snapshot.latency.p95_ms,
            open_circuits,
            live_connections,
            bus: snapshot,
        };
        self.log_transition(&report);
        self.history.lock().push(report.clone());
        report
    }

    fn log_transition(&self, report: &HealthReport) {
        let previous = self.latest().map(|r| r.level);
        if previous == Some(report.level) {
            debug!(level = %report.level, "Health unchanged");
            return;
        }
        match report.level {
            AlertLevel::Red => warn!(
                level = %report.level,
                reasons = ?report.reasons,
                "Relay health degraded"
            ),
            AlertLevel::Yellow => warn!(
                level = %report.level,
                reasons = ?report.reasons,
                "Relay health warning"
            ),
            AlertLevel::Green => info!(previous = ?previous, "Relay health green"),
        }
    }

    pub fn latest(&self) -> Option<HealthReport> {
        self.history.lock().newest().cloned()
    }

    /// Recorded reports, oldest first.
    pub fn history(&self) -> Vec<HealthReport> {
        self.history.lock().to_vec()
    }

    /// Run `check` every interval until `shutdown` flips.
    pub fn spawn(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.interval());
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        monitor.check();
                    }
                }
            }
            debug!("Health monitor stopped");
        })
    }
}
