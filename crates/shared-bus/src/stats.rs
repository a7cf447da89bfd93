//! # Bus Statistics
//!
//! All counters live behind a single short-held lock. Recording is a handful
//! of integer bumps; `snapshot()` copies the raw data out under the lock and
//! computes derived values (rates, percentiles) after releasing it.

use crate::events::{Event, EventType};
use crate::ring::RingBuffer;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use shared_types::EventId;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Monotonic counters kept globally, per event type, per source and per handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub published: u64,
    pub handled: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// One recorded handler failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub event_id: EventId,
    pub event_type: EventType,
    pub handler: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Live gauges for one subscription, read by the bus at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerStats {
    pub name: String,
    pub event_type: EventType,
    pub concurrency: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub in_flight: usize,
    pub counters: Counters,
}

/// Handler latency percentiles in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

/// Point-in-time copy of everything the bus knows about itself.
#[derive(Debug, Clone, Serialize)]
pub struct BusStatsSnapshot {
    pub running: bool,
    pub uptime_secs: f64,
    pub totals: Counters,
    /// Deliveries dropped because a handler queue was full.
    pub delivery_dropped_total: u64,
    /// Publishes refused because the bus was stopped. Also counted in `totals.dropped`.
    pub rejected_after_stop: u64,
    pub by_event_type: BTreeMap<EventType, Counters>,
    pub by_source: BTreeMap<String, Counters>,
    pub handlers: Vec<HandlerStats>,
    pub ingress_depth: usize,
    pub ingress_capacity: usize,
    pub window_secs: u64,
    pub events_per_sec: f64,
    pub failures_per_sec: f64,
    pub latency: LatencySummary,
    /// Most recent handler failures, oldest first.
    pub recent_errors: Vec<ErrorRecord>,
}

impl BusStatsSnapshot {
    pub fn ingress_usage_percent(&self) -> f64 {
        percent(self.ingress_depth, self.ingress_capacity)
    }

    /// Highest queue fill level across all handlers.
    pub fn max_handler_queue_usage_percent(&self) -> f64 {
        self.handlers
            .iter()
            .map(|h| percent(h.queue_depth, h.queue_capacity))
            .fold(0.0, f64::max)
    }

    /// Fraction of finished invocations that failed, in `[0, 1]`.
    pub fn failure_rate(&self) -> f64 {
        let finished = self.totals.handled + self.totals.failed;
        if finished == 0 {
            0.0
        } else {
            self.totals.failed as f64 / finished as f64
        }
    }

    pub fn handler(&self, name: &str) -> Option<&HandlerStats> {
        self.handlers.iter().find(|h| h.name == name)
    }
}

fn percent(depth: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        0.0
    } else {
        depth as f64 * 100.0 / capacity as f64
    }
}

/// Per-second buckets covering a sliding window.
#[derive(Debug)]
struct RateWindow {
    window_secs: u64,
    /// `(second, count)` slots indexed by `second % window_secs`.
    slots: Vec<(u64, u64)>,
}

impl RateWindow {
    fn new(window_secs: u64) -> Self {
        let window_secs = window_secs.max(1);
        Self {
            window_secs,
            slots: vec![(u64::MAX, 0); window_secs as usize],
        }
    }

    fn record(&mut self, second: u64) {
        let slot = &mut self.slots[(second % self.window_secs) as usize];
        if slot.0 != second {
            *slot = (second, 0);
        }
        slot.1 += 1;
    }

    fn count(&self, now_second: u64) -> u64 {
        self.slots
            .iter()
            .filter(|(sec, _)| *sec <= now_second && sec + self.window_secs > now_second)
            .map(|(_, count)| count)
            .sum()
    }
}

#[derive(Debug)]
struct StatsInner {
    totals: Counters,
    delivery_dropped_total: u64,
    rejected_after_stop: u64,
    by_type: BTreeMap<EventType, Counters>,
    by_source: BTreeMap<String, Counters>,
    by_handler: HashMap<String, Counters>,
    published_window: RateWindow,
    failed_window: RateWindow,
    latencies_us: RingBuffer<u64>,
    errors: RingBuffer<ErrorRecord>,
}

/// Inputs the bus supplies at snapshot time.
pub(crate) struct LiveGauges {
    pub running: bool,
    pub ingress_depth: usize,
    pub ingress_capacity: usize,
    /// Handler gauges with zeroed counters; filled in from the recorder.
    pub handlers: Vec<HandlerStats>,
}

/// Thread-safe statistics sink owned by the bus.
#[derive(Debug)]
pub struct StatsRecorder {
    started_at: Instant,
    window_secs: u64,
    inner: Mutex<StatsInner>,
}

impl StatsRecorder {
    pub fn new(window_secs: u64, latency_samples: usize, error_capacity: usize) -> Self {
        Self {
            started_at: Instant::now(),
            window_secs: window_secs.max(1),
            inner: Mutex::new(StatsInner {
                totals: Counters::default(),
                delivery_dropped_total: 0,
                rejected_after_stop: 0,
                by_type: BTreeMap::new(),
                by_source: BTreeMap::new(),
                by_handler: HashMap::new(),
                published_window: RateWindow::new(window_secs),
                failed_window: RateWindow::new(window_secs),
                latencies_us: RingBuffer::new(latency_samples),
                errors: RingBuffer::new(error_capacity),
            }),
        }
    }

    fn second(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub(crate) fn register_handler(&self, name: &str) {
        self.inner.lock().by_handler.entry(name.to_string()).or_default();
    }

    pub fn record_published(&self, event: &Event) {
        let second = self.second();
        let mut inner = self.inner.lock();
        inner.totals.published += 1;
        inner.by_type.entry(event.event_type()).or_default().published += 1;
        by_source(&mut inner, event.source()).published += 1;
        inner.published_window.record(second);
    }

    /// Ingress was full.
    pub fn record_dropped(&self, event: &Event) {
        let mut inner = self.inner.lock();
        inner.totals.dropped += 1;
        inner.by_type.entry(event.event_type()).or_default().dropped += 1;
        by_source(&mut inner, event.source()).dropped += 1;
    }

    /// Publish refused because the bus is stopped.
    pub fn record_rejected(&self, event: &Event) {
        self.record_dropped(event);
        self.inner.lock().rejected_after_stop += 1;
    }

    /// A handler's queue was full, so this one delivery was skipped.
    pub fn record_delivery_dropped(&self, handler: &str) {
        let mut inner = self.inner.lock();
        inner.delivery_dropped_total += 1;
        inner.by_handler.entry(handler.to_string()).or_default().dropped += 1;
    }

    pub fn record_handled(&self, handler: &str, event: &Event, latency: Duration) {
        let mut inner = self.inner.lock();
        inner.totals.handled += 1;
        inner.by_type.entry(event.event_type()).or_default().handled += 1;
        by_source(&mut inner, event.source()).handled += 1;
        inner.by_handler.entry(handler.to_string()).or_default().handled += 1;
        inner.latencies_us.push(latency.as_micros() as u64);
    }

    pub fn record_failed(&self, handler: &str, event: &Event, error: String, latency: Duration) {
        let second = self.second();
        let record = ErrorRecord {
            event_id: event.event_id(),
            event_type: event.event_type(),
            handler: handler.to_string(),
            error,
            at: Utc::now(),
        };
        let mut inner = self.inner.lock();
        inner.totals.failed += 1;
        inner.by_type.entry(event.event_type()).or_default().failed += 1;
        by_source(&mut inner, event.source()).failed += 1;
        inner.by_handler.entry(handler.to_string()).or_default().failed += 1;
        inner.failed_window.record(second);
        inner.latencies_us.push(latency.as_micros() as u64);
        inner.errors.push(record);
    }

    pub(crate) fn snapshot(&self, gauges: LiveGauges) -> BusStatsSnapshot {
        let elapsed = self.started_at.elapsed();
        let second = elapsed.as_secs();

        let inner = self.inner.lock();
        let totals = inner.totals;
        let delivery_dropped_total = inner.delivery_dropped_total;
        let rejected_after_stop = inner.rejected_after_stop;
        let by_event_type = inner.by_type.clone();
        let by_source = inner.by_source.clone();
        let by_handler = inner.by_handler.clone();
        let published = inner.published_window.count(second);
        let failed = inner.failed_window.count(second);
        let latencies = inner.latencies_us.to_vec();
        let recent_errors = inner.errors.to_vec();
        drop(inner);

        let handlers = gauges
            .handlers
            .into_iter()
            .map(|mut h| {
                h.counters = by_handler.get(&h.name).copied().unwrap_or_default();
                h
            })
            .collect();

        // Early in the process lifetime the window is not yet full.
        let span = self.window_secs.min(second + 1) as f64;

        BusStatsSnapshot {
            running: gauges.running,
            uptime_secs: elapsed.as_secs_f64(),
            totals,
            delivery_dropped_total,
            rejected_after_stop,
            by_event_type,
            by_source,
            handlers,
            ingress_depth: gauges.ingress_depth,
            ingress_capacity: gauges.ingress_capacity,
            window_secs: self.window_secs,
            events_per_sec: published as f64 / span,
            failures_per_sec: failed as f64 / span,
            latency: summarize(latencies),
            recent_errors,
        }
    }
}

fn by_source<'a>(inner: &'a mut StatsInner, source: &str) -> &'a mut Counters {
    inner.by_source.entry(source.to_string()).or_default()
}

fn summarize(mut samples_us: Vec<u64>) -> LatencySummary {
    if samples_us.is_empty() {
        return LatencySummary::default();
    }
    samples_us.sort_unstable();
    let n = samples_us.len();
    // Nearest-rank percentile.
    let pick = |p: f64| -> f64 {
        let rank = ((p * n as f64).ceil() as usize).clamp(1, n);
        samples_us[rank - 1] as f64 / 1_000.0
    };
    LatencySummary {
        samples: n,
        p50_ms: pick(0.50),
        p95_ms: pick(0.95),
        p99_ms: pick(0.99),
        max_ms: samples_us[n - 1] as f64 / 1_000.0,
    }
}
