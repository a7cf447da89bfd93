//! # Subscriptions and Worker Pools
//!
//! Every subscription owns a bounded queue and a worker task. The worker
//! pulls events in FIFO order and runs up to `concurrency` handler
//! invocations at once:
//!
//! ```text
//!  dispatcher ──try_send──▶ [ queue (bounded) ] ──recv──▶ worker
//!                                                          │ acquire permit
//!                                                          ▼
//!                                               JoinSet of invocations
//!                                               (≤ concurrency in flight)
//! ```
//!
//! A handler error or panic is recorded and isolated to that invocation.

use crate::events::{Event, EventType};
use crate::handler::EventHandler;
use crate::stats::{Counters, HandlerStats, StatsRecorder};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// A registered handler with its queue and concurrency budget.
pub struct Subscription {
    name: String,
    event_type: EventType,
    concurrency: usize,
    queue_capacity: usize,
    queue_tx: mpsc::Sender<Arc<Event>>,
    /// Taken by the worker when the bus starts.
    queue_rx: Mutex<Option<mpsc::Receiver<Arc<Event>>>>,
    handler: Arc<dyn EventHandler>,
    in_flight: AtomicUsize,
}

/// Result of offering an event to a subscription queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    QueueFull,
    Closed,
}

impl Subscription {
    pub(crate) fn new(
        name: String,
        event_type: EventType,
        concurrency: usize,
        queue_capacity: usize,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
        Self {
            name,
            event_type,
            concurrency,
            queue_capacity,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            handler,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_tx.max_capacity() - self.queue_tx.capacity()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Non-blocking enqueue used by the dispatcher.
    pub(crate) fn offer(&self, event: Arc<Event>) -> Delivery {
        match self.queue_tx.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::QueueFull,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub(crate) fn take_receiver(&self) -> Option<mpsc::Receiver<Arc<Event>>> {
        self.queue_rx.lock().take()
    }

    pub(crate) fn gauges(&self) -> HandlerStats {
        HandlerStats {
            name: self.name.clone(),
            event_type: self.event_type,
            concurrency: self.concurrency,
            queue_depth: self.queue_depth(),
            queue_capacity: self.queue_capacity,
            in_flight: self.in_flight(),
            counters: Counters::default(),
        }
    }
}

/// Decrements the in-flight gauge when an invocation ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Worker loop for one subscription.
///
/// Runs until `shutdown` flips, then closes the queue, drains what is left
/// and waits for every invocation to finish.
pub(crate) async fn run_worker(
    sub: Arc<Subscription>,
    mut queue: mpsc::Receiver<Arc<Event>>,
    stats: Arc<StatsRecorder>,
    mut shutdown: watch::Receiver<bool>,
) {
    let permits = Arc::new(Semaphore::new(sub.concurrency));
    let mut tasks = JoinSet::new();

    loop {
        let permit = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let event = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = queue.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        tasks.spawn(invoke(sub.clone(), event, stats.clone(), permit));
        reap(&sub, &mut tasks);
    }

    queue.close();
    let mut drained = 0usize;
    while let Some(event) = queue.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        tasks.spawn(invoke(sub.clone(), event, stats.clone(), permit));
        drained += 1;
        reap(&sub, &mut tasks);
    }

    while let Some(result) = tasks.join_next().await {
        log_join_error(&sub, result);
    }
    debug!(handler = %sub.name, drained, "Worker stopped");
}

fn reap(sub: &Subscription, tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        log_join_error(sub, result);
    }
}

fn log_join_error(sub: &Subscription, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if !e.is_cancelled() {
            warn!(handler = %sub.name, error = %e, "Handler task ended abnormally");
        }
    }
}

async fn invoke(
    sub: Arc<Subscription>,
    event: Arc<Event>,
    stats: Arc<StatsRecorder>,
    _permit: OwnedSemaphorePermit,
) {
    let _guard = InFlightGuard::enter(&sub.in_flight);
    let started = Instant::now();
    let outcome = AssertUnwindSafe(sub.handler.handle(event.clone()))
        .catch_unwind()
        .await;
    let latency = started.elapsed();

    match outcome {
        Ok(Ok(())) => {
            debug!(
                handler = %sub.name,
                event_id = %event.event_id(),
                latency_ms = latency.as_millis() as u64,
                "Event handled"
            );
            stats.record_handled(&sub.name, &event, latency);
        }
        Ok(Err(e)) => {
            error!(
                handler = %sub.name,
                event_id = %event.event_id(),
                event_type = %event.event_type(),
                error = %e,
                "Handler failed"
            );
            stats.record_failed(&sub.name, &event, e.to_string(), latency);
        }
        Err(panic) => {
            let message = format!("handler panicked: {}", panic_message(panic.as_ref()));
            error!(
                handler = %sub.name,
                event_id = %event.event_id(),
                event_type = %event.event_type(),
                error = %message,
                "Handler panicked"
            );
            stats.record_failed(&sub.name, &event, message, latency);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
