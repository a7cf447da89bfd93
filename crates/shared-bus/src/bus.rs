//! # Event Bus
//!
//! Typed in-process pub/sub with bounded queues at every hop:
//!
//! ```text
//! publish() ──try_send──▶ [ ingress ] ──▶ dispatcher ──┬──▶ [ queue h1 ] ──▶ worker h1
//!   (never blocks;           bounded                    ├──▶ [ queue h2 ] ──▶ worker h2
//!    full = dropped)                                    └──▶ ...
//! ```
//!
//! Subscriptions are static: they are registered before `start()` and live
//! until the bus is stopped. A stopped bus keeps answering `stats()`.

use crate::config::BusConfig;
use crate::error::BusError;
use crate::events::{Event, EventType};
use crate::handler::EventHandler;
use crate::publisher::EventPublisher;
use crate::stats::{BusStatsSnapshot, LiveGauges, StatsRecorder};
use crate::subscriber::{run_worker, Delivery, Subscription};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

type Routes = HashMap<EventType, Vec<Arc<Subscription>>>;

struct RunningTasks {
    dispatcher: JoinHandle<()>,
    dispatcher_shutdown: watch::Sender<bool>,
    workers: Vec<(String, JoinHandle<()>)>,
    worker_shutdown: watch::Sender<bool>,
}

enum Lifecycle {
    Idle,
    Running(RunningTasks),
    Stopped,
}

struct BusInner {
    config: BusConfig,
    ingress_tx: mpsc::Sender<Arc<Event>>,
    /// Taken by the dispatcher on `start()`.
    ingress_rx: Mutex<Option<mpsc::Receiver<Arc<Event>>>>,
    accepting: AtomicBool,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    lifecycle: Mutex<Lifecycle>,
    stats: Arc<StatsRecorder>,
}

/// Cloneable handle to one bus instance.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus. Publishing is accepted immediately and buffered in the
    /// ingress queue until `start()`.
    pub fn new(config: BusConfig) -> Result<Self, BusError> {
        config.validate()?;
        let (ingress_tx, ingress_rx) = mpsc::channel(config.ingress_capacity);
        let stats = Arc::new(StatsRecorder::new(
            config.rate_window_secs,
            config.latency_samples,
            config.error_ring_capacity,
        ));
        Ok(Self {
            inner: Arc::new(BusInner {
                config,
                ingress_tx,
                ingress_rx: Mutex::new(Some(ingress_rx)),
                accepting: AtomicBool::new(true),
                subscriptions: RwLock::new(Vec::new()),
                lifecycle: Mutex::new(Lifecycle::Idle),
                stats,
            }),
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Register `handler` for `event_type` under a unique `name`.
    ///
    /// The same event type may be subscribed many times; each registration
    /// gets its own queue and its own concurrency budget.
    pub fn subscribe<H: EventHandler>(
        &self,
        event_type: EventType,
        handler: H,
        name: impl Into<String>,
        concurrency: usize,
    ) -> Result<(), BusError> {
        let name = name.into();
        match *self.inner.lifecycle.lock() {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => return Err(BusError::AlreadyStarted),
            Lifecycle::Stopped => return Err(BusError::Stopped),
        }
        if concurrency == 0 {
            return Err(BusError::InvalidConcurrency { name, event_type });
        }

        let mut subs = self.inner.subscriptions.write();
        if subs.iter().any(|s| s.name() == name) {
            return Err(BusError::DuplicateHandler(name));
        }
        self.inner.stats.register_handler(&name);
        subs.push(Arc::new(Subscription::new(
            name.clone(),
            event_type,
            concurrency,
            self.inner.config.handler_queue_capacity,
            Arc::new(handler),
        )));

        info!(handler = %name, event_type = %event_type, concurrency, "Handler subscribed");
        Ok(())
    }

    /// Spawn the dispatcher and one worker per subscription on the current
    /// tokio runtime.
    pub fn start(&self) -> Result<(), BusError> {
        let runtime = Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        let mut lifecycle = self.inner.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => return Err(BusError::AlreadyStarted),
            Lifecycle::Stopped => return Err(BusError::Stopped),
        }
        let ingress_rx = self
            .inner
            .ingress_rx
            .lock()
            .take()
            .ok_or(BusError::AlreadyStarted)?;

        let subs = self.inner.subscriptions.read().clone();
        let (worker_shutdown, worker_rx) = watch::channel(false);
        let mut routes: Routes = HashMap::new();
        let mut workers = Vec::with_capacity(subs.len());
        for sub in &subs {
            routes.entry(sub.event_type()).or_default().push(sub.clone());
            if let Some(queue) = sub.take_receiver() {
                let handle = runtime.spawn(run_worker(
                    sub.clone(),
                    queue,
                    self.inner.stats.clone(),
                    worker_rx.clone(),
                ));
                workers.push((sub.name().to_string(), handle));
            }
        }

        let (dispatcher_shutdown, dispatcher_rx) = watch::channel(false);
        let dispatcher = runtime.spawn(run_dispatcher(
            ingress_rx,
            routes,
            self.inner.stats.clone(),
            dispatcher_rx,
        ));

        *lifecycle = Lifecycle::Running(RunningTasks {
            dispatcher,
            dispatcher_shutdown,
            workers,
            worker_shutdown,
        });
        info!(subscriptions = subs.len(), "Event bus started");
        Ok(())
    }

    /// Enqueue an event without waiting.
    ///
    /// Returns `false` when the event was dropped: the ingress queue was
    /// full or the bus has been stopped. Either way the drop is counted.
    pub fn publish(&self, event: Event) -> bool {
        let event = Arc::new(event);
        if !self.inner.accepting.load(Ordering::Acquire) {
            self.inner.stats.record_rejected(&event);
            debug!(event_id = %event.event_id(), "Publish after stop rejected");
            return false;
        }

        match self.inner.ingress_tx.try_send(event.clone()) {
            Ok(()) => {
                self.inner.stats.record_published(&event);
                debug!(
                    event_id = %event.event_id(),
                    event_type = %event.event_type(),
                    source = event.source(),
                    "Event published"
                );
                true
            }
            Err(TrySendError::Full(_)) => {
                self.inner.stats.record_dropped(&event);
                warn!(
                    event_id = %event.event_id(),
                    event_type = %event.event_type(),
                    source = event.source(),
                    capacity = self.inner.config.ingress_capacity,
                    "Ingress queue full, event dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.inner.stats.record_rejected(&event);
                false
            }
        }
    }

    /// Stop accepting events, let queued and in-flight work finish, and
    /// abandon whatever is still running once the grace period elapses.
    pub async fn stop(&self) {
        self.inner.accepting.store(false, Ordering::Release);
        let tasks = {
            let mut lifecycle = self.inner.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(tasks) => tasks,
                Lifecycle::Idle | Lifecycle::Stopped => return,
            }
        };

        let grace = self.inner.config.stop_grace();
        let deadline = Instant::now() + grace;
        info!(grace_ms = grace.as_millis() as u64, "Stopping event bus");

        let RunningTasks {
            mut dispatcher,
            dispatcher_shutdown,
            workers,
            worker_shutdown,
        } = tasks;

        let _ = dispatcher_shutdown.send(true);
        if timeout_at(deadline, &mut dispatcher).await.is_err() {
            warn!("Dispatcher did not drain in time, aborting");
            dispatcher.abort();
        }

        let _ = worker_shutdown.send(true);
        let mut abandoned = 0usize;
        for (name, mut worker) in workers {
            if timeout_at(deadline, &mut worker).await.is_err() {
                warn!(handler = %name, "Handler still running after grace period, abandoning");
                worker.abort();
                abandoned += 1;
            }
        }

        info!(abandoned, "Event bus stopped");
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.inner.lifecycle.lock(), Lifecycle::Running(_))
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Point-in-time statistics. Safe to call before start and after stop.
    pub fn stats(&self) -> BusStatsSnapshot {
        let running = self.is_running();
        let handlers = self
            .inner
            .subscriptions
            .read()
            .iter()
            .map(|s| s.gauges())
            .collect();
        let tx = &self.inner.ingress_tx;
        self.inner.stats.snapshot(LiveGauges {
            running,
            ingress_depth: tx.max_capacity() - tx.capacity(),
            ingress_capacity: tx.max_capacity(),
            handlers,
        })
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: Event) -> bool {
        EventBus::publish(self, event)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("running", &self.is_running())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

async fn run_dispatcher(
    mut ingress: mpsc::Receiver<Arc<Event>>,
    routes: Routes,
    stats: Arc<StatsRecorder>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            event = ingress.recv() => match event {
                Some(event) => route(&routes, &stats, event),
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }

    ingress.close();
    while let Some(event) = ingress.recv().await {
        route(&routes, &stats, event);
    }
    debug!("Dispatcher stopped");
}

fn route(routes: &Routes, stats: &StatsRecorder, event: Arc<Event>) {
    let Some(subs) = routes.get(&event.event_type()) else {
        debug!(event_type = %event.event_type(), "No subscribers for event");
        return;
    };
    for sub in subs {
        match sub.offer(event.clone()) {
            Delivery::Queued => {}
            Delivery::QueueFull | Delivery::Closed => {
                stats.record_delivery_dropped(sub.name());
                warn!(
                    handler = sub.name(),
                    event_id = %event.event_id(),
                    "Handler queue full, delivery dropped"
                );
            }
        }
    }
}
