//! # Relay Runtime
//!
//! Owns exactly one instance of each component and hands references to
//! everything that needs it.
//!
//! ## Startup order
//!
//! 1. Subscribe handlers
//! 2. Start the bus
//! 3. Heartbeat sweep
//! 4. Health monitor
//! 5. Ingestion jobs
//!
//! Shutdown runs the same list backwards: producers stop first, the bus
//! drains last.

use crate::adapters::{InMemoryOddsStore, InMemoryProcessedEvents, InMemoryProjections};
use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::handlers::{LiveNotifier, ProjectionTrigger};
use crate::ingestion::OddsIngestionJob;
use crate::monitor::HealthMonitor;
use crate::ports::{OddsStore, ProcessedEvents, ProjectionUpdater};
use fr_01_rate_limiter::TokenBucketLimiter;
use fr_02_resilient_client::ResilientClient;
use fr_03_fanout::ConnectionManager;
use parking_lot::Mutex;
use shared_bus::{EventBus, EventType};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Collaborator adapters the runtime is built with.
#[derive(Clone)]
pub struct Collaborators {
    pub processed: Arc<dyn ProcessedEvents>,
    pub projections: Arc<dyn ProjectionUpdater>,
    pub odds: Arc<dyn OddsStore>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            processed: Arc::new(InMemoryProcessedEvents::default()),
            projections: Arc::new(InMemoryProjections::new()),
            odds: Arc::new(InMemoryOddsStore::new()),
        }
    }
}

/// Background tasks in start order.
#[derive(Default)]
struct Tasks {
    heartbeat: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
    ingestion: Vec<JoinHandle<()>>,
}

pub struct RelayRuntime {
    config: RuntimeConfig,
    bus: EventBus,
    limiter: Arc<TokenBucketLimiter>,
    clients: BTreeMap<String, Arc<ResilientClient>>,
    fanout: Arc<ConnectionManager>,
    monitor: Arc<HealthMonitor>,
    jobs: Vec<Arc<OddsIngestionJob>>,
    collaborators: Collaborators,
    notifier: Arc<LiveNotifier>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Option<Tasks>>,
}

impl RelayRuntime {
    /// Build with in-memory collaborators and `reqwest` provider clients.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let mut clients = BTreeMap::new();
        for provider in config.enabled_providers() {
            let client = ResilientClient::new(provider.name.clone(), config.client.clone())?;
            clients.insert(provider.name.clone(), Arc::new(client));
        }
        Self::with_parts(config, clients, Collaborators::default())
    }

    /// Build with caller-supplied provider clients and collaborators.
    ///
    /// Every enabled provider must have a client under its name.
    pub fn with_parts(
        config: RuntimeConfig,
        clients: BTreeMap<String, Arc<ResilientClient>>,
        collaborators: Collaborators,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let bus = EventBus::new(config.bus.clone())?;
        let limiter = Arc::new(TokenBucketLimiter::new());
        let fanout = Arc::new(ConnectionManager::new(config.fanout.clone())?);

        let mut monitor =
            HealthMonitor::new(config.monitor.clone(), bus.clone()).with_fanout(fanout.clone());
        let mut jobs = Vec::new();
        for provider in config.enabled_providers() {
            let client = clients.get(&provider.name).cloned().ok_or_else(|| {
                shared_types::ConfigError::Inconsistent(format!(
                    "no client for provider '{}'",
                    provider.name
                ))
            })?;
            if let Some(rpm) = provider.rate_per_minute {
                limiter.reconfigure(&provider.name, rpm);
            }
            monitor = monitor.with_client(client.clone());
            jobs.push(Arc::new(OddsIngestionJob::new(
                provider.clone(),
                limiter.clone(),
                client,
                collaborators.odds.clone(),
                Arc::new(bus.clone()),
            )));
        }

        let notifier = Arc::new(LiveNotifier::new(fanout.clone()));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            bus,
            limiter,
            clients,
            fanout,
            monitor: Arc::new(monitor),
            jobs,
            collaborators,
            notifier,
            shutdown_tx,
            tasks: Mutex::new(None),
        })
    }

    fn subscribe_handlers(&self) -> Result<(), RuntimeError> {
        let concurrency = self.config.bus.default_concurrency;

        for (event_type, name) in [
            (EventType::OddsIngested, "odds-notifier"),
            (EventType::ScoreUpdated, "score-notifier"),
            (EventType::MatchSettled, "settlement-notifier"),
            (EventType::ProviderHealthChanged, "provider-health-notifier"),
        ] {
            self.bus
                .subscribe(event_type, self.notifier.clone(), name, concurrency)?;
        }

        let projection = Arc::new(ProjectionTrigger::new(
            self.collaborators.processed.clone(),
            self.collaborators.projections.clone(),
        ));
        for (event_type, name) in [
            (EventType::OddsIngested, "odds-projection"),
            (EventType::FixturesIngested, "fixtures-projection"),
            (EventType::ScoreUpdated, "score-projection"),
            (EventType::MatchSettled, "settlement-projection"),
        ] {
            self.bus
                .subscribe(event_type, projection.clone(), name, concurrency)?;
        }
        Ok(())
    }

    /// Wire subscriptions and start every background task.
    pub fn start(&self) -> Result<(), RuntimeError> {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }

        self.subscribe_handlers()?;
        self.bus.start()?;

        let started = Tasks {
            heartbeat: Some(self.fanout.spawn_heartbeat(self.shutdown_tx.subscribe())),
            monitor: Some(self.monitor.spawn(self.shutdown_tx.subscribe())),
            ingestion: self
                .jobs
                .iter()
                .map(|job| job.spawn(self.shutdown_tx.subscribe()))
                .collect(),
        };
        *tasks = Some(started);

        info!(
            providers = self.jobs.len(),
            subscriptions = self.bus.subscription_count(),
            max_connections = self.config.fanout.max_connections,
            "Relay runtime started"
        );
        Ok(())
    }

    /// Stop producers, then the monitor and heartbeat, then drain the bus.
    pub async fn shutdown(&self) {
        let tasks = self.tasks.lock().take();
        let Some(tasks) = tasks else {
            self.bus.stop().await;
            return;
        };
        info!("Relay runtime shutting down");
        let _ = self.shutdown_tx.send(true);

        for handle in tasks.ingestion {
            if let Err(e) = handle.await {
                warn!(error = %e, "Ingestion task ended abnormally");
            }
        }
        for handle in [tasks.monitor, tasks.heartbeat].into_iter().flatten() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        self.bus.stop().await;

        let stats = self.bus.stats();
        info!(
            published = stats.totals.published,
            handled = stats.totals.handled,
            failed = stats.totals.failed,
            dropped = stats.totals.dropped,
            "Relay runtime stopped"
        );
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn limiter(&self) -> &Arc<TokenBucketLimiter> {
        &self.limiter
    }

    pub fn fanout(&self) -> &Arc<ConnectionManager> {
        &self.fanout
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn notifier(&self) -> &Arc<LiveNotifier> {
        &self.notifier
    }

    pub fn client(&self, provider: &str) -> Option<&Arc<ResilientClient>> {
        self.clients.get(provider)
    }

    pub fn jobs(&self) -> &[Arc<OddsIngestionJob>] {
        &self.jobs
    }
}
