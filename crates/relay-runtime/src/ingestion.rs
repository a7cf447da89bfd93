//! # Odds Ingestion
//!
//! One job per provider:
//!
//! ```text
//! acquire token ──→ resilient GET ──→ parse ──→ OddsStore::upsert ──→ publish OddsIngested
//!                         │
//!                         └──→ breaker flipped? ──→ publish ProviderHealthChanged
//! ```
//!
//! Every event of one run shares a correlation id.

use crate::config::ProviderConfig;
use crate::error::IngestError;
use crate::ports::{OddsRecord, OddsStore, UpsertOutcome};
use feed_telemetry::{log_provider_event, record_circuit, INGEST_RUNS, RATE_LIMIT_WAIT};
use fr_01_rate_limiter::TokenBucketLimiter;
use fr_02_resilient_client::{RequestOptions, ResilientClient};
use serde::Deserialize;
use shared_bus::{Event, EventPayload, EventPublisher};
use shared_types::CorrelationId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Provider response body.
#[derive(Debug, Deserialize)]
struct OddsResponse {
    odds: Vec<OddsRecord>,
}

/// What one successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub correlation_id: CorrelationId,
    pub records: usize,
    pub outcome: UpsertOutcome,
    /// Time spent waiting on the provider's rate budget
    pub waited: Duration,
    /// Whether an `OddsIngested` event was accepted by the bus
    pub published: bool,
}

pub struct OddsIngestionJob {
    provider: ProviderConfig,
    source: String,
    limiter: Arc<TokenBucketLimiter>,
    client: Arc<ResilientClient>,
    store: Arc<dyn OddsStore>,
    publisher: Arc<dyn EventPublisher>,
    circuit_open: AtomicBool,
}

impl OddsIngestionJob {
    pub fn new(
        provider: ProviderConfig,
        limiter: Arc<TokenBucketLimiter>,
        client: Arc<ResilientClient>,
        store: Arc<dyn OddsStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let circuit_open = AtomicBool::new(client.is_open());
        Self {
            source: format!("odds-ingestion/{}", provider.name),
            provider,
            limiter,
            client,
            store,
            publisher,
            circuit_open,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider.name
    }

    /// Fetch, store and announce one batch of odds.
    pub async fn run_once(&self) -> Result<IngestReport, IngestError> {
        let correlation_id = CorrelationId::new();
        let result = self.ingest(correlation_id).await;
        self.report_circuit(correlation_id);

        let label = if result.is_ok() { "ok" } else { "error" };
        INGEST_RUNS
            .with_label_values(&[self.provider.name.as_str(), label])
            .inc();
        result
    }

    async fn ingest(&self, correlation_id: CorrelationId) -> Result<IngestReport, IngestError> {
        let name = self.provider.name.as_str();
        let waited = self.limiter.acquire(name, self.provider.rate_per_minute).await;
        RATE_LIMIT_WAIT
            .with_label_values(&[name])
            .observe(waited.as_secs_f64());

        let mut options = RequestOptions::default();
        if let (Some(header), Some(key)) = (&self.provider.api_key_header, &self.provider.api_key) {
            options = options.header(header.clone(), key.clone());
        }

        let client_error = |source| IngestError::Client {
            provider: name.to_string(),
            source,
        };
        let response = self
            .client
            .get(&self.provider.odds_url, options)
            .await
            .and_then(|r| r.error_for_retryable(&self.provider.odds_url))
            .map_err(client_error)?;
        if !response.is_success() {
            return Err(IngestError::Status {
                provider: name.to_string(),
                status: response.status,
            });
        }

        let body: OddsResponse = response.json().map_err(|e| IngestError::Parse {
            provider: name.to_string(),
            reason: e.to_string(),
        })?;
        let outcome = self
            .store
            .upsert(name, &body.odds)
            .await
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let published = if body.odds.is_empty() {
            log_provider_event!(debug, name, "Provider returned no odds");
            false
        } else {
            let event = Event::new(
                self.source.clone(),
                correlation_id,
                EventPayload::OddsIngested {
                    provider: name.to_string(),
                    match_ids: body.odds.iter().map(|r| r.match_id.clone()).collect(),
                    inserted: outcome.inserted,
                    deduplicated: outcome.deduplicated,
                    markets_updated: outcome.markets_updated,
                },
            );
            let accepted = self.publisher.publish(event);
            if !accepted {
                log_provider_event!(warn, name, "OddsIngested event dropped by the bus");
            }
            accepted
        };

        info!(
            provider = %name,
            records = body.odds.len(),
            inserted = outcome.inserted,
            deduplicated = outcome.deduplicated,
            markets_updated = outcome.markets_updated,
            waited_ms = waited.as_millis() as u64,
            "Odds ingested"
        );
        Ok(IngestReport {
            correlation_id,
            records: body.odds.len(),
            outcome,
            waited,
            published,
        })
    }

    /// Publish `ProviderHealthChanged` when the breaker opened or closed
    /// since the previous run.
    fn report_circuit(&self, correlation_id: CorrelationId) {
        let open = self.client.is_open();
        let failure_count = self.client.circuit().failure_count();
        record_circuit(&self.provider.name, open, failure_count);

        if self.circuit_open.swap(open, Ordering::AcqRel) == open {
            return;
        }
        if open {
            log_provider_event!(
                warn,
                self.provider.name,
                "Provider marked unhealthy",
                failure_count
            );
        } else {
            log_provider_event!(info, self.provider.name, "Provider recovered");
        }
        self.publisher.publish(Event::new(
            self.source.clone(),
            correlation_id,
            EventPayload::ProviderHealthChanged {
                provider: self.provider.name.clone(),
                circuit_open: open,
                failure_count,
            },
        ));
    }

    /// Run every poll interval until `shutdown` flips. The first run is
    /// immediate.
    pub fn spawn(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let job = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(job.provider.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = job.run_once().await {
                            log_provider_event!(
                                warn,
                                job.provider.name,
                                "Ingestion run failed",
                                transient = e.is_transient(),
                                error = %e
                            );
                        }
                    }
                }
            }
            log_provider_event!(debug, job.provider.name, "Ingestion task stopped");
        })
    }
}
