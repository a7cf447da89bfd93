//! # Component Flows
//!
//! Pairwise wiring checks, one seam per section:
//!
//! - bus → handlers: failure isolation and the error ring
//! - fan-out: dead connections leave the registry
//! - limiter → ingestion: one budget per provider key
//! - breaker → ingestion: enforcing mode short-circuits
//! - bus → monitor: failures grade the health level

#[cfg(test)]
mod tests {
    use crate::support::{connect, match_ids, next_message, odds_response, ScriptedTransport};
    use fr_01_rate_limiter::TokenBucketLimiter;
    use fr_02_resilient_client::{BreakerMode, ClientConfig, ClientError, ResilientClient};
    use fr_03_fanout::{ConnectionManager, FanoutConfig, MessageMeta};
    use relay_runtime::adapters::InMemoryOddsStore;
    use relay_runtime::handlers::LiveNotifier;
    use relay_runtime::{
        AlertLevel, HealthMonitor, IngestError, MonitorConfig, OddsIngestionJob, ProviderConfig,
    };
    use shared_bus::{
        handler_fn, BusConfig, Event, EventBus, EventPayload, EventType, HandlerError,
        RecordingPublisher,
    };
    use shared_types::CorrelationId;
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn odds_event(ids: &[&str]) -> Event {
        Event::new(
            "odds-ingestion/alpha",
            CorrelationId::new(),
            EventPayload::OddsIngested {
                provider: "alpha".into(),
                match_ids: match_ids(ids),
                inserted: 1,
                deduplicated: 0,
                markets_updated: 1,
            },
        )
    }

    fn failing_audit() -> impl shared_bus::EventHandler {
        handler_fn(|_event| async { Err::<(), _>(HandlerError::failed("audit store down")) })
    }

    fn job(
        provider: ProviderConfig,
        limiter: Arc<TokenBucketLimiter>,
        client: Arc<ResilientClient>,
    ) -> OddsIngestionJob {
        OddsIngestionJob::new(
            provider,
            limiter,
            client,
            Arc::new(InMemoryOddsStore::new()),
            Arc::new(RecordingPublisher::new()),
        )
    }

    // =============================================================================
    // BUS → HANDLERS
    // =============================================================================

    /// A failing handler on the same event type does not stop the notifier.
    #[tokio::test]
    async fn test_failing_handler_does_not_block_notifier() {
        let fanout = Arc::new(ConnectionManager::new(FanoutConfig::default()).unwrap());
        let (_, mut rx) = connect(&fanout, &[EventType::OddsIngested], &["m1"]);

        let bus = EventBus::new(BusConfig::default()).unwrap();
        bus.subscribe(EventType::OddsIngested, failing_audit(), "audit", 1)
            .unwrap();
        bus.subscribe(
            EventType::OddsIngested,
            Arc::new(LiveNotifier::new(fanout.clone())),
            "odds-notifier",
            2,
        )
        .unwrap();
        bus.start().unwrap();

        assert!(bus.publish(odds_event(&["m1"])));
        let message = next_message(&mut rx, WAIT).await.unwrap();
        assert_eq!(message.kind, "odds_ingested");

        bus.stop().await;
        let stats = bus.stats();
        assert_eq!(stats.totals.published, 1);
        assert_eq!(stats.totals.handled, 1);
        assert_eq!(stats.totals.failed, 1);
        assert_eq!(stats.handler("audit").unwrap().counters.failed, 1);
        assert_eq!(stats.handler("odds-notifier").unwrap().counters.handled, 1);

        assert_eq!(stats.recent_errors.len(), 1);
        let record = &stats.recent_errors[0];
        assert_eq!(record.handler, "audit");
        assert_eq!(record.event_type, EventType::OddsIngested);
        assert!(record.error.contains("audit store down"));
    }

    // =============================================================================
    // FAN-OUT
    // =============================================================================

    /// A connection whose receiver went away is removed on the next broadcast.
    #[tokio::test]
    async fn test_dead_connection_is_dropped_on_broadcast() {
        let fanout = ConnectionManager::new(FanoutConfig::default()).unwrap();
        let (_, mut live) = connect(&fanout, &[EventType::ScoreUpdated], &[]);
        let (dead_id, dead_rx) = connect(&fanout, &[EventType::ScoreUpdated], &[]);
        drop(dead_rx);

        let event = Event::new(
            "scores",
            CorrelationId::new(),
            EventPayload::ScoreUpdated {
                match_id: "m1".into(),
                home_score: 2,
                away_score: 1,
                period: None,
            },
        );
        let delivered = fanout
            .broadcast(
                EventType::ScoreUpdated,
                serde_json::json!({"match_id": "m1", "home_score": 2}),
                &match_ids(&["m1"]),
                MessageMeta::from(event.meta()),
            )
            .await;

        assert_eq!(delivered, 1);
        assert!(next_message(&mut live, WAIT).await.is_some());
        assert_eq!(fanout.connection_count(), 1);
        assert!(fanout.connection(dead_id).is_none());

        let stats = fanout.stats();
        assert_eq!(stats.dropped_connections, 1);
        assert_eq!(stats.send_failures, 1);
        assert_eq!(stats.messages_sent, 1);
    }

    // =============================================================================
    // LIMITER → INGESTION
    // =============================================================================

    /// Two jobs polling the same provider key draw from one bucket.
    #[tokio::test(start_paused = true)]
    async fn test_jobs_share_provider_budget() {
        let limiter = Arc::new(TokenBucketLimiter::new());
        let client = Arc::new(
            ResilientClient::with_transport(
                "alpha",
                ClientConfig::default(),
                ScriptedTransport::repeating(odds_response(), 3),
            )
            .unwrap(),
        );
        let provider = ProviderConfig {
            rate_per_minute: Some(60),
            ..ProviderConfig::new("alpha", "https://alpha.example/v1/odds")
        };
        let first = job(provider.clone(), limiter.clone(), client.clone());
        let second = job(provider, limiter.clone(), client);

        let started = tokio::time::Instant::now();
        let a = first.run_once().await.unwrap();
        let b = second.run_once().await.unwrap();
        let c = first.run_once().await.unwrap();

        // cold bucket holds one token, then one per second
        assert_eq!(a.waited, Duration::ZERO);
        assert!(b.waited >= Duration::from_millis(900));
        assert!(c.waited >= Duration::from_millis(900));
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(limiter.bucket_count(), 1);
    }

    // =============================================================================
    // BREAKER → INGESTION
    // =============================================================================

    /// In enforcing mode an open breaker fails the run without a network call.
    #[tokio::test]
    async fn test_enforcing_breaker_skips_transport() {
        let transport = ScriptedTransport::new(Vec::new());
        let client = Arc::new(
            ResilientClient::with_transport(
                "alpha",
                ClientConfig {
                    max_retries: 0,
                    failure_threshold: 1,
                    breaker_mode: BreakerMode::Enforcing,
                    ..Default::default()
                },
                transport.clone(),
            )
            .unwrap(),
        );
        let provider = ProviderConfig {
            rate_per_minute: None,
            ..ProviderConfig::new("alpha", "https://alpha.example/v1/odds")
        };
        let job = job(provider, Arc::new(TokenBucketLimiter::new()), client.clone());

        assert!(job.run_once().await.is_err());
        assert!(client.is_open());

        let err = job.run_once().await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Client {
                source: ClientError::CircuitOpen { .. },
                ..
            }
        ));
        assert!(err.is_transient());
        assert_eq!(transport.calls(), 1);
    }

    // =============================================================================
    // BUS → MONITOR
    // =============================================================================

    /// Every handler invocation failing puts the monitor at red.
    #[tokio::test]
    async fn test_handler_failures_turn_monitor_red() {
        let bus = EventBus::new(BusConfig::default()).unwrap();
        bus.subscribe(EventType::OddsIngested, failing_audit(), "audit", 1)
            .unwrap();
        bus.start().unwrap();
        for _ in 0..5 {
            assert!(bus.publish(odds_event(&["m1"])));
        }
        bus.stop().await;

        let monitor = HealthMonitor::new(MonitorConfig::default(), bus.clone());
        let report = monitor.check();
        assert_eq!(report.level, AlertLevel::Red);
        assert!((report.failure_rate - 1.0).abs() < f64::EPSILON);
        assert!(report.reasons.iter().any(|r| r.starts_with("failure rate")));
        assert_eq!(monitor.history().len(), 1);
    }
}
