//! # End-to-End Pipeline
//!
//! Drives a full `RelayRuntime`:
//!
//! ```text
//! ScriptedTransport ──→ OddsIngestionJob ──→ EventBus ──┬──→ LiveNotifier ──→ ChannelSink
//!                                                       └──→ ProjectionTrigger ──→ InMemoryProjections
//! ```

#[cfg(test)]
mod tests {
    use crate::support::{
        connect, match_ids, next_message, odds_response, wait_until, ScriptedTransport,
    };
    use fr_02_resilient_client::{ClientConfig, ResilientClient};
    use relay_runtime::adapters::{
        InMemoryOddsStore, InMemoryProcessedEvents, InMemoryProjections,
    };
    use relay_runtime::handlers::LiveNotifier;
    use relay_runtime::{AlertLevel, Collaborators, ProviderConfig, RelayRuntime, RuntimeConfig};
    use shared_bus::{Event, EventPayload, EventType};
    use shared_types::CorrelationId;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Pipeline {
        runtime: RelayRuntime,
        projections: Arc<InMemoryProjections>,
        transport: Arc<ScriptedTransport>,
    }

    /// Runtime with one provider polled once an hour, so only the
    /// immediate first run happens during a test.
    fn pipeline(transport: Arc<ScriptedTransport>) -> Pipeline {
        let provider = ProviderConfig {
            rate_per_minute: None,
            poll_interval_secs: 3_600,
            ..ProviderConfig::new("alpha", "https://alpha.example/v1/odds?apiKey=secret")
        };
        let config = RuntimeConfig {
            client: ClientConfig {
                max_retries: 0,
                ..Default::default()
            },
            providers: vec![provider],
            ..Default::default()
        };

        let client =
            ResilientClient::with_transport("alpha", config.client.clone(), transport.clone())
                .unwrap();
        let mut clients = BTreeMap::new();
        clients.insert("alpha".to_string(), Arc::new(client));

        let projections = Arc::new(InMemoryProjections::new());
        let collaborators = Collaborators {
            processed: Arc::new(InMemoryProcessedEvents::default()),
            projections: projections.clone(),
            odds: Arc::new(InMemoryOddsStore::new()),
        };

        Pipeline {
            runtime: RelayRuntime::with_parts(config, clients, collaborators).unwrap(),
            projections,
            transport,
        }
    }

    // =============================================================================
    // PROVIDER → CONNECTIONS
    // =============================================================================

    /// Ingested odds reach exactly the connections whose selectors match,
    /// with duplicate match ids collapsed.
    #[tokio::test]
    async fn test_ingested_odds_reach_matching_connections() {
        let p = pipeline(ScriptedTransport::repeating(odds_response(), 1));
        let fanout = p.runtime.fanout().clone();

        let (_, mut follows_m1) = connect(&fanout, &[EventType::OddsIngested], &["m1"]);
        let (_, mut follows_all) = connect(&fanout, &[EventType::OddsIngested], &[]);
        let (_, mut follows_m3) = connect(&fanout, &[EventType::OddsIngested], &["m3"]);
        let (_, mut scores_only) = connect(&fanout, &[EventType::ScoreUpdated], &[]);

        p.runtime.start().unwrap();

        let first = next_message(&mut follows_m1, WAIT).await.unwrap();
        let second = next_message(&mut follows_all, WAIT).await.unwrap();
        assert_eq!(first.kind, "odds_ingested");
        assert_eq!(first.data["match_ids"], serde_json::json!(["m1", "m2"]));
        assert_eq!(first.data["provider"], "alpha");
        assert_eq!(first.data["inserted"], 3);
        assert_eq!(first.meta.event_id, second.meta.event_id);
        assert_eq!(first.meta.source, "odds-ingestion/alpha");

        let notifier = p.runtime.notifier().clone();
        assert!(wait_until(WAIT, || notifier.delivered_total() == 2).await);
        assert!(next_message(&mut follows_m3, Duration::from_millis(50)).await.is_none());
        assert!(next_message(&mut scores_only, Duration::from_millis(50)).await.is_none());

        p.runtime.shutdown().await;
        assert_eq!(p.transport.calls(), 1);
    }

    /// The projection handler sees the same event and refreshes each match once.
    #[tokio::test]
    async fn test_ingested_odds_refresh_projections() {
        let p = pipeline(ScriptedTransport::repeating(odds_response(), 1));
        p.runtime.start().unwrap();

        let projections = p.projections.clone();
        assert!(wait_until(WAIT, || !projections.calls().is_empty()).await);
        assert_eq!(projections.calls(), vec![match_ids(&["m1", "m2"])]);

        p.runtime.shutdown().await;
        let stats = p.runtime.bus().stats();
        assert_eq!(stats.totals.published, 1);
        // odds-notifier + odds-projection
        assert_eq!(stats.totals.handled, 2);
        assert_eq!(stats.totals.failed, 0);
    }

    // =============================================================================
    // NOTIFIER DE-DUPLICATION
    // =============================================================================

    /// `match_ids=[m1,m1,m2]` is broadcast as `{m1,m2}` and the delivered count
    /// equals the live matching connections at call time.
    #[tokio::test]
    async fn test_duplicate_match_ids_broadcast_once_per_connection() {
        let p = pipeline(ScriptedTransport::new(Vec::new()));
        let fanout = p.runtime.fanout().clone();
        let (_, mut a) = connect(&fanout, &[EventType::OddsIngested], &["m1"]);
        let (_, mut b) = connect(&fanout, &[EventType::OddsIngested], &["m2"]);
        let (_, _c) = connect(&fanout, &[EventType::OddsIngested], &["m9"]);
        let (_, mut d) = connect(&fanout, &[EventType::OddsIngested], &[]);

        let notifier = LiveNotifier::new(fanout.clone());
        let event = Event::new(
            "odds-job",
            CorrelationId::new(),
            EventPayload::OddsIngested {
                provider: "alpha".into(),
                match_ids: match_ids(&["m1", "m1", "m2"]),
                inserted: 2,
                deduplicated: 1,
                markets_updated: 2,
            },
        );

        let delivered = notifier.notify(&event).await.unwrap();
        assert_eq!(delivered, 3);

        for rx in [&mut a, &mut b, &mut d] {
            let message = next_message(rx, WAIT).await.unwrap();
            assert_eq!(message.data["match_ids"], serde_json::json!(["m1", "m2"]));
            // one frame per connection, not one per duplicate id
            assert!(next_message(rx, Duration::from_millis(20)).await.is_none());
        }
        assert_eq!(fanout.stats().messages_sent, 3);
    }

    // =============================================================================
    // UPSTREAM FAILURE
    // =============================================================================

    /// A dead provider opens the breaker, announces it on the bus, and the
    /// monitor reports it.
    #[tokio::test]
    async fn test_failing_provider_surfaces_as_open_circuit() {
        let p = pipeline(ScriptedTransport::new(Vec::new()));
        let fanout = p.runtime.fanout().clone();
        let (_, mut ops) = connect(&fanout, &[EventType::ProviderHealthChanged], &[]);

        let client = p.runtime.client("alpha").unwrap().clone();
        for _ in 0..4 {
            assert!(p.runtime.jobs()[0].run_once().await.is_err());
        }
        assert!(!client.is_open());

        p.runtime.start().unwrap();
        // The spawned job's first run is the fifth consecutive failure.
        assert!(wait_until(WAIT, || client.is_open()).await);

        let message = next_message(&mut ops, WAIT).await.unwrap();
        assert_eq!(message.kind, "provider_health_changed");
        assert_eq!(message.data["circuit_open"], true);
        assert_eq!(message.data["failure_count"], 5);

        let report = p.runtime.monitor().check();
        assert!(report.level >= AlertLevel::Yellow);
        assert_eq!(report.open_circuits, vec!["alpha".to_string()]);

        p.runtime.shutdown().await;
    }

    /// Shutdown stops ingress but keeps statistics readable.
    #[tokio::test]
    async fn test_shutdown_keeps_stats_and_rejects_publishes() {
        let p = pipeline(ScriptedTransport::repeating(odds_response(), 1));
        p.runtime.start().unwrap();
        let projections = p.projections.clone();
        assert!(wait_until(WAIT, || !projections.calls().is_empty()).await);
        p.runtime.shutdown().await;

        let late = Event::new(
            "late",
            CorrelationId::new(),
            EventPayload::MatchSettled {
                match_id: "m1".into(),
                winner: Some("home".into()),
            },
        );
        assert!(!p.runtime.bus().publish(late));

        let stats = p.runtime.bus().stats();
        assert!(!stats.running);
        assert_eq!(stats.rejected_after_stop, 1);
        assert_eq!(stats.totals.published, 1);
        let sources: BTreeSet<&str> = stats.by_source.keys().map(String::as_str).collect();
        assert!(sources.contains("odds-ingestion/alpha"));
    }
}
