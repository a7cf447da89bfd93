//! # Connection Manager
//!
//! Registry of live client sessions. Broadcasts snapshot the matching sinks
//! while walking the registry, then send with no registry lock held; a sink
//! that fails or times out is removed.
//!
//! ```text
//! broadcast(type, data, match_ids)
//!     │
//!     ├── scan registry ──▶ [(id, sink) whose selector matches]
//!     │
//!     └── send all (timeout each) ──▶ ok: delivered += 1
//!                                  └▶ err: remove connection, dropped += 1
//! ```

use crate::config::FanoutConfig;
use crate::error::FanoutError;
use crate::message::{MessageMeta, OutboundMessage};
use crate::selector::{FilterOp, Selector};
use crate::sink::ConnectionSink;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use shared_bus::EventType;
use shared_types::{ConnectionId, MatchId};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// One live client session.
struct Connection {
    user_id: Option<String>,
    selector: Selector,
    sink: Arc<dyn ConnectionSink>,
    connected_at: DateTime<Utc>,
    last_seen: Instant,
}

/// Public view of a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub user_id: Option<String>,
    pub selector: Selector,
    pub connected_at: DateTime<Utc>,
    pub idle_secs: u64,
}

/// Registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutStats {
    pub live: usize,
    pub dropped_connections: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub broadcasts: u64,
}

/// Why a connection was removed without being asked to.
#[derive(Debug, Clone, Copy)]
enum DropReason {
    SendFailed,
    ProbeFailed,
    Idle,
}

pub struct ConnectionManager {
    config: FanoutConfig,
    connections: DashMap<ConnectionId, Connection>,
    /// Reserved slots, including connections mid-insert.
    live: AtomicUsize,
    dropped_connections: AtomicU64,
    messages_sent: AtomicU64,
    send_failures: AtomicU64,
    broadcasts: AtomicU64,
}

impl ConnectionManager {
    pub fn new(config: FanoutConfig) -> Result<Self, FanoutError> {
        config.validate()?;
        Ok(Self {
            config,
            connections: DashMap::new(),
            live: AtomicUsize::new(0),
            dropped_connections: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    /// Register a session. Starts with an empty selector.
    pub fn connect(
        &self,
        sink: Arc<dyn ConnectionSink>,
        user_id: Option<String>,
    ) -> Result<ConnectionId, FanoutError> {
        let max = self.config.max_connections;
        if self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_err()
        {
            warn!(max, "Connection rejected: limit reached");
            return Err(FanoutError::TooManyConnections { max });
        }

        let id = ConnectionId::new();
        self.connections.insert(
            id,
            Connection {
                user_id: user_id.clone(),
                selector: Selector::default(),
                sink,
                connected_at: Utc::now(),
                last_seen: Instant::now(),
            },
        );
        info!(connection_id = %id, user_id = ?user_id, "Connection registered");
        Ok(id)
    }

    pub fn disconnect(&self, connection_id: ConnectionId) -> bool {
        if self.remove(connection_id) {
            info!(connection_id = %connection_id, "Connection closed");
            true
        } else {
            false
        }
    }

    fn remove(&self, connection_id: ConnectionId) -> bool {
        if self.connections.remove(&connection_id).is_some() {
            self.live.fetch_sub(1, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    fn drop_dead(&self, connection_id: ConnectionId, reason: DropReason, error: &str) {
        if self.remove(connection_id) {
            self.dropped_connections.fetch_add(1, Ordering::Relaxed);
            warn!(
                connection_id = %connection_id,
                reason = ?reason,
                error,
                "Dropping dead connection"
            );
        }
    }

    /// Combine `selector` into the connection's stored selector.
    pub fn update_filters(
        &self,
        connection_id: ConnectionId,
        op: FilterOp,
        selector: Selector,
    ) -> Result<Selector, FanoutError> {
        let mut conn = self
            .connections
            .get_mut(&connection_id)
            .ok_or(FanoutError::UnknownConnection(connection_id))?;
        conn.selector.apply(op, selector);
        conn.last_seen = Instant::now();
        debug!(
            connection_id = %connection_id,
            op = ?op,
            event_types = conn.selector.event_types.len(),
            match_ids = conn.selector.match_ids.len(),
            "Filters updated"
        );
        Ok(conn.selector.clone())
    }

    /// Record client activity (pong, message received).
    pub fn touch(&self, connection_id: ConnectionId) -> bool {
        match self.connections.get_mut(&connection_id) {
            Some(mut conn) => {
                conn.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Send `{type, data, meta}` to every live connection whose selector
    /// matches `event_type` and `match_ids`.
    ///
    /// Returns the number of successful deliveries. Failed sends remove the
    /// connection instead of surfacing an error.
    pub async fn broadcast(
        &self,
        event_type: EventType,
        data: serde_json::Value,
        match_ids: &[MatchId],
        meta: MessageMeta,
    ) -> usize {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        let targets: Vec<(ConnectionId, Arc<dyn ConnectionSink>)> = self
            .connections
            .iter()
            .filter(|entry| entry.selector.matches(event_type, match_ids))
            .map(|entry| (*entry.key(), entry.sink.clone()))
            .collect();
        if targets.is_empty() {
            debug!(event_type = %event_type, "Broadcast matched no connections");
            return 0;
        }

        let message = Arc::new(OutboundMessage::new(event_type.as_str(), data, meta));
        let send_timeout = self.config.send_timeout();
        let results = join_all(targets.into_iter().map(|(id, sink)| {
            let message = message.clone();
            async move {
                let outcome = match timeout(send_timeout, sink.send(message)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err("send timed out".to_string()),
                };
                (id, outcome)
            }
        }))
        .await;

        let mut delivered = 0;
        for (id, outcome) in results {
            match outcome {
                Ok(()) => delivered += 1,
                Err(error) => {
                    self.send_failures.fetch_add(1, Ordering::Relaxed);
                    self.drop_dead(id, DropReason::SendFailed, &error);
                }
            }
        }
        self.messages_sent.fetch_add(delivered as u64, Ordering::Relaxed);
        debug!(event_type = %event_type, delivered, "Broadcast complete");
        delivered
    }

    /// Drop connections idle past `idle_timeout`, then probe the rest once.
    /// Returns how many were dropped.
    ///
    /// A successful probe does not count as client activity; only `touch`
    /// and `update_filters` refresh `last_seen`.
    pub async fn sweep(&self) -> usize {
        let mut dropped = 0;
        if let Some(idle_timeout) = self.config.idle_timeout() {
            for id in self.idle_connections(idle_timeout) {
                self.drop_dead(id, DropReason::Idle, "no client activity");
                dropped += 1;
            }
        }

        let probes: Vec<(ConnectionId, Arc<dyn ConnectionSink>)> = self
            .connections
            .iter()
            .map(|entry| (*entry.key(), entry.sink.clone()))
            .collect();
        let window = self.config.heartbeat_window();

        let results = join_all(probes.into_iter().map(|(id, sink)| async move {
            let outcome = match timeout(window, sink.ping()).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("no response within heartbeat window".to_string()),
            };
            (id, outcome)
        }))
        .await;

        for (id, outcome) in results {
            if let Err(error) = outcome {
                self.drop_dead(id, DropReason::ProbeFailed, &error);
                dropped += 1;
            }
        }
        if dropped > 0 {
            info!(dropped, live = self.connection_count(), "Heartbeat sweep dropped connections");
        }
        dropped
    }

    /// Run `sweep` every heartbeat interval until `shutdown` flips.
    pub fn spawn_heartbeat(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.heartbeat_interval());
            // The first tick of an interval fires immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        manager.sweep().await;
                    }
                }
            }
            debug!("Heartbeat task stopped");
        })
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(&connection_id).map(|conn| ConnectionInfo {
            connection_id,
            user_id: conn.user_id.clone(),
            selector: conn.selector.clone(),
            connected_at: conn.connected_at,
            idle_secs: conn.last_seen.elapsed().as_secs(),
        })
    }

    /// Connections idle longer than `threshold`.
    pub fn idle_connections(&self, threshold: Duration) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| entry.last_seen.elapsed() > threshold)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn stats(&self) -> FanoutStats {
        FanoutStats {
            live: self.connection_count(),
            dropped_connections: self.dropped_connections.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::sink::{ChannelSink, SinkFrame};
    use async_trait::async_trait;
    use serde_json::json;
    use shared_types::{CorrelationId, EventId};
    use tokio::sync::mpsc;

    /// Sink whose sends and pings always fail or hang.
    struct BrokenSink {
        hang: bool,
    }

    #[async_trait]
    impl ConnectionSink for BrokenSink {
        async fn send(&self, _message: Arc<OutboundMessage>) -> Result<(), SinkError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Err(SinkError::Closed)
        }

        async fn ping(&self) -> Result<(), SinkError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Err(SinkError::Transport("reset by peer".into()))
        }
    }

    fn meta() -> MessageMeta {
        MessageMeta {
            event_id: EventId::new(),
            correlation_id: CorrelationId::new(),
            occurred_at: Utc::now(),
            source: "test".into(),
        }
    }

    fn ids(raw: &[&str]) -> Vec<MatchId> {
        raw.iter().map(|s| MatchId::from(*s)).collect()
    }

    fn manager(max: usize) -> ConnectionManager {
        ConnectionManager::new(FanoutConfig {
            max_connections: max,
            ..Default::default()
        })
        .unwrap()
    }

    fn subscribed(
        mgr: &ConnectionManager,
        match_ids: &[&str],
    ) -> (ConnectionId, mpsc::Receiver<SinkFrame>) {
        let (sink, rx) = ChannelSink::new(8);
        let id = mgr.connect(Arc::new(sink), None).unwrap();
        mgr.update_filters(
            id,
            FilterOp::Set,
            Selector::new([EventType::OddsIngested], ids(match_ids)),
        )
        .unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn test_connect_enforces_ceiling() {
        let mgr = manager(2);
        let (a, _) = ChannelSink::new(1);
        mgr.connect(Arc::new(a.clone()), Some("u1".into())).unwrap();
        mgr.connect(Arc::new(a.clone()), None).unwrap();
        assert_eq!(
            mgr.connect(Arc::new(a.clone()), None),
            Err(FanoutError::TooManyConnections { max: 2 })
        );
        assert_eq!(mgr.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_frees_slot() {
        let mgr = manager(1);
        let (a, _) = ChannelSink::new(1);
        let id = mgr.connect(Arc::new(a.clone()), None).unwrap();
        assert!(mgr.disconnect(id));
        assert!(!mgr.disconnect(id));
        assert!(mgr.connect(Arc::new(a), None).is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_respects_allow_list() {
        let mgr = manager(10);
        let (_, mut rx) = subscribed(&mgr, &["m1"]);

        assert_eq!(mgr.broadcast(EventType::OddsIngested, json!({}), &ids(&["m1", "m2"]), meta()).await, 1);
        assert!(matches!(rx.try_recv(), Ok(SinkFrame::Message(_))));

        assert_eq!(mgr.broadcast(EventType::OddsIngested, json!({}), &ids(&["m2"]), meta()).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_allow_list_receives_all() {
        let mgr = manager(10);
        let (_, mut rx) = subscribed(&mgr, &[]);
        mgr.broadcast(EventType::OddsIngested, json!({}), &ids(&["m7"]), meta()).await;
        mgr.broadcast(EventType::OddsIngested, json!({}), &ids(&["m8"]), meta()).await;
        assert_eq!(mgr.broadcast(EventType::ScoreUpdated, json!({}), &[], meta()).await, 0);

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn test_failed_send_removes_connection() {
        let mgr = manager(10);
        let (_, _rx) = subscribed(&mgr, &[]);
        let dead = mgr.connect(Arc::new(BrokenSink { hang: false }), None).unwrap();
        mgr.update_filters(dead, FilterOp::Set, Selector::for_types([EventType::OddsIngested]))
            .unwrap();

        let delivered = mgr.broadcast(EventType::OddsIngested, json!({}), &[], meta()).await;
        assert_eq!(delivered, 1);
        let stats = mgr.stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.dropped_connections, 1);
        assert_eq!(stats.send_failures, 1);
        assert!(mgr.connection(dead).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_send_times_out() {
        let mgr = manager(10);
        let stuck = mgr.connect(Arc::new(BrokenSink { hang: true }), None).unwrap();
        mgr.update_filters(stuck, FilterOp::Set, Selector::for_types([EventType::OddsIngested]))
            .unwrap();

        assert_eq!(mgr.broadcast(EventType::OddsIngested, json!({}), &[], meta()).await, 0);
        assert_eq!(mgr.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_unresponsive() {
        let mgr = manager(10);
        let (alive, _rx) = subscribed(&mgr, &[]);
        mgr.connect(Arc::new(BrokenSink { hang: true }), None).unwrap();
        mgr.connect(Arc::new(BrokenSink { hang: false }), None).unwrap();

        assert_eq!(mgr.sweep().await, 2);
        assert_eq!(mgr.connection_count(), 1);
        assert!(mgr.connection(alive).is_some());
        assert_eq!(mgr.stats().dropped_connections, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_task_sweeps_and_stops() {
        let mgr = Arc::new(manager(10));
        mgr.connect(Arc::new(BrokenSink { hang: false }), None).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = mgr.spawn_heartbeat(rx);

        tokio::time::sleep(mgr.config().heartbeat_interval() + Duration::from_secs(1)).await;
        assert_eq!(mgr.connection_count(), 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_update_unknown_connection() {
        let mgr = manager(10);
        let id = ConnectionId::new();
        assert_eq!(
            mgr.update_filters(id, FilterOp::Add, Selector::default()),
            Err(FanoutError::UnknownConnection(id))
        );
        assert!(!mgr.touch(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_resets_idle_time() {
        let mgr = manager(10);
        let (id, _rx) = subscribed(&mgr, &[]);
        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(mgr.idle_connections(Duration::from_secs(60)), vec![id]);
        assert!(mgr.touch(id));
        assert!(mgr.idle_connections(Duration::from_secs(60)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_idle_connections() {
        let mgr = ConnectionManager::new(FanoutConfig {
            idle_timeout_secs: Some(60),
            ..Default::default()
        })
        .unwrap();
        let (quiet, _quiet_rx) = subscribed(&mgr, &[]);
        let (chatty, _chatty_rx) = subscribed(&mgr, &[]);

        tokio::time::advance(Duration::from_secs(40)).await;
        // probes succeed but do not refresh activity
        assert_eq!(mgr.sweep().await, 0);
        assert!(mgr.touch(chatty));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(mgr.sweep().await, 1);
        assert!(mgr.connection(quiet).is_none());
        assert!(mgr.connection(chatty).is_some());
        assert_eq!(mgr.stats().dropped_connections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_idle_connections_without_timeout() {
        let mgr = manager(10);
        let (id, _rx) = subscribed(&mgr, &[]);
        tokio::time::advance(Duration::from_secs(3_600)).await;
        assert_eq!(mgr.sweep().await, 0);
        assert!(mgr.connection(id).is_some());
    }
}
