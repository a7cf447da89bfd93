//! Shared fixtures for the integration scenarios.

use async_trait::async_trait;
use fr_02_resilient_client::{HttpRequest, HttpResponse, HttpTransport, TransportFailure};
use fr_03_fanout::{ChannelSink, ConnectionManager, FilterOp, Selector, SinkFrame};
use parking_lot::Mutex;
use shared_bus::EventType;
use shared_types::{ConnectionId, MatchId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Transport that replays a fixed script, then fails with a connect error.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportFailure>>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<HttpResponse, TransportFailure>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    /// The same response forever.
    pub fn repeating(response: HttpResponse, times: usize) -> Arc<Self> {
        Self::new((0..times).map(|_| Ok(response.clone())).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(
        &self,
        _request: &HttpRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or(Err(TransportFailure::Connect("script exhausted".into())))
    }
}

/// Provider payload quoting `m1` twice and `m2` once.
pub fn odds_response() -> HttpResponse {
    HttpResponse::new(200).with_body(
        r#"{"odds": [
            {"match_id": "m1", "market": "1x2", "selection": "home", "price": 1.85},
            {"match_id": "m1", "market": "1x2", "selection": "away", "price": 4.20},
            {"match_id": "m2", "market": "totals", "selection": "over", "price": 1.95}
        ]}"#,
    )
}

pub fn match_ids(raw: &[&str]) -> Vec<MatchId> {
    raw.iter().map(|s| MatchId::new(*s)).collect()
}

/// Register a channel-backed connection with the given selector.
pub fn connect(
    manager: &ConnectionManager,
    event_types: &[EventType],
    allow: &[&str],
) -> (ConnectionId, mpsc::Receiver<SinkFrame>) {
    let (sink, rx) = ChannelSink::new(32);
    let id = manager.connect(Arc::new(sink), None).unwrap();
    manager
        .update_filters(
            id,
            FilterOp::Set,
            Selector::new(event_types.iter().copied(), match_ids(allow)),
        )
        .unwrap();
    (id, rx)
}

/// Poll `condition` until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Next message frame, skipping heartbeat probes.
pub async fn next_message(
    rx: &mut mpsc::Receiver<SinkFrame>,
    limit: Duration,
) -> Option<Arc<fr_03_fanout::OutboundMessage>> {
    tokio::time::timeout(limit, async {
        while let Some(frame) = rx.recv().await {
            if let SinkFrame::Message(message) = frame {
                return Some(message);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}
