//! Forwards feed events to live client connections.

use async_trait::async_trait;
use fr_03_fanout::{ConnectionManager, MessageMeta};
use shared_bus::{Event, EventHandler, HandlerError};
use shared_types::MatchId;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Drop repeated identifiers, keeping first-seen order.
pub fn dedup_match_ids(match_ids: &[MatchId]) -> Vec<MatchId> {
    let mut seen = HashSet::with_capacity(match_ids.len());
    match_ids
        .iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

/// Pushes `{type, data, meta}` to every connection whose selector matches.
///
/// Registered once per forwarded event type; a single instance may back
/// several subscriptions.
pub struct LiveNotifier {
    manager: Arc<ConnectionManager>,
    deliveries: AtomicU64,
}

impl LiveNotifier {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            deliveries: AtomicU64::new(0),
        }
    }

    /// Broadcast one event. Returns the number of connections reached.
    pub async fn notify(&self, event: &Event) -> Result<usize, HandlerError> {
        let targets = dedup_match_ids(&event.payload().match_ids());
        let data = message_data(event, &targets)?;
        let delivered = self
            .manager
            .broadcast(
                event.event_type(),
                data,
                &targets,
                MessageMeta::from(event.meta()),
            )
            .await;

        self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
        debug!(
            event_id = %event.event_id(),
            event_type = %event.event_type(),
            targets = targets.len(),
            delivered,
            "Event forwarded to live connections"
        );
        Ok(delivered)
    }

    /// Successful deliveries across all broadcasts.
    pub fn delivered_total(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventHandler for LiveNotifier {
    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError> {
        self.notify(&event).await.map(|_| ())
    }
}

/// Payload fields without the internal `kind` tag, with `match_ids`
/// replaced by the de-duplicated targets.
fn message_data(event: &Event, targets: &[MatchId]) -> Result<serde_json::Value, HandlerError> {
    let mut data = serde_json::to_value(event.payload())
        .map_err(|e| HandlerError::failed(format!("payload encoding: {e}")))?;
    if let Some(fields) = data.as_object_mut() {
        fields.remove("kind");
        if fields.contains_key("match_ids") {
            let ids = serde_json::to_value(targets)
                .map_err(|e| HandlerError::failed(format!("match id encoding: {e}")))?;
            fields.insert("match_ids".to_string(), ids);
        }
    }
    Ok(data)
}
