//! Triggers read-side projection rebuilds for ingested matches.

use crate::handlers::notifier::dedup_match_ids;
use crate::ports::{ProcessedEvents, ProjectionUpdater};
use async_trait::async_trait;
use shared_bus::{Event, EventHandler, HandlerError};
use std::sync::Arc;
use tracing::{debug, info};

/// Ledger key for this consumer.
pub const PROJECTION_CONSUMER: &str = "projection-trigger";

/// Idempotent projection refresh.
///
/// An event is applied at most once per ledger entry. The ledger is written
/// only after a successful refresh, so a failed refresh is retried by any
/// later redelivery of the same event id.
pub struct ProjectionTrigger {
    processed: Arc<dyn ProcessedEvents>,
    updater: Arc<dyn ProjectionUpdater>,
}

impl ProjectionTrigger {
    pub fn new(processed: Arc<dyn ProcessedEvents>, updater: Arc<dyn ProjectionUpdater>) -> Self {
        Self { processed, updater }
    }
}

#[async_trait]
impl EventHandler for ProjectionTrigger {
    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError> {
        let event_id = event.event_id();
        let already = self
            .processed
            .is_processed(PROJECTION_CONSUMER, event_id)
            .await
            .map_err(|e| HandlerError::Unavailable(e.to_string()))?;
        if already {
            debug!(event_id = %event_id, "Event already projected, skipping");
            return Ok(());
        }

        let match_ids = dedup_match_ids(&event.payload().match_ids());
        if !match_ids.is_empty() {
            self.updater
                .refresh_matches(&match_ids)
                .await
                .map_err(|e| HandlerError::failed(format!("projection refresh: {e}")))?;
            info!(
                event_id = %event_id,
                event_type = %event.event_type(),
                matches = match_ids.len(),
                "Projections refreshed"
            );
        }

        self.processed
            .mark_processed(PROJECTION_CONSUMER, event_id)
            .await
            .map_err(|e| HandlerError::Unavailable(e.to_string()))
    }
}
