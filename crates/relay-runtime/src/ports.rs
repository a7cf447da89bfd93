//! Outbound (driven) ports.
//!
//! Durable state lives with the surrounding application. The relay reaches
//! it only through these traits; `adapters::memory` provides in-process
//! implementations for tests and single-node deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{EventId, MatchId};
use thiserror::Error;

/// A collaborator call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PortError(pub String);

/// Idempotency ledger: which events a consumer has already applied.
///
/// Keyed by consumer so two handlers can process the same event
/// independently.
#[async_trait]
pub trait ProcessedEvents: Send + Sync {
    async fn is_processed(&self, consumer: &str, event_id: EventId) -> Result<bool, PortError>;

    async fn mark_processed(&self, consumer: &str, event_id: EventId) -> Result<(), PortError>;
}

/// Rebuilds read-side aggregates for the given matches.
#[async_trait]
pub trait ProjectionUpdater: Send + Sync {
    async fn refresh_matches(&self, match_ids: &[MatchId]) -> Result<(), PortError>;
}

/// One price line as served by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRecord {
    pub match_id: MatchId,
    pub market: String,
    pub selection: String,
    pub price: f64,
}

/// Result of writing one batch of provider records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    /// Price lines not seen before
    pub inserted: u64,
    /// Lines identical to the stored price
    pub deduplicated: u64,
    /// Distinct (match, market) pairs with at least one new or changed price
    pub markets_updated: u64,
}

/// Storage for ingested odds.
#[async_trait]
pub trait OddsStore: Send + Sync {
    async fn upsert(&self, provider: &str, records: &[OddsRecord])
        -> Result<UpsertOutcome, PortError>;
}
