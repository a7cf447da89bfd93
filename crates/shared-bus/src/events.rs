//! # Feed Events
//!
//! Defines every event that flows through the bus. Events are immutable once
//! built: the bus hands out `Arc<Event>` references and never clones payloads.
//!
//! ```text
//! ┌───────────────────────────── Event ─────────────────────────────┐
//! │ meta:    version, event_id, event_type, occurred_at,            │
//! │          correlation_id, source                                 │
//! │ payload: OddsIngested | FixturesIngested | ScoreUpdated | ...   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use crate::EVENT_SCHEMA_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{CorrelationId, EventId, MatchId};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of event type tags used for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    OddsIngested,
    FixturesIngested,
    ScoreUpdated,
    MatchSettled,
    ProviderHealthChanged,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::OddsIngested,
        EventType::FixturesIngested,
        EventType::ScoreUpdated,
        EventType::MatchSettled,
        EventType::ProviderHealthChanged,
    ];

    /// Wire name of the tag, as used in outbound messages and stats keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OddsIngested => "odds_ingested",
            EventType::FixturesIngested => "fixtures_ingested",
            EventType::ScoreUpdated => "score_updated",
            EventType::MatchSettled => "match_settled",
            EventType::ProviderHealthChanged => "provider_health_changed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// Type-specific event fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A provider odds pull finished and was written to storage.
    OddsIngested {
        provider: String,
        /// Matches touched by the pull. May contain repeats.
        match_ids: Vec<MatchId>,
        inserted: u64,
        deduplicated: u64,
        markets_updated: u64,
    },

    /// A fixtures pull created or updated match records.
    FixturesIngested {
        provider: String,
        match_ids: Vec<MatchId>,
        created: u64,
        updated: u64,
    },

    ScoreUpdated {
        match_id: MatchId,
        home_score: u32,
        away_score: u32,
        period: Option<String>,
    },

    MatchSettled {
        match_id: MatchId,
        /// `None` for a draw or a void result.
        winner: Option<String>,
    },

    /// Emitted when a provider's circuit breaker opens or closes.
    ProviderHealthChanged {
        provider: String,
        circuit_open: bool,
        failure_count: u32,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::OddsIngested { .. } => EventType::OddsIngested,
            EventPayload::FixturesIngested { .. } => EventType::FixturesIngested,
            EventPayload::ScoreUpdated { .. } => EventType::ScoreUpdated,
            EventPayload::MatchSettled { .. } => EventType::MatchSettled,
            EventPayload::ProviderHealthChanged { .. } => EventType::ProviderHealthChanged,
        }
    }

    /// Match identifiers this event concerns, in payload order.
    pub fn match_ids(&self) -> Vec<MatchId> {
        match self {
            EventPayload::OddsIngested { match_ids, .. }
            | EventPayload::FixturesIngested { match_ids, .. } => match_ids.clone(),
            EventPayload::ScoreUpdated { match_id, .. }
            | EventPayload::MatchSettled { match_id, .. } => vec![match_id.clone()],
            EventPayload::ProviderHealthChanged { .. } => Vec::new(),
        }
    }
}

/// Envelope metadata carried by every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: u16,
    pub event_id: EventId,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    /// Opaque to the bus; links causally related events.
    pub correlation_id: CorrelationId,
    /// Producer identifier.
    pub source: String,
}

/// An immutable event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    meta: EventMeta,
    payload: EventPayload,
}

impl Event {
    /// Build a new event stamped with a fresh id and the current time.
    pub fn new(
        source: impl Into<String>,
        correlation_id: CorrelationId,
        payload: EventPayload,
    ) -> Self {
        Self {
            meta: EventMeta {
                version: EVENT_SCHEMA_VERSION,
                event_id: EventId::new(),
                event_type: payload.event_type(),
                occurred_at: Utc::now(),
                correlation_id,
                source: source.into(),
            },
            payload,
        }
    }

    /// Build a follow-up event in the same causal chain as `cause`.
    pub fn caused_by(cause: &Event, source: impl Into<String>, payload: EventPayload) -> Self {
        Self::new(source, cause.correlation_id(), payload)
    }

    pub fn meta(&self) -> &EventMeta {
        &self.meta
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn event_id(&self) -> EventId {
        self.meta.event_id
    }

    pub fn event_type(&self) -> EventType {
        self.meta.event_type
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.meta.correlation_id
    }

    pub fn source(&self) -> &str {
        &self.meta.source
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.meta.occurred_at
    }
}
