//! Outbound message shape: `{type, data, meta: {event_id, ...}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_bus::EventMeta;
use shared_types::{CorrelationId, EventId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMeta {
    pub event_id: EventId,
    pub correlation_id: CorrelationId,
    pub occurred_at: DateTime<Utc>,
    pub source: String,
}

impl From<&EventMeta> for MessageMeta {
    fn from(meta: &EventMeta) -> Self {
        Self {
            event_id: meta.event_id,
            correlation_id: meta.correlation_id,
            occurred_at: meta.occurred_at,
            source: meta.source.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    pub meta: MessageMeta,
}

impl OutboundMessage {
    pub fn new(kind: impl Into<String>, data: serde_json::Value, meta: MessageMeta) -> Self {
        Self {
            kind: kind.into(),
            data,
            meta,
        }
    }

    /// Wire encoding for text transports.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}
