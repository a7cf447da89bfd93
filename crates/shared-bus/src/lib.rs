//! # Shared Bus - In-Process Event Bus
//!
//! Decouples producers of feed events (ingestion jobs) from consumers
//! (projection updaters, live notifiers).
//!
//! ```text
//! ┌──────────────┐                     ┌──────────────┐
//! │ Ingestion    │    publish()        │ Notifier     │
//! │ job          │ ──────┐             │ handler      │
//! └──────────────┘       │             └──────────────┘
//!                        ▼                     ↑
//!                  ┌──────────────┐            │
//!                  │  Event Bus   │ ───────────┘
//!                  │              │  per-handler queue + workers
//!                  └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Non-blocking publish:** a full ingress queue drops the event and counts it.
//! - **FIFO per handler:** each subscription has its own bounded queue.
//! - **Failure isolation:** handler errors and panics are recorded, never propagated.
//! - **At-most-once:** the bus never redelivers.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod publisher;
pub mod ring;
pub mod stats;
pub mod subscriber;

pub use bus::EventBus;
pub use config::BusConfig;
pub use error::BusError;
pub use events::{Event, EventMeta, EventPayload, EventType, UnknownEventType};
pub use handler::{handler_fn, EventHandler, FnHandler, HandlerError};
pub use publisher::{EventPublisher, RecordingPublisher};
pub use ring::RingBuffer;
pub use stats::{BusStatsSnapshot, Counters, ErrorRecord, HandlerStats, LatencySummary};
pub use subscriber::Subscription;

/// Version stamped on every event envelope.
pub const EVENT_SCHEMA_VERSION: u16 = 1;

/// Default capacity of the shared ingress queue.
pub const DEFAULT_INGRESS_CAPACITY: usize = 10_000;

/// Default capacity of each per-handler queue.
pub const DEFAULT_HANDLER_QUEUE_CAPACITY: usize = 1_000;
