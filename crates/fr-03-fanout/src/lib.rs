//! # FR-03 Connection Fan-out
//!
//! Pushes bus events to live client sessions.
//!
//! ## Matching
//!
//! A connection receives a broadcast when the event type is in its selector
//! and, if its match allow-list is non-empty, at least one broadcast target
//! is on the list. An empty allow-list matches every target.
//!
//! ## Liveness
//!
//! Failed sends and failed heartbeat probes remove the connection and bump
//! `dropped_connections`; nothing is raised to the broadcaster.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod error;
pub mod manager;
pub mod message;
pub mod selector;
pub mod sink;

pub use config::FanoutConfig;
pub use error::{FanoutError, SinkError};
pub use manager::{ConnectionInfo, ConnectionManager, FanoutStats};
pub use message::{MessageMeta, OutboundMessage};
pub use selector::{FilterOp, Selector};
pub use sink::{ChannelSink, ConnectionSink, SinkFrame};
