//! # Shared Types Crate
//!
//! Identifiers and error types shared by the bus, the fan-out manager and
//! the ingestion runtime.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: cross-component identifiers live here.
//! - **Opaque Tokens**: ids are compared and displayed, never interpreted.

pub mod errors;
pub mod ids;

pub use errors::ConfigError;
pub use ids::{ConnectionId, CorrelationId, EventId, MatchId};
