//! # Bus Handlers
//!
//! Thin subscribers bridging bus events to collaborators.
//!
//! ```text
//! OddsIngested ──┬──→ LiveNotifier ──→ ConnectionManager::broadcast
//! ScoreUpdated ──┤
//! MatchSettled ──┘
//!
//! OddsIngested ─────┬──→ ProjectionTrigger ──→ ProcessedEvents (idempotency)
//! FixturesIngested ─┤                       └─→ ProjectionUpdater::refresh_matches
//! ScoreUpdated ─────┘
//! ```
//!
//! Neither handler retries. A failed refresh is reported to the bus and
//! recovered by the next event for the same match, which re-derives the
//! projection from stored state.

pub mod notifier;
pub mod projection;

pub use notifier::{dedup_match_ids, LiveNotifier};
pub use projection::ProjectionTrigger;
