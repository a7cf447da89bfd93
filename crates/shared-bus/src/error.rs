//! Bus error types.

use crate::events::EventType;
use shared_types::ConfigError;
use thiserror::Error;

/// Errors from bus registration and lifecycle operations.
///
/// Publishing never returns one of these: overload is counted, not raised.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Subscriptions are static and must be registered before `start()`.
    #[error("bus already started; subscriptions are closed")]
    AlreadyStarted,

    /// A stopped bus cannot be restarted.
    #[error("bus has been stopped")]
    Stopped,

    /// Handler names identify stats and error records, so they must be unique.
    #[error("handler '{0}' is already registered")]
    DuplicateHandler(String),

    #[error("handler '{name}' for {event_type} needs a concurrency of at least 1")]
    InvalidConcurrency { name: String, event_type: EventType },

    #[error("invalid bus configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// `start()` was called outside a tokio runtime.
    #[error("no async runtime available to spawn bus tasks")]
    NoRuntime,
}
