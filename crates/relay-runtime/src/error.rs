//! Runtime error types.

use fr_02_resilient_client::ClientError;
use fr_03_fanout::FanoutError;
use shared_bus::BusError;
use shared_types::ConfigError;
use thiserror::Error;

/// Errors raised while building or starting the relay.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to load configuration from {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("event bus: {0}")]
    Bus(#[from] BusError),

    #[error("fan-out: {0}")]
    Fanout(#[from] FanoutError),

    #[error("provider client: {0}")]
    Client(#[from] ClientError),

    #[error("runtime already started")]
    AlreadyStarted,
}

/// Why one ingestion run produced no event.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Transport failure, exhausted retries, or enforcing breaker rejection.
    #[error("provider {provider}: {source}")]
    Client {
        provider: String,
        #[source]
        source: ClientError,
    },

    /// Non-retryable, non-success status such as 401 or 404.
    #[error("provider {provider} answered {status}")]
    Status { provider: String, status: u16 },

    #[error("provider {provider} sent an unreadable payload: {reason}")]
    Parse { provider: String, reason: String },

    #[error("odds store: {0}")]
    Store(String),
}

impl IngestError {
    /// Whether the next scheduled run may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Client { source, .. } => source.is_transient(),
            Self::Status { status, .. } => *status >= 500,
            Self::Parse { .. } => false,
            Self::Store(_) => true,
        }
    }
}
