//! Fan-out error types.

use shared_types::{ConfigError, ConnectionId};
use thiserror::Error;

/// Errors from registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FanoutError {
    #[error("connection limit reached ({max})")]
    TooManyConnections { max: usize },

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("invalid fan-out configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Why a single send or probe failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The remote side is gone.
    #[error("connection closed")]
    Closed,

    #[error("send timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}
