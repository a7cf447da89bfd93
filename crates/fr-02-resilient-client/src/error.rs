//! Client error types.

use shared_types::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Why a single attempt produced no response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    /// Malformed response, reset stream, TLS failure and similar.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Errors surfaced by the resilient client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid client configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// No attempt produced a response.
    #[error("transport error for {url} after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: TransportFailure,
    },

    /// A retryable status persisted through every retry.
    #[error("transient HTTP {status} from {url}")]
    TransientHttp { status: u16, url: String },

    /// Raised only in enforcing mode.
    #[error("circuit '{name}' is open; next probe in {retry_in:?}")]
    CircuitOpen { name: String, retry_in: Duration },

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl ClientError {
    /// Whether waiting and calling again might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { .. }
                | ClientError::TransientHttp { .. }
                | ClientError::CircuitOpen { .. }
        )
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let transport = ClientError::Transport {
            url: "https://api.example.com/odds".into(),
            attempts: 4,
            source: TransportFailure::Timeout,
        };
        assert!(transport.is_transient());
        assert!(!ClientError::InvalidUrl("x".into()).is_transient());
        assert!(!ClientError::Decode("eof".into()).is_transient());
    }

    #[test]
    fn test_transport_display_names_attempts() {
        let err = ClientError::Transport {
            url: "https://api.example.com/odds".into(),
            attempts: 2,
            source: TransportFailure::Connect("refused".into()),
        };
        assert_eq!(
            err.to_string(),
            "transport error for https://api.example.com/odds after 2 attempt(s): connection failed: refused"
        );
    }
}
