//! # FR-02 Resilient Client
//!
//! HTTP access to unreliable upstream data providers.
//!
//! ## Behaviour
//!
//! - Retryable outcomes (network failure, 429/500/502/503/504) are retried
//!   with exponential backoff, honouring `Retry-After` when present.
//! - Other statuses, including most 4xx, are returned untouched.
//! - A circuit breaker tracks consecutive failed calls. By default it is
//!   advisory: callers read `is_open()` and decide for themselves.
//! - URLs are logged with scheme, host and path only.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod redact;
pub mod retry;
pub mod transport;

pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState, Transition};
pub use client::{RequestOptions, ResilientClient};
pub use config::{BreakerMode, ClientConfig};
pub use error::{ClientError, Result, TransportFailure};
pub use redact::{redact_str, redact_url};
pub use retry::{is_retryable_status, parse_retry_after, RetryPolicy, RETRYABLE_STATUSES};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
