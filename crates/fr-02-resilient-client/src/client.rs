//! The resilient client.
//!
//! One call = up to `1 + max_retries` attempts. The breaker records one
//! outcome per call, not per attempt:
//!
//! - non-retryable status (2xx..4xx except 429): success, returned as-is
//! - retryable status on every attempt: failure, last response returned
//! - transport failure on every attempt: failure, `ClientError::Transport`

use crate::circuit_breaker::{CircuitBreaker, CircuitSnapshot, Transition};
use crate::config::{BreakerMode, ClientConfig};
use crate::error::{ClientError, Result, TransportFailure};
use crate::redact::redact_url;
use crate::retry::{parse_retry_after, RetryPolicy};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Overrides the configured per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP client with retry, backoff and a circuit breaker for one upstream.
pub struct ResilientClient {
    config: ClientConfig,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
    transport: Arc<dyn HttpTransport>,
}

impl ResilientClient {
    /// Build a client backed by `reqwest`.
    pub fn new(name: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(name, config, Arc::new(transport))
    }

    pub fn with_transport(
        name: impl Into<String>,
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            policy: RetryPolicy::from_config(&config),
            breaker: CircuitBreaker::new(name, config.failure_threshold, config.recovery_timeout()),
            config,
            transport,
        })
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    pub fn circuit(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn is_open(&self) -> bool {
        self.breaker.is_open()
    }

    pub fn can_attempt(&self) -> bool {
        self.breaker.can_attempt()
    }

    pub fn circuit_snapshot(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::Get, url, options).await
    }

    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::Post, url, options).await
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        let mut parsed = Url::parse(url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if !options.query.is_empty() {
            parsed.query_pairs_mut().extend_pairs(options.query.iter());
        }
        let redacted = redact_url(&parsed);

        if !self.breaker.can_attempt() {
            match self.config.breaker_mode {
                BreakerMode::Enforcing => {
                    debug!(circuit = %self.name(), url = %redacted, "Circuit open, rejecting request");
                    return Err(ClientError::CircuitOpen {
                        name: self.name().to_string(),
                        retry_in: self.breaker.retry_in(),
                    });
                }
                BreakerMode::Advisory => {
                    warn!(circuit = %self.name(), url = %redacted, "Circuit open, attempting anyway");
                }
            }
        }

        let request = HttpRequest {
            method,
            url: parsed,
            headers: options.headers,
            body: options.body,
        };
        let timeout = options.timeout.unwrap_or_else(|| self.config.timeout());
        let attempts = self.policy.max_retries + 1;

        let mut last_response: Option<HttpResponse> = None;
        let mut last_failure: Option<TransportFailure> = None;

        for attempt in 0..attempts {
            let retry_after = match self.transport.execute(&request, timeout).await {
                Ok(response) if !response.is_retryable() => {
                    debug!(
                        method = method.as_str(),
                        url = %redacted,
                        status = response.status,
                        attempt,
                        "Request completed"
                    );
                    self.on_success();
                    return Ok(response);
                }
                Ok(response) => {
                    let hint = response
                        .header("retry-after")
                        .and_then(|v| parse_retry_after(v, Utc::now()));
                    warn!(
                        method = method.as_str(),
                        url = %redacted,
                        status = response.status,
                        attempt,
                        "Retryable status received"
                    );
                    last_response = Some(response);
                    hint
                }
                Err(failure) => {
                    warn!(
                        method = method.as_str(),
                        url = %redacted,
                        error = %failure,
                        attempt,
                        "Request attempt failed"
                    );
                    last_failure = Some(failure);
                    None
                }
            };

            if attempt + 1 < attempts {
                let delay = self.policy.delay(attempt, retry_after);
                debug!(url = %redacted, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                tokio::time::sleep(delay).await;
            }
        }

        self.on_failure();
        if let Some(response) = last_response {
            return Ok(response);
        }
        Err(ClientError::Transport {
            url: redacted,
            attempts,
            source: last_failure.unwrap_or(TransportFailure::Protocol("no attempt made".into())),
        })
    }

    fn on_success(&self) {
        if self.breaker.record_success() == Transition::Closed {
            info!(circuit = %self.name(), "Upstream recovered");
        }
    }

    fn on_failure(&self) {
        if self.breaker.record_failure() == Transition::Opened {
            warn!(
                circuit = %self.name(),
                failures = self.breaker.failure_count(),
                "Upstream marked unhealthy"
            );
        }
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("name", &self.name())
            .field("config", &self.config)
            .field("circuit", &self.breaker.state())
            .finish()
    }
}
