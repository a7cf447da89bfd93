//! Circuit breaker for one upstream provider.
//!
//! ```text
//!                 failure_count >= threshold
//!   ┌──────────┐ ─────────────────────────▶ ┌──────────┐
//!   │  CLOSED  │                            │   OPEN   │
//!   └──────────┘ ◀───────────────────────── └──────────┘
//!        ▲          probe succeeds                │ now - last_failure
//!        │                                        ▼   > recovery_timeout
//!        │                                  ┌──────────┐
//!        └───────── success ─────────────── │HALF-OPEN │ (computed, not stored)
//!                                           └──────────┘
//! ```
//!
//! Half-open is never stored: it is derived from the time since the last
//! failure. A failed probe refreshes `last_failure` and the breaker stays open.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Read-only view for health checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Time since the last recorded failure.
    pub last_failure_age: Option<Duration>,
    pub total_requests: u64,
    pub total_failures: u64,
}

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure: Option<Instant>,
    is_open: bool,
    total_requests: u64,
    total_failures: u64,
}

/// Outcome of recording a call, reporting whether the breaker flipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Opened,
    Closed,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nominal open flag. Stays true through the half-open window until a
    /// probe succeeds.
    pub fn is_open(&self) -> bool {
        self.state.lock().is_open
    }

    /// Whether a call should be attempted now.
    pub fn can_attempt(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn state(&self) -> CircuitState {
        let state = self.state.lock();
        self.classify(&state, Instant::now())
    }

    fn classify(&self, state: &BreakerState, now: Instant) -> CircuitState {
        if !state.is_open {
            return CircuitState::Closed;
        }
        match state.last_failure {
            Some(at) if now.saturating_duration_since(at) > self.recovery_timeout => {
                CircuitState::HalfOpen
            }
            _ => CircuitState::Open,
        }
    }

    /// Time until a probe will be allowed, zero if one already is.
    pub fn retry_in(&self) -> Duration {
        let state = self.state.lock();
        match (state.is_open, state.last_failure) {
            (true, Some(at)) => self
                .recovery_timeout
                .saturating_sub(Instant::now().saturating_duration_since(at)),
            _ => Duration::ZERO,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    pub fn record_success(&self) -> Transition {
        let mut state = self.state.lock();
        state.total_requests += 1;
        state.failure_count = 0;
        if state.is_open {
            state.is_open = false;
            info!(circuit = %self.name, "Circuit breaker closed after successful probe");
            Transition::Closed
        } else {
            Transition::None
        }
    }

    pub fn record_failure(&self) -> Transition {
        let mut state = self.state.lock();
        state.total_requests += 1;
        state.total_failures += 1;
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure = Some(Instant::now());
        if !state.is_open && state.failure_count >= self.failure_threshold {
            state.is_open = true;
            warn!(
                circuit = %self.name,
                failures = state.failure_count,
                recovery_secs = self.recovery_timeout.as_secs(),
                "Circuit breaker opened"
            );
            Transition::Opened
        } else {
            Transition::None
        }
    }

    /// Operator override: forget all failures and close.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.failure_count = 0;
        state.last_failure = None;
        state.is_open = false;
        info!(circuit = %self.name, "Circuit breaker reset");
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = Instant::now();
        let state = self.state.lock();
        CircuitSnapshot {
            name: self.name.clone(),
            state: self.classify(&state, now),
            failure_count: state.failure_count,
            last_failure_age: state.last_failure.map(|at| now.saturating_duration_since(at)),
            total_requests: state.total_requests,
            total_failures: state.total_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("odds-api", 3, Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let cb = breaker();
        assert_eq!(cb.record_failure(), Transition::None);
        assert_eq!(cb.record_failure(), Transition::None);
        assert!(!cb.is_open());
        assert_eq!(cb.record_failure(), Transition::Opened);
        assert!(cb.is_open());
        assert!(!cb.can_attempt());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_count_while_closed() {
        let cb = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        cb.record_failure();
        assert!(!cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_recovery_timeout() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        // Strictly greater than the timeout is required.
        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.can_attempt());
        assert!(cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cb.record_success(), Transition::Closed);
        assert!(!cb.is_open());
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_restarts_window() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cb.record_failure(), Transition::None);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.retry_in(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_and_reset() {
        let cb = breaker();
        for _ in 0..4 {
            cb.record_failure();
        }
        cb.record_success();
        tokio::time::advance(Duration::from_secs(2)).await;
        let snap = cb.snapshot();
        assert_eq!(snap.total_requests, 5);
        assert_eq!(snap.total_failures, 4);
        assert_eq!(snap.last_failure_age, Some(Duration::from_secs(2)));

        for _ in 0..3 {
            cb.record_failure();
        }
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().last_failure_age, None);
    }
}
