//! Single token bucket.
//!
//! Refill is computed lazily from the time elapsed since the last update;
//! there is no background timer.

use std::time::Duration;
use tokio::time::Instant;

/// Tolerance for float drift when comparing against one whole token.
const EPSILON: f64 = 1e-9;

/// Per-provider bucket state.
#[derive(Debug, Clone)]
pub struct RateBucket {
    rate_per_minute: u32,
    /// Maximum tokens (equal to the per-minute rate).
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    updated_at: Instant,
}

impl RateBucket {
    /// A cold bucket holds a single token, so the first caller proceeds at
    /// once and the rest are paced at the refill rate.
    pub fn new(rate_per_minute: u32, now: Instant) -> Self {
        let capacity = f64::from(rate_per_minute.max(1));
        Self {
            rate_per_minute: rate_per_minute.max(1),
            capacity,
            tokens: 1.0_f64.min(capacity),
            refill_per_sec: capacity / 60.0,
            updated_at: now,
        }
    }

    pub fn rate_per_minute(&self) -> u32 {
        self.rate_per_minute
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_per_sec(&self) -> f64 {
        self.refill_per_sec
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.updated_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.updated_at = now;
    }

    /// Tokens available at `now`.
    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    /// Apply a new rate. Tokens accrued so far are kept but clamped to the
    /// new capacity.
    pub fn reconfigure(&mut self, rate_per_minute: u32, now: Instant) {
        let rate_per_minute = rate_per_minute.max(1);
        self.refill(now);
        self.rate_per_minute = rate_per_minute;
        self.capacity = f64::from(rate_per_minute);
        self.refill_per_sec = self.capacity / 60.0;
        self.tokens = self.tokens.min(self.capacity);
    }

    /// Take one token, or report how long until one will be available.
    pub fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens + EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }
}
