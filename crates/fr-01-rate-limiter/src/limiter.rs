//! Provider-keyed limiter.
//!
//! Every call site that names the same provider shares one bucket. The
//! registry lock is held only to look up or create a bucket; each bucket
//! has its own lock, held only for the refill-and-take step. Waiting
//! happens outside both locks, and the caller re-checks on wake.

use crate::bucket::RateBucket;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Token-bucket limiter shared by all callers in the process.
#[derive(Debug, Default)]
pub struct TokenBucketLimiter {
    buckets: Mutex<HashMap<String, Arc<Mutex<RateBucket>>>>,
}

impl TokenBucketLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, provider_key: &str, rate_per_minute: u32) -> Arc<Mutex<RateBucket>> {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get(provider_key) {
            return bucket.clone();
        }
        debug!(provider = provider_key, rate_per_minute, "Creating rate bucket");
        let bucket = Arc::new(Mutex::new(RateBucket::new(rate_per_minute, Instant::now())));
        buckets.insert(provider_key.to_string(), bucket.clone());
        bucket
    }

    /// Wait for and consume one token from `provider_key`'s bucket.
    ///
    /// `None` or zero disables limiting for this call. A rate that differs
    /// from the bucket's current one reconfigures the bucket first.
    /// Returns the total time spent waiting.
    pub async fn acquire(&self, provider_key: &str, rate_per_minute: Option<u32>) -> Duration {
        let Some(rate) = rate_per_minute.filter(|r| *r > 0) else {
            return Duration::ZERO;
        };
        let bucket = self.bucket(provider_key, rate);
        let started = Instant::now();

        loop {
            let wait = {
                let mut b = bucket.lock();
                let now = Instant::now();
                if b.rate_per_minute() != rate {
                    info!(
                        provider = provider_key,
                        old_rate = b.rate_per_minute(),
                        new_rate = rate,
                        "Rate limit reconfigured"
                    );
                    b.reconfigure(rate, now);
                }
                match b.try_take(now) {
                    Ok(()) => break,
                    Err(wait) => wait,
                }
            };
            debug!(
                provider = provider_key,
                wait_ms = wait.as_millis() as u64,
                "Rate limited, waiting for token"
            );
            tokio::time::sleep(wait).await;
        }

        started.elapsed()
    }

    /// Apply a new rate to an existing bucket, or create one at that rate.
    pub fn reconfigure(&self, provider_key: &str, rate_per_minute: u32) {
        if rate_per_minute == 0 {
            debug!(provider = provider_key, "Ignoring non-positive rate");
            return;
        }
        let bucket = self.bucket(provider_key, rate_per_minute);
        let mut b = bucket.lock();
        if b.rate_per_minute() != rate_per_minute {
            info!(
                provider = provider_key,
                old_rate = b.rate_per_minute(),
                new_rate = rate_per_minute,
                "Rate limit reconfigured"
            );
            b.reconfigure(rate_per_minute, Instant::now());
        }
    }

    /// Tokens currently available for a provider, if it has a bucket.
    pub fn available(&self, provider_key: &str) -> Option<f64> {
        let bucket = self.buckets.lock().get(provider_key).cloned()?;
        let tokens = bucket.lock().available(Instant::now());
        Some(tokens)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}
