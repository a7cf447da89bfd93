//! # FR-01 Rate Limiter
//!
//! Provider-wide token buckets. All callers that name the same provider key
//! draw from one budget, regardless of which endpoint they hit.
//!
//! ## Algorithm
//!
//! - Capacity equals the configured requests-per-minute.
//! - Tokens accrue continuously at `capacity / 60` per second, capped at capacity.
//! - Refill is computed on each acquire; there is no background timer.
//! - A caller that finds the bucket empty sleeps for the computed wait
//!   outside the lock, then re-checks.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bucket;
pub mod limiter;

pub use bucket::RateBucket;
pub use limiter::TokenBucketLimiter;
