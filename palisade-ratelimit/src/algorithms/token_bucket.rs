//! Token Bucket Algorithm
//!
//! The token bucket algorithm allows smooth rate limiting with burst capacity.
//! Tokens are added at a constant rate and consumed on each request.
//!
//! ## How It Works
//!
//! 1. A bucket starts full with `capacity` tokens
//! 2. Each request consumes one token
//! 3. Tokens are added at `refill_rate` per second, never beyond `capacity`
//! 4. If no whole token is available, the request is denied
//!
//! ## Example
//!
//! ```rust
//! use palisade_ratelimit::algorithms::{RateLimiter, TokenBucket};
//!
//! let bucket = TokenBucket::new(10, 1.0).unwrap(); // 10 capacity, 1 token/sec refill
//!
//! // First 10 requests succeed (burst)
//! for _ in 0..10 {
//!     assert!(bucket.try_acquire("user1"));
//! }
//!
//! // 11th request fails (bucket empty)
//! assert!(!bucket.try_acquire("user1"));
//! ```

use super::{RateLimitCheckResult, RateLimiter};
use crate::error::{RateLimitError, RateLimitResult};
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

pub(super) fn validate(capacity: u64, refill_rate: f64) -> RateLimitResult<()> {
    if capacity == 0 {
        return Err(RateLimitError::invalid_algorithm(
            "Capacity must be greater than 0",
        ));
    }
    if !refill_rate.is_finite() || refill_rate <= 0.0 {
        return Err(RateLimitError::invalid_algorithm(
            "Refill rate must be a finite number greater than 0",
        ));
    }
    Ok(())
}

/// Token bucket rate limiter state
#[derive(Debug, Clone)]
struct BucketState {
    /// Current number of tokens
    tokens: f64,
    /// Last time tokens were added
    last_refill: Instant,
}

/// Token bucket rate limiter
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens (burst capacity)
    capacity: u64,
    /// Tokens added per second
    refill_rate: f64,
    /// State per key
    buckets: DashMap<String, BucketState>,
}

impl TokenBucket {
    /// Create a new token bucket rate limiter
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum tokens (burst capacity)
    /// * `refill_rate` - Tokens added per second
    ///
    /// # Errors
    ///
    /// Fails if capacity is 0 or refill_rate is not a positive finite number
    pub fn new(capacity: u64, refill_rate: f64) -> RateLimitResult<Self> {
        validate(capacity, refill_rate)?;

        debug!(capacity, refill_rate, "Creating token bucket rate limiter");

        Ok(Self {
            capacity,
            refill_rate,
            buckets: DashMap::new(),
        })
    }

    /// Tokens the bucket would hold at `now`, clamped to capacity
    fn projected_tokens(&self, state: &BucketState, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        (state.tokens + elapsed * self.refill_rate).min(self.capacity as f64)
    }

    /// Refill tokens based on elapsed time
    fn refill(&self, state: &mut BucketState, now: Instant) {
        state.tokens = self.projected_tokens(state, now);
        state.last_refill = now;
    }

    fn full_bucket(&self, now: Instant) -> BucketState {
        BucketState {
            tokens: self.capacity as f64,
            last_refill: now,
        }
    }

    /// Get the capacity
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the refill rate
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Number of keys currently tracked
    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }
}

impl RateLimiter for TokenBucket {
    fn check(&self, key: &str) -> RateLimitCheckResult {
        let now = Instant::now();

        // The entry guard holds the shard lock, so refill and consume are atomic per key.
        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| self.full_bucket(now));

        self.refill(&mut entry, now);

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            trace!(key = %key, tokens = entry.tokens, "Token bucket: request allowed");
            RateLimitCheckResult::allowed(entry.tokens as u64, self.capacity)
        } else {
            // Tiny refill rates put the wait beyond what a Duration can hold
            let retry_after = Duration::try_from_secs_f64((1.0 - entry.tokens) / self.refill_rate)
                .unwrap_or(Duration::MAX);
            debug!(key = %key, retry_after = ?retry_after, "Token bucket: request denied");
            RateLimitCheckResult::denied(self.capacity, retry_after)
        }
    }

    fn remaining(&self, key: &str) -> u64 {
        self.buckets
            .get(key)
            .map(|state| self.projected_tokens(&state, Instant::now()) as u64)
            .unwrap_or(self.capacity)
    }

    fn reset(&self, key: &str) {
        self.buckets
            .insert(key.to_string(), self.full_bucket(Instant::now()));
    }

    fn purge_idle(&self, idle_for: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();

        // A bucket is only dropped once it has refilled completely, so a purged key
        // comes back exactly as it would have been.
        self.buckets.retain(|_, state| {
            let idle = now.saturating_duration_since(state.last_refill) >= idle_for;
            let full = self.projected_tokens(state, now) >= self.capacity as f64;
            !(idle && full)
        });

        let purged = before.saturating_sub(self.buckets.len());
        if purged > 0 {
            debug!(purged, "Token bucket: purged idle keys");
        }
        purged
    }

    fn limit(&self) -> u64 {
        self.capacity
    }
}
