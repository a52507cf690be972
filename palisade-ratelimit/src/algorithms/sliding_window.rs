//! Sliding Window Log Algorithm
//!
//! The sliding window log algorithm provides precise rate limiting by tracking
//! individual request timestamps within a sliding time window.
//!
//! ## How It Works
//!
//! 1. Each admitted request timestamp is logged
//! 2. When checking, timestamps that have aged a full window are evicted from the front
//! 3. If the remaining count is below `max_requests`, the request is allowed and logged
//!
//! A request issued exactly `window` after an admitted one no longer sees it.
//!
//! ## Example
//!
//! ```rust
//! use palisade_ratelimit::algorithms::{RateLimiter, SlidingWindowLog};
//! use std::time::Duration;
//!
//! let limiter = SlidingWindowLog::new(5, Duration::from_secs(60)).unwrap(); // 5 requests per minute
//!
//! // First 5 requests succeed
//! for _ in 0..5 {
//!     assert!(limiter.try_acquire("user1"));
//! }
//!
//! // 6th request fails
//! assert!(!limiter.try_acquire("user1"));
//! ```

use super::{RateLimitCheckResult, RateLimiter};
use crate::error::{RateLimitError, RateLimitResult};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

pub(super) fn validate(max_requests: u64, window: Duration) -> RateLimitResult<()> {
    if max_requests == 0 {
        return Err(RateLimitError::invalid_algorithm(
            "Max requests must be greater than 0",
        ));
    }
    if window.is_zero() {
        return Err(RateLimitError::invalid_algorithm("Window must be non-zero"));
    }
    Ok(())
}

/// Sliding window log rate limiter
#[derive(Debug)]
pub struct SlidingWindowLog {
    /// Maximum requests allowed in the window
    max_requests: u64,
    /// Window duration
    window: Duration,
    /// Request timestamps per key, oldest first
    logs: DashMap<String, VecDeque<Instant>>,
}

impl SlidingWindowLog {
    /// Create a new sliding window log rate limiter
    ///
    /// # Arguments
    ///
    /// * `max_requests` - Maximum requests allowed in the window
    /// * `window` - Window duration
    ///
    /// # Errors
    ///
    /// Fails if max_requests is 0 or window is zero duration
    pub fn new(max_requests: u64, window: Duration) -> RateLimitResult<Self> {
        validate(max_requests, window)?;

        debug!(max_requests, window = ?window, "Creating sliding window rate limiter");

        Ok(Self {
            max_requests,
            window,
            logs: DashMap::new(),
        })
    }

    /// Remove timestamps that have aged out of the window
    fn evict(&self, log: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = log.front() {
            if now.saturating_duration_since(*front) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }
    }

    /// Get the max requests setting
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Get the window duration
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of keys currently tracked
    pub fn key_count(&self) -> usize {
        self.logs.len()
    }
}

impl RateLimiter for SlidingWindowLog {
    fn check(&self, key: &str) -> RateLimitCheckResult {
        let now = Instant::now();

        // Eviction, count and append all happen under the entry's shard lock.
        let mut entry = self.logs.entry(key.to_string()).or_default();
        self.evict(&mut entry, now);

        let current_count = entry.len() as u64;

        if current_count < self.max_requests {
            entry.push_back(now);
            let remaining = self.max_requests - current_count - 1;
            trace!(key = %key, remaining, "Sliding window: request allowed");
            RateLimitCheckResult::allowed(remaining, self.max_requests)
        } else {
            let retry_after = entry
                .front()
                .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(self.window);
            debug!(key = %key, retry_after = ?retry_after, "Sliding window: request denied");
            RateLimitCheckResult::denied(self.max_requests, retry_after)
        }
    }

    fn remaining(&self, key: &str) -> u64 {
        let now = Instant::now();
        let count = self
            .logs
            .get(key)
            .map(|log| {
                log.iter()
                    .filter(|t| now.saturating_duration_since(**t) < self.window)
                    .count() as u64
            })
            .unwrap_or(0);
        self.max_requests.saturating_sub(count)
    }

    fn reset(&self, key: &str) {
        self.logs.remove(key);
    }

    fn purge_idle(&self, idle_for: Duration) -> usize {
        let now = Instant::now();
        let before = self.logs.len();

        self.logs.retain(|_, log| {
            self.evict(log, now);
            match log.back() {
                Some(newest) => now.saturating_duration_since(*newest) < idle_for,
                None => false,
            }
        });

        let purged = before.saturating_sub(self.logs.len());
        if purged > 0 {
            debug!(purged, "Sliding window: purged idle keys");
        }
        purged
    }

    fn limit(&self) -> u64 {
        self.max_requests
    }
}
