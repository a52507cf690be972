//! Rate limiting algorithms
//!
//! This module provides the rate limiting strategies behind the [`RateLimiter`]
//! capability:
//!
//! - **Token Bucket**: Smooth rate limiting with burst capacity
//! - **Sliding Window Log**: Precise rate limiting with individual request tracking
//!
//! The strategy is chosen once, at construction time, through [`Algorithm`].

mod sliding_window;
mod token_bucket;

pub use sliding_window::SlidingWindowLog;
pub use token_bucket::TokenBucket;

use crate::error::{RateLimitError, RateLimitResult};
use std::sync::Arc;
use std::time::Duration;

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitCheckResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Number of remaining requests for the key after this check
    pub remaining: u64,
    /// Maximum number of requests allowed
    pub limit: u64,
    /// Time until the next request could be admitted (denied checks only)
    pub retry_after: Option<Duration>,
}

impl RateLimitCheckResult {
    /// Create a new allowed result
    pub fn allowed(remaining: u64, limit: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            limit,
            retry_after: None,
        }
    }

    /// Create a new denied result
    pub fn denied(limit: u64, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit,
            retry_after: Some(retry_after),
        }
    }
}

/// Admission control capability shared by every strategy.
///
/// Implementations are keyed by a caller-supplied identity (user id, API key,
/// tenant...). A key seen for the first time starts with a full allowance.
/// No method blocks: waiting for capacity is left to the caller.
pub trait RateLimiter: Send + Sync {
    /// Check if a request is allowed, consuming allowance when it is.
    fn check(&self, key: &str) -> RateLimitCheckResult;

    /// Try to admit one request for `key`.
    fn try_acquire(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    /// Admit one request or fail with [`RateLimitError::LimitExceeded`].
    fn acquire(&self, key: &str) -> RateLimitResult<RateLimitCheckResult> {
        let result = self.check(key);
        if result.allowed {
            Ok(result)
        } else {
            Err(RateLimitError::limit_exceeded(
                key,
                result.limit,
                result.retry_after.unwrap_or_default(),
            ))
        }
    }

    /// Get the current remaining allowance for a key without consuming it
    fn remaining(&self, key: &str) -> u64;

    /// Reset the state for a key
    fn reset(&self, key: &str);

    /// Drop state for keys untouched for at least `idle_for`.
    ///
    /// Returns the number of keys removed.
    fn purge_idle(&self, idle_for: Duration) -> usize;

    /// Maximum number of requests admitted in a burst
    fn limit(&self) -> u64;
}

/// Rate limiting algorithm configuration
#[derive(Debug, Clone, PartialEq)]
pub enum Algorithm {
    /// Token bucket algorithm
    ///
    /// Tokens are added at a fixed rate and consumed on each request.
    /// Allows bursts up to the bucket capacity.
    TokenBucket {
        /// Maximum number of tokens (burst capacity)
        capacity: u64,
        /// Tokens added per second
        refill_rate: f64,
    },

    /// Sliding window log algorithm
    ///
    /// Tracks individual request timestamps within a sliding window.
    /// Most accurate but requires more storage.
    SlidingWindowLog {
        /// Maximum requests allowed in the window
        max_requests: u64,
        /// Window duration
        window: Duration,
    },
}

impl Algorithm {
    /// Create a token bucket algorithm with default values (100 capacity, 10/sec refill)
    pub fn token_bucket_default() -> Self {
        Self::TokenBucket {
            capacity: 100,
            refill_rate: 10.0,
        }
    }

    /// Create a sliding window algorithm with default values (100 requests per minute)
    pub fn sliding_window_default() -> Self {
        Self::SlidingWindowLog {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }

    /// Get the effective limit for this algorithm
    pub fn limit(&self) -> u64 {
        match self {
            Algorithm::TokenBucket { capacity, .. } => *capacity,
            Algorithm::SlidingWindowLog { max_requests, .. } => *max_requests,
        }
    }

    /// Get a human-readable description of the algorithm
    pub fn description(&self) -> String {
        match self {
            Algorithm::TokenBucket {
                capacity,
                refill_rate,
            } => format!(
                "Token bucket: {} capacity, {:.2} tokens/sec refill",
                capacity, refill_rate
            ),
            Algorithm::SlidingWindowLog {
                max_requests,
                window,
            } => format!("Sliding window: {} requests per {:?}", max_requests, window),
        }
    }

    /// Validate the parameters without building a limiter
    pub fn validate(&self) -> RateLimitResult<()> {
        match self {
            Algorithm::TokenBucket {
                capacity,
                refill_rate,
            } => token_bucket::validate(*capacity, *refill_rate),
            Algorithm::SlidingWindowLog {
                max_requests,
                window,
            } => sliding_window::validate(*max_requests, *window),
        }
    }

    /// Build the limiter described by this configuration
    pub fn build(&self) -> RateLimitResult<Arc<dyn RateLimiter>> {
        let limiter: Arc<dyn RateLimiter> = match self {
            Algorithm::TokenBucket {
                capacity,
                refill_rate,
            } => Arc::new(TokenBucket::new(*capacity, *refill_rate)?),
            Algorithm::SlidingWindowLog {
                max_requests,
                window,
            } => Arc::new(SlidingWindowLog::new(*max_requests, *window)?),
        };
        Ok(limiter)
    }
}
