//! Rate limiter builder

use crate::algorithms::{Algorithm, RateLimiter};
use crate::error::{RateLimitError, RateLimitResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builder for creating a [`RateLimiter`]
#[derive(Debug, Clone, Default)]
pub struct RateLimiterBuilder {
    algorithm: Option<Algorithm>,
}

impl RateLimiterBuilder {
    /// Create a new builder with no algorithm selected
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rate limiting algorithm
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Use token bucket algorithm
    pub fn token_bucket(mut self, capacity: u64, refill_rate: f64) -> Self {
        self.algorithm = Some(Algorithm::TokenBucket {
            capacity,
            refill_rate,
        });
        self
    }

    /// Use sliding window log algorithm
    pub fn sliding_window(mut self, max_requests: u64, window: Duration) -> Self {
        self.algorithm = Some(Algorithm::SlidingWindowLog {
            max_requests,
            window,
        });
        self
    }

    /// Build the rate limiter
    pub fn build(self) -> RateLimitResult<Arc<dyn RateLimiter>> {
        let algorithm = self
            .algorithm
            .ok_or_else(|| RateLimitError::config("Algorithm must be specified"))?;

        debug!(algorithm = %algorithm.description(), "Building rate limiter");

        algorithm.build()
    }
}
