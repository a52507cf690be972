//! # Palisade Rate Limiting
//!
//! Keyed, non-blocking admission control for calls into an unreliable
//! dependency.
//!
//! ## Features
//!
//! - **Two Algorithms**: Token bucket and sliding window log behind one
//!   [`RateLimiter`] capability
//! - **Keyed State**: Per-key state in a sharded `DashMap`, created lazily on
//!   first use and purgeable once idle
//! - **Eager Validation**: Malformed parameters are rejected when the limiter
//!   is built, never while serving traffic
//!
//! ## Quick Start
//!
//! ```rust
//! use palisade_ratelimit::{Algorithm, RateLimiterBuilder};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create a rate limiter with token bucket algorithm
//! let limiter = RateLimiterBuilder::new()
//!     .algorithm(Algorithm::TokenBucket {
//!         capacity: 100,
//!         refill_rate: 10.0,
//!     })
//!     .build()?;
//!
//! // Check if a request is allowed
//! let result = limiter.check("user_123");
//! if result.allowed {
//!     println!("Request allowed, {} remaining", result.remaining);
//! } else {
//!     println!("Rate limited, retry after {:?}", result.retry_after);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Algorithms
//!
//! ### Token Bucket
//!
//! Smooth rate limiting with burst capacity. Tokens are added at a fixed rate
//! and consumed on each request. Best for APIs that allow occasional bursts.
//!
//! ```rust
//! use palisade_ratelimit::Algorithm;
//!
//! let algo = Algorithm::TokenBucket {
//!     capacity: 100,      // Maximum burst size
//!     refill_rate: 10.0,  // Tokens per second
//! };
//! ```
//!
//! ### Sliding Window Log
//!
//! Precise rate limiting that tracks individual request timestamps.
//! Best for strict rate limiting where accuracy is critical.
//!
//! ```rust
//! use palisade_ratelimit::Algorithm;
//! use std::time::Duration;
//!
//! let algo = Algorithm::SlidingWindowLog {
//!     max_requests: 100,
//!     window: Duration::from_secs(60),
//! };
//! ```

pub mod algorithms;
pub mod config;
pub mod error;

pub use algorithms::{Algorithm, RateLimitCheckResult, RateLimiter, SlidingWindowLog, TokenBucket};
pub use config::RateLimiterBuilder;
pub use error::{RateLimitError, RateLimitResult};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token_bucket_basic() {
        let limiter = RateLimiterBuilder::new()
            .algorithm(Algorithm::TokenBucket {
                capacity: 5,
                refill_rate: 1.0,
            })
            .build()
            .unwrap();

        // First 5 requests should be allowed
        for i in 0..5 {
            let result = limiter.check("test_key");
            assert!(result.allowed, "Request {} should be allowed", i);
        }

        // 6th request should be denied
        let result = limiter.check("test_key");
        assert!(!result.allowed, "6th request should be denied");
    }

    #[test]
    fn test_sliding_window_basic() {
        let limiter = RateLimiterBuilder::new()
            .algorithm(Algorithm::SlidingWindowLog {
                max_requests: 3,
                window: Duration::from_secs(60),
            })
            .build()
            .unwrap();

        // First 3 requests should be allowed
        for i in 0..3 {
            let result = limiter.check("test_key");
            assert!(result.allowed, "Request {} should be allowed", i);
        }

        // 4th request should be denied
        let result = limiter.check("test_key");
        assert!(!result.allowed, "4th request should be denied");
    }

    #[test]
    fn test_reset() {
        let limiter = RateLimiterBuilder::new()
            .algorithm(Algorithm::TokenBucket {
                capacity: 1,
                refill_rate: 0.001,
            })
            .build()
            .unwrap();

        // Exhaust the limit
        limiter.check("test_key");
        assert!(!limiter.check("test_key").allowed);

        // Reset and try again
        limiter.reset("test_key");
        assert!(limiter.check("test_key").allowed);
    }
}
