// Palisade - resilience primitives for calls into unreliable dependencies
//
// Circuit breaker, token bucket and sliding window rate limiters, bulkhead,
// retry policies, and an executor that composes them around one operation.

// Re-export core functionality
pub use palisade_core::*;

// Rate limiting lives in its own crate
pub use palisade_ratelimit as ratelimit;
pub use palisade_ratelimit::{Algorithm, RateLimitError, RateLimiter, RateLimiterBuilder};

// Cancellation handle accepted by `ResilientExecutor::execute_with_cancellation`
pub use tokio_util::sync::CancellationToken;

#[cfg(feature = "log")]
pub use palisade_log as log;

// Prelude for common imports
/// Common imports for building executors.
///
/// ```rust
/// use palisade::prelude::*;
///
/// # tokio_test::block_on(async {
/// let executor = ResilientExecutor::builder("search")
///     .circuit_breaker(CircuitBreaker::new(CircuitBreakerConfig::new("search"))?)
///     .build()?;
///
/// let hits = executor
///     .execute("tenant-1", || async { Ok::<_, std::io::Error>(3) })
///     .await?;
/// assert_eq!(hits, 3);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # }).unwrap();
/// ```
pub mod prelude {
    pub use crate::resilience::{
        Backoff, Bulkhead, BulkheadConfig, BulkheadPermit, CircuitBreaker, CircuitBreakerConfig,
        CircuitState, RetryPolicy, RetryableErrors,
    };
    pub use crate::{
        Algorithm, CancellationToken, ConfigError, EventListener, EventListeners, ExecutorError,
        ExecutorSettings, Layer, RateLimiter, RateLimiterBuilder, ResilienceEvent,
        ResilientExecutor, TracingListener, Validate,
    };
}
