//! # Palisade Core
//!
//! Resilience primitives for calls into an unreliable dependency, and the
//! executor that composes them.
//!
//! ## Features
//!
//! - **Circuit Breaker**: Consecutive-failure breaker with bounded half-open probing
//! - **Bulkhead**: Non-blocking concurrency limits per named partition
//! - **Retry**: Immediate or exponential backoff with jitter and error classification
//! - **Timeout**: Deadlines that abandon in-flight work and release every permit
//! - **Resilient Executor**: Bulkhead → rate limiter → circuit breaker → retry → operation
//! - **Events**: Optional listeners for transitions, rejections and retries
//! - **Settings**: Executors described in TOML or JSON
//!
//! ## Quick Start
//!
//! ```rust
//! use palisade_core::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
//! use palisade_core::ResilientExecutor;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = ResilientExecutor::builder("profile-service")
//!     .circuit_breaker(CircuitBreaker::new(
//!         CircuitBreakerConfig::new("profile-service").failure_threshold(3),
//!     )?)
//!     .retry(RetryPolicy::exponential(3, Duration::from_millis(100)))
//!     .build()?;
//!
//! let profile = executor
//!     .execute("user-7", || async { Ok::<_, std::io::Error>("profile") })
//!     .await?;
//! assert_eq!(profile, "profile");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod executor;
pub mod resilience;
pub mod settings;

pub use error::{ConfigError, ConfigResult, ExecutorError, Layer, Validate};
pub use events::{EventListener, EventListeners, ResilienceEvent, TracingListener};
pub use executor::{ResilientExecutor, ResilientExecutorBuilder};
pub use settings::ExecutorSettings;
