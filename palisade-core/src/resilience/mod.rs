//! # Resilience Patterns
//!
//! Building blocks for protecting calls to an unreliable dependency.
//!
//! ## Patterns Included
//!
//! - **Circuit Breaker**: Stop calling a failing dependency until it recovers
//! - **Bulkhead**: Bound concurrent executions per named partition
//! - **Retry**: Re-invoke transient failures with immediate or exponential backoff
//! - **Timeout**: Abandon calls that exceed a deadline
//!
//! Each pattern works standalone; [`ResilientExecutor`](crate::ResilientExecutor)
//! composes them around a single operation.
//!
//! ## Quick Start
//!
//! ```rust
//! use palisade_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Circuit breaker that opens after 5 failures
//! let circuit = CircuitBreaker::new(
//!     CircuitBreakerConfig::new("search")
//!         .failure_threshold(5)
//!         .reset_timeout(Duration::from_secs(30)),
//! )?;
//!
//! let result = circuit
//!     .call(|| async { Ok::<_, std::io::Error>(vec!["hit"]) })
//!     .await;
//! assert!(result.is_ok());
//! # Ok(())
//! # }
//! ```

mod bulkhead;
mod circuit_breaker;
mod retry;
mod timeout;

pub use bulkhead::*;
pub use circuit_breaker::*;
pub use retry::*;
pub use timeout::*;
