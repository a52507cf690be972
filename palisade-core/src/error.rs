//! Error types shared across the resilience layer.
//!
//! Rejections raised by the admission layers and the retry loop are carried by
//! [`ExecutorError`]. They are expected under load and never indicate a bug.
//! A malformed configuration is the only fatal error and surfaces as
//! [`ConfigError`] when a component is constructed.

use palisade_ratelimit::RateLimitError;
use std::time::Duration;
use thiserror::Error;

/// Result type for configuration and construction.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Trait for validating configuration before it is used.
pub trait Validate {
    fn validate(&self) -> ConfigResult<()>;
}

pub(crate) fn require_positive_u32(value: u32, field: &'static str) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than 0"));
    }
    Ok(())
}

pub(crate) fn require_non_zero(value: Duration, field: &'static str) -> ConfigResult<()> {
    if value.is_zero() {
        return Err(ConfigError::invalid(field, "must be a non-zero duration"));
    }
    Ok(())
}

/// Which admission layer rejected a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Bulkhead,
    RateLimiter,
    CircuitBreaker,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bulkhead => write!(f, "bulkhead"),
            Self::RateLimiter => write!(f, "rate limiter"),
            Self::CircuitBreaker => write!(f, "circuit breaker"),
        }
    }
}

/// Error returned by [`ResilientExecutor`](crate::ResilientExecutor).
///
/// Each rejection variant names the layer that short-circuited the call. No
/// further attempt was made after a rejection; only a breaker that opens
/// mid-retry carries the failure of an earlier attempt.
#[derive(Debug)]
pub enum ExecutorError<E> {
    /// The bulkhead partition was at capacity.
    BulkheadRejected {
        /// Partition that was full.
        partition: String,
    },
    /// The rate limiter denied the key.
    RateLimitExceeded {
        /// Key that was limited.
        key: String,
        /// Earliest time a retry could be admitted, if known.
        retry_after: Option<Duration>,
    },
    /// The circuit breaker is open or its half-open probe budget is spent.
    CircuitOpen {
        /// Circuit breaker name.
        name: String,
        /// Failure of the previous attempt when the breaker opened mid-retry.
        /// `None` when the call was rejected before its first attempt.
        last_error: Option<E>,
    },
    /// Every permitted attempt failed with a retryable error.
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error returned by the final attempt.
        last_error: E,
    },
    /// The per-call deadline elapsed.
    Timeout(Duration),
    /// The caller cancelled the call.
    Cancelled,
    /// The operation failed and was not retried.
    Operation(E),
}

impl<E> ExecutorError<E> {
    /// Layer that rejected the call, if any.
    pub fn rejected_by(&self) -> Option<Layer> {
        match self {
            Self::BulkheadRejected { .. } => Some(Layer::Bulkhead),
            Self::RateLimitExceeded { .. } => Some(Layer::RateLimiter),
            Self::CircuitOpen { .. } => Some(Layer::CircuitBreaker),
            _ => None,
        }
    }

    /// Whether an admission layer rejected the call without running the operation.
    pub fn is_rejection(&self) -> bool {
        self.rejected_by().is_some()
    }

    /// Whether the call failed because the deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Borrow the operation's own error, if the operation produced one.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(e)
            | Self::RetryExhausted { last_error: e, .. }
            | Self::CircuitOpen {
                last_error: Some(e),
                ..
            } => Some(e),
            _ => None,
        }
    }

    /// Take the operation's own error, if the operation produced one.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(e)
            | Self::RetryExhausted { last_error: e, .. }
            | Self::CircuitOpen {
                last_error: Some(e),
                ..
            } => Some(e),
            _ => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for ExecutorError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BulkheadRejected { partition } => {
                write!(f, "Bulkhead partition '{}' is full", partition)
            }
            Self::RateLimitExceeded { key, retry_after } => match retry_after {
                Some(after) => write!(
                    f,
                    "Rate limit exceeded for key '{}', retry after {:?}",
                    key, after
                ),
                None => write!(f, "Rate limit exceeded for key '{}'", key),
            },
            Self::CircuitOpen {
                name,
                last_error: None,
            } => write!(f, "Circuit breaker '{}' is open", name),
            Self::CircuitOpen {
                name,
                last_error: Some(e),
            } => write!(f, "Circuit breaker '{}' opened after: {}", name, e),
            Self::RetryExhausted {
                attempts,
                last_error,
            } => write!(f, "Failed after {} attempts: {}", attempts, last_error),
            Self::Timeout(d) => write!(f, "Operation timed out after {:?}", d),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::Operation(e) => write!(f, "{}", e),
        }
    }
}

impl<E> std::error::Error for ExecutorError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RetryExhausted { last_error, .. }
            | Self::CircuitOpen {
                last_error: Some(last_error),
                ..
            } => Some(last_error),
            Self::Operation(e) => e.source(),
            _ => None,
        }
    }
}
