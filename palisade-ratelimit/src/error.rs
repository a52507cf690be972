//! Error types for rate limiting

use std::time::Duration;
use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Rate limiting errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Rate limit exceeded
    #[error("Rate limit exceeded for key '{key}'. Retry after {retry_after:?}")]
    LimitExceeded {
        /// Key that was limited
        key: String,
        /// Total limit
        limit: u64,
        /// Time to wait before retrying
        retry_after: Duration,
    },

    /// Configuration error
    #[error("Rate limit configuration error: {0}")]
    ConfigError(String),

    /// Invalid algorithm configuration
    #[error("Invalid algorithm configuration: {0}")]
    InvalidAlgorithm(String),
}

impl RateLimitError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a new invalid algorithm error
    pub fn invalid_algorithm<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAlgorithm(msg.into())
    }

    /// Create a limit exceeded error
    pub fn limit_exceeded(key: impl Into<String>, limit: u64, retry_after: Duration) -> Self {
        Self::LimitExceeded {
            key: key.into(),
            limit,
            retry_after,
        }
    }

    /// Check if this error is a rate limit exceeded error
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// Get the retry-after duration if this is a limit exceeded error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::LimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
