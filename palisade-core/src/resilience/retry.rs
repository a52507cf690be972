//! Retry pattern with bounded attempts and configurable backoff.
//!
//! Attempts are numbered from 1. [`RetryPolicy::should_retry`] answers whether
//! the attempt that just failed may be followed by another, and
//! [`RetryPolicy::next_delay`] how long to wait before it.
//!
//! ## Example
//!
//! ```rust
//! use palisade_core::resilience::{Backoff, Retry, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let retry = Retry::new(
//!     RetryPolicy::new(3).backoff(
//!         Backoff::exponential(Duration::from_millis(100)).with_jitter(Duration::from_millis(20)),
//!     ),
//! );
//!
//! let result = retry
//!     .call(|| async { Ok::<_, std::io::Error>("fetched") })
//!     .await;
//! assert_eq!(result.unwrap(), "fetched");
//! # }
//! ```

use crate::error::{ConfigError, ConfigResult, Validate, require_positive_u32};
use rand::Rng;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Predicate deciding whether an operation error is transient.
pub type RetryPredicate = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// Delay strategy between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Retry with no delay.
    Immediate,
    /// `min(max, initial * multiplier^(attempt-1))` plus uniform jitter in
    /// `[-jitter, +jitter]`, floored at zero.
    Exponential {
        /// Delay after the first failed attempt.
        initial: Duration,
        /// Growth factor per attempt (typically 2.0).
        multiplier: f64,
        /// Upper bound before jitter.
        max: Duration,
        /// Maximum random perturbation in either direction.
        jitter: Duration,
    },
}

impl Backoff {
    /// Exponential backoff doubling from `initial`, capped at 60 seconds.
    pub fn exponential(initial: Duration) -> Self {
        Self::Exponential {
            initial,
            multiplier: 2.0,
            max: Duration::from_secs(60),
            jitter: Duration::ZERO,
        }
    }

    /// Set the growth factor.
    pub fn with_multiplier(self, multiplier: f64) -> Self {
        match self {
            Self::Exponential {
                initial,
                max,
                jitter,
                ..
            } => Self::Exponential {
                initial,
                multiplier,
                max,
                jitter,
            },
            other => other,
        }
    }

    /// Set maximum delay.
    pub fn with_max(self, max: Duration) -> Self {
        match self {
            Self::Exponential {
                initial,
                multiplier,
                jitter,
                ..
            } => Self::Exponential {
                initial,
                multiplier,
                max,
                jitter,
            },
            other => other,
        }
    }

    /// Set the jitter amplitude.
    pub fn with_jitter(self, jitter: Duration) -> Self {
        match self {
            Self::Exponential {
                initial,
                multiplier,
                max,
                ..
            } => Self::Exponential {
                initial,
                multiplier,
                max,
                jitter,
            },
            other => other,
        }
    }

    /// Delay before the attempt following `attempt`, without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Immediate => Duration::ZERO,
            Self::Exponential {
                initial,
                multiplier,
                max,
                ..
            } => {
                if initial.is_zero() {
                    return Duration::ZERO;
                }
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = initial.as_secs_f64() * multiplier.powi(exponent);
                if secs >= max.as_secs_f64() {
                    return *max;
                }
                Duration::try_from_secs_f64(secs).unwrap_or(*max)
            }
        }
    }

    /// Delay before the attempt following `attempt`, jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        match self {
            Self::Exponential { jitter, .. } if !jitter.is_zero() => {
                let amplitude = jitter.as_secs_f64();
                let offset = rand::rng().random_range(-amplitude..=amplitude);
                Duration::try_from_secs_f64((base.as_secs_f64() + offset).max(0.0))
                    .unwrap_or_else(|_| base.saturating_add(*jitter))
            }
            _ => base,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(100))
    }
}

/// Which operation errors are worth retrying.
#[derive(Clone)]
pub enum RetryableErrors {
    /// Retry every error.
    All,
    /// Never retry (fail immediately).
    Never,
    /// Use custom predicate.
    Custom(RetryPredicate),
}

impl RetryableErrors {
    /// Whether `error` is retryable under this classification.
    pub fn matches(&self, error: &(dyn Error + 'static)) -> bool {
        match self {
            Self::All => true,
            Self::Never => false,
            Self::Custom(predicate) => predicate(error),
        }
    }
}

impl std::fmt::Debug for RetryableErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Never => write!(f, "Never"),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay strategy.
    pub backoff: Backoff,
    /// Classification of retryable errors.
    pub retryable: RetryableErrors,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            retryable: RetryableErrors::All,
        }
    }
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Retry without delay.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts).backoff(Backoff::Immediate)
    }

    /// Exponential backoff starting at `initial`.
    pub fn exponential(max_attempts: u32, initial: Duration) -> Self {
        Self::new(max_attempts).backoff(Backoff::exponential(initial))
    }

    /// A single attempt, for operations that are not safe to repeat.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Immediate,
            retryable: RetryableErrors::Never,
        }
    }

    /// Set the backoff strategy.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set retryable errors.
    pub fn retryable(mut self, retryable: RetryableErrors) -> Self {
        self.retryable = retryable;
        self
    }

    /// Only retry errors accepted by `predicate`.
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.retryable = RetryableErrors::Custom(Arc::new(predicate));
        self
    }

    /// Whether retries are effectively off.
    pub fn is_disabled(&self) -> bool {
        self.max_attempts <= 1
    }

    /// Whether the failed `attempt` (1-based) may be followed by another.
    pub fn should_retry(&self, attempt: u32, error: &(dyn Error + 'static)) -> bool {
        attempt < self.max_attempts && self.retryable.matches(error)
    }

    /// Delay to wait after the failed `attempt` (1-based).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }
}

impl Validate for RetryPolicy {
    fn validate(&self) -> ConfigResult<()> {
        require_positive_u32(self.max_attempts, "max_attempts")?;

        if let Backoff::Exponential {
            initial,
            multiplier,
            max,
            ..
        } = &self.backoff
        {
            if !multiplier.is_finite() || *multiplier < 1.0 {
                return Err(ConfigError::invalid(
                    "multiplier",
                    format!("must be a finite value >= 1.0, got {}", multiplier),
                ));
            }
            if initial > max {
                return Err(ConfigError::invalid(
                    "initial_delay",
                    format!("{:?} exceeds max delay {:?}", initial, max),
                ));
            }
        }
        Ok(())
    }
}

/// Retry error.
#[derive(Debug)]
pub struct RetryError<E> {
    /// Last error encountered.
    pub last_error: E,
    /// Number of attempts made.
    pub attempts: u32,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.last_error)
    }
}

/// Standalone retry loop driven by a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Retry {
    policy: RetryPolicy,
}

impl Retry {
    /// Create a new retry executor.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Get the policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute with retry logic.
    ///
    /// The delay between attempts is a tokio sleep, so dropping the returned
    /// future abandons the loop promptly.
    pub async fn call<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        let mut attempt = 1;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "Retry succeeded");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !self.policy.should_retry(attempt, &e) {
                        if attempt >= self.policy.max_attempts && attempt > 1 {
                            warn!(
                                attempt,
                                max_attempts = self.policy.max_attempts,
                                error = %e,
                                "Final retry attempt failed"
                            );
                        }
                        return Err(RetryError {
                            last_error: e,
                            attempts: attempt,
                        });
                    }

                    let delay = self.policy.next_delay(attempt);
                    debug!(
                        attempt,
                        delay = ?delay,
                        error = %e,
                        "Retry attempt failed, waiting before retry"
                    );

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thiserror::Error;
    use tokio::time::Instant;

    #[derive(Debug, Error, PartialEq)]
    enum FetchError {
        #[error("service unavailable")]
        Unavailable,
        #[error("invalid request")]
        Invalid,
    }

    fn transient_only() -> RetryPolicy {
        RetryPolicy::immediate(5).retry_on(|e| {
            matches!(e.downcast_ref::<FetchError>(), Some(FetchError::Unavailable))
        })
    }

    #[test]
    fn test_should_retry_stops_at_max_attempts() {
        let policy = RetryPolicy::immediate(3);

        assert!(policy.should_retry(1, &FetchError::Unavailable));
        assert!(policy.should_retry(2, &FetchError::Unavailable));
        assert!(!policy.should_retry(3, &FetchError::Unavailable));
    }

    #[test]
    fn test_retryable_classification() {
        let policy = transient_only();
        assert!(policy.should_retry(1, &FetchError::Unavailable));
        assert!(!policy.should_retry(1, &FetchError::Invalid));

        let never = RetryPolicy::immediate(3).retryable(RetryableErrors::Never);
        assert!(!never.should_retry(1, &FetchError::Unavailable));

        let disabled = RetryPolicy::disabled();
        assert!(disabled.is_disabled());
        assert!(!disabled.should_retry(1, &FetchError::Unavailable));
    }

    #[test]
    fn test_immediate_backoff_has_no_delay() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.next_delay(1), Duration::ZERO);
        assert_eq!(policy.next_delay(2), Duration::ZERO);
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::exponential(Duration::from_millis(100)).with_max(Duration::from_millis(500));

        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(backoff.delay_for_attempt(200), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = Backoff::exponential(Duration::from_millis(100))
            .with_max(Duration::from_millis(1000))
            .with_jitter(Duration::from_millis(50));

        for attempt in 1..=6 {
            let base = backoff.base_delay(attempt);
            for _ in 0..50 {
                let delay = backoff.delay_for_attempt(attempt);
                assert!(delay >= base.saturating_sub(Duration::from_millis(50)));
                assert!(delay <= base + Duration::from_millis(50));
                assert!(delay <= Duration::from_millis(1050));
            }
        }
    }

    #[test]
    fn test_jitter_floored_at_zero() {
        let backoff = Backoff::exponential(Duration::from_millis(1))
            .with_max(Duration::from_millis(1))
            .with_jitter(Duration::from_secs(1));

        // Most samples land below zero before flooring
        let zeros = (0..100)
            .map(|_| backoff.delay_for_attempt(1))
            .inspect(|delay| assert!(*delay <= Duration::from_millis(1001)))
            .filter(|delay| delay.is_zero())
            .count();
        assert!(zeros > 0);
    }

    #[test]
    fn test_unbounded_max_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(100)
            .backoff(Backoff::exponential(Duration::from_secs(1)).with_max(Duration::MAX));
        assert!(policy.validate().is_ok());

        // 2^79 seconds is past anything a Duration can represent
        assert_eq!(policy.next_delay(80), Duration::MAX);
        assert_eq!(policy.next_delay(u32::MAX), Duration::MAX);

        let jittered = Backoff::exponential(Duration::from_secs(1))
            .with_max(Duration::MAX)
            .with_jitter(Duration::MAX);
        for attempt in [1, 64, 80] {
            let _ = jittered.delay_for_attempt(attempt);
        }
        assert_eq!(
            Backoff::exponential(Duration::ZERO).base_delay(u32::MAX),
            Duration::ZERO
        );
    }

    #[test]
    fn test_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::new(0).validate().is_err());

        let shrinking = RetryPolicy::new(3)
            .backoff(Backoff::exponential(Duration::from_millis(10)).with_multiplier(0.5));
        assert!(shrinking.validate().is_err());

        let infinite = RetryPolicy::new(3)
            .backoff(Backoff::exponential(Duration::from_millis(10)).with_multiplier(f64::INFINITY));
        assert!(infinite.validate().is_err());

        let inverted = RetryPolicy::new(3).backoff(
            Backoff::exponential(Duration::from_secs(5)).with_max(Duration::from_secs(1)),
        );
        let err = inverted.validate().unwrap_err();
        assert!(err.to_string().contains("initial_delay"));
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_second_try() {
        let attempts = AtomicU32::new(0);
        let retry = Retry::new(RetryPolicy::immediate(3));

        let result = retry
            .call(|| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(FetchError::Unavailable)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let retry = Retry::new(RetryPolicy::immediate(3));

        let result: Result<i32, _> = retry.call(|| async { Err(FetchError::Unavailable) }).await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last_error, FetchError::Unavailable);
        assert_eq!(err.to_string(), "Failed after 3 attempts: service unavailable");
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let attempts = AtomicU32::new(0);
        let retry = Retry::new(transient_only());

        let result: Result<(), _> = retry
            .call(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Invalid) }
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_sleeps_between_attempts() {
        let retry = Retry::new(RetryPolicy::exponential(3, Duration::from_millis(100)));
        let start = Instant::now();

        let result: Result<(), _> = retry.call(|| async { Err(FetchError::Unavailable) }).await;

        assert!(result.is_err());
        // 100ms after attempt 1, 200ms after attempt 2
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(310));
    }
}
