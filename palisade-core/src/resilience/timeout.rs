//! Deadlines for async operations.
//!
//! A [`Timeout`] races an operation against the tokio timer. If the timer
//! fires first the operation's future is dropped, so whatever it was awaiting
//! is abandoned and the permits it held (a bulkhead slot, a half-open probe)
//! are handed back by their destructors.
//!
//! [`ResilientExecutor`](crate::ResilientExecutor) wraps each call in one of
//! these, retry delays included.
//!
//! ## Example
//!
//! ```rust
//! use palisade_core::resilience::{Timeout, TimeoutError};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let deadline = Timeout::new("thumbnailer", Duration::from_millis(20));
//!
//! let result = deadline
//!     .call(|| async {
//!         tokio::time::sleep(Duration::from_secs(5)).await;
//!         Ok::<_, std::io::Error>("resized")
//!     })
//!     .await;
//! assert!(matches!(result, Err(TimeoutError::Timeout(_))));
//! # });
//! ```

use crate::error::{ConfigResult, Validate, require_non_zero};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of an operation run under a [`Timeout`] that did not succeed.
#[derive(Debug)]
pub enum TimeoutError<E> {
    /// The deadline elapsed; carries the configured duration.
    Timeout(Duration),
    /// The operation finished in time but failed.
    Execution(E),
}

impl<E> TimeoutError<E> {
    /// Whether the deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The operation's own error, if it got far enough to return one.
    pub fn into_execution(self) -> Option<E> {
        match self {
            Self::Execution(e) => Some(e),
            Self::Timeout(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(d) => write!(f, "Deadline of {:?} elapsed", d),
            Self::Execution(e) => e.fmt(f),
        }
    }
}

impl<E: Error + 'static> Error for TimeoutError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Execution(e) => Some(e),
            Self::Timeout(_) => None,
        }
    }
}

/// A named deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeout {
    name: String,
    duration: Duration,
}

impl Timeout {
    /// Deadline of `duration`, reported under `name` in logs.
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }

    /// Anonymous deadline.
    pub fn with_duration(duration: Duration) -> Self {
        Self::new("anonymous", duration)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run `f`, giving up once the deadline elapses.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, TimeoutError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        match tokio::time::timeout(self.duration, f()).await {
            Ok(outcome) => outcome.map_err(TimeoutError::Execution),
            Err(_) => {
                debug!(
                    name = %self.name,
                    deadline = ?self.duration,
                    waited = ?started.elapsed(),
                    "Deadline elapsed, operation abandoned"
                );
                Err(TimeoutError::Timeout(self.duration))
            }
        }
    }
}

impl Validate for Timeout {
    fn validate(&self) -> ConfigResult<()> {
        require_non_zero(self.duration, "timeout")
    }
}

/// Run `f` under an anonymous deadline of `duration`.
pub async fn with_timeout<F, Fut, T, E>(duration: Duration, f: F) -> Result<T, TimeoutError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    Timeout::with_duration(duration).call(f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_within_deadline_passes_through() {
        let deadline = Timeout::new("fast", Duration::from_secs(1));

        let result: Result<u32, TimeoutError<&str>> = deadline
            .call(|| async {
                tokio::time::sleep(Duration::from_millis(999)).await;
                Ok(7)
            })
            .await;

        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_deadline_drops_the_operation() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = SetOnDrop(Arc::clone(&dropped));

        let result: Result<(), TimeoutError<&str>> = Timeout::new("slow", Duration::from_millis(10))
            .call(|| async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Deadline of 10ms elapsed");
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_operation_error_is_kept() {
        let result: Result<(), _> =
            with_timeout(Duration::from_secs(1), || async { Err(std::io::Error::other("refused")) })
                .await;

        let err = result.unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "refused");
        assert!(Error::source(&err).is_some());
        assert_eq!(err.into_execution().unwrap().to_string(), "refused");
    }

    #[test]
    fn test_zero_deadline_rejected() {
        assert!(Timeout::with_duration(Duration::ZERO).validate().is_err());
        assert!(Timeout::new("ok", Duration::from_millis(1)).validate().is_ok());
    }
}
