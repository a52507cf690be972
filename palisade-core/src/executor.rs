//! Composition of the resilience layers around one operation.
//!
//! A call flows through the layers in a fixed order, and any layer may
//! short-circuit before the operation runs:
//!
//! 1. **Bulkhead**: take a slot in the executor's partition
//! 2. **Rate limiter**: charge the caller's key
//! 3. **Circuit breaker**: admit the attempt (checked again before every retry)
//! 4. **Operation**: run it and report the outcome to the breaker
//! 5. **Retry**: re-run transient failures per the [`RetryPolicy`]
//!
//! The bulkhead slot is held for the whole invocation and released on every
//! exit path, including timeout and cancellation. Rejections from the
//! admission layers are never retried.
//!
//! ## Example
//!
//! ```rust
//! use palisade_core::resilience::{Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
//! use palisade_core::{ExecutorError, ResilientExecutor};
//! use palisade_ratelimit::RateLimiterBuilder;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let executor = ResilientExecutor::builder("payments")
//!     .bulkhead(Bulkhead::new(BulkheadConfig::new("outbound", 8))?)
//!     .rate_limiter(RateLimiterBuilder::new().token_bucket(100, 10.0).build()?)
//!     .circuit_breaker(CircuitBreaker::new(CircuitBreakerConfig::new("payments"))?)
//!     .retry(RetryPolicy::exponential(3, Duration::from_millis(50)))
//!     .timeout(Duration::from_secs(2))
//!     .build()?;
//!
//! match executor.execute("merchant-42", || async { Ok::<_, std::io::Error>("charged") }).await {
//!     Ok(receipt) => println!("{receipt}"),
//!     Err(e) if e.is_rejection() => println!("shed: {e}"),
//!     Err(e) => println!("failed: {e}"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

use crate::error::{ConfigResult, ExecutorError, Layer, Validate};
use crate::events::{EventListener, EventListeners, ResilienceEvent};
use crate::resilience::{
    Bulkhead, BulkheadPermit, CircuitBreaker, CircuitState, RetryPolicy, Timeout, TimeoutError,
};
use palisade_ratelimit::RateLimiter;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Wraps an unreliable operation with bulkhead, rate limiting, circuit
/// breaking, retry and timeout.
///
/// Every layer is optional. Components are shared through `Arc`, so several
/// executors may guard the same breaker or bulkhead.
pub struct ResilientExecutor {
    name: String,
    bulkhead: Option<Arc<Bulkhead>>,
    partition: String,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    retry: RetryPolicy,
    timeout: Option<Timeout>,
    listeners: EventListeners,
}

impl ResilientExecutor {
    /// Start building an executor.
    pub fn builder(name: impl Into<String>) -> ResilientExecutorBuilder {
        ResilientExecutorBuilder::new(name)
    }

    /// Get the executor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bulkhead partition this executor runs in.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Bulkhead shared by this executor, if any.
    pub fn bulkhead(&self) -> Option<&Arc<Bulkhead>> {
        self.bulkhead.as_ref()
    }

    /// Rate limiter charged once per call, if any.
    pub fn rate_limiter(&self) -> Option<&Arc<dyn RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// Circuit breaker consulted before every attempt, if any.
    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    /// Retry policy; disabled unless one was configured.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Default per-call deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.as_ref().map(Timeout::duration)
    }

    /// Run `op` under every configured layer on behalf of `key`.
    ///
    /// The default timeout applies when one is configured.
    pub async fn execute<F, Fut, T, E>(&self, key: &str, op: F) -> Result<T, ExecutorError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        match &self.timeout {
            Some(deadline) => self.run_within(key, deadline, op).await,
            None => self.run(key, op).await,
        }
    }

    /// Run `op` with a caller-supplied deadline over the whole invocation,
    /// retry delays included.
    pub async fn execute_with_timeout<F, Fut, T, E>(
        &self,
        key: &str,
        timeout: Duration,
        op: F,
    ) -> Result<T, ExecutorError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let deadline = Timeout::new(self.name.as_str(), timeout);
        self.run_within(key, &deadline, op).await
    }

    /// Run `op`, aborting as soon as `token` is cancelled.
    ///
    /// Cancellation wins over a result that becomes ready at the same time.
    pub async fn execute_with_cancellation<F, Fut, T, E>(
        &self,
        key: &str,
        token: &CancellationToken,
        op: F,
    ) -> Result<T, ExecutorError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(executor = %self.name, key = %key, "Call cancelled");
                self.listeners.emit(&ResilienceEvent::Cancelled {
                    executor: self.name.clone(),
                });
                Err(ExecutorError::Cancelled)
            }
            result = self.execute(key, op) => result,
        }
    }

    async fn run_within<F, Fut, T, E>(
        &self,
        key: &str,
        deadline: &Timeout,
        op: F,
    ) -> Result<T, ExecutorError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        match deadline.call(|| self.run(key, op)).await {
            Ok(value) => Ok(value),
            Err(TimeoutError::Execution(error)) => Err(error),
            Err(TimeoutError::Timeout(timeout)) => {
                warn!(executor = %self.name, key = %key, timeout = ?timeout, "Call timed out");
                self.listeners.emit(&ResilienceEvent::TimedOut {
                    executor: self.name.clone(),
                    timeout,
                });
                Err(ExecutorError::Timeout(timeout))
            }
        }
    }

    async fn run<F, Fut, T, E>(&self, key: &str, mut op: F) -> Result<T, ExecutorError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let _slot = self.enter_bulkhead::<E>(key)?;
        self.check_rate_limit::<E>(key)?;

        let mut attempt = 1;
        loop {
            let permit = match &self.circuit_breaker {
                Some(breaker) => match breaker.acquire() {
                    Some(permit) => Some(permit),
                    None => return Err(self.circuit_open(breaker, key, None)),
                },
                None => None,
            };

            trace!(executor = %self.name, key = %key, attempt, "Invoking operation");

            let error = match op().await {
                Ok(value) => {
                    if let Some(permit) = permit {
                        permit.success();
                    }
                    if attempt > 1 {
                        debug!(executor = %self.name, attempt, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if let Some(permit) = permit {
                        permit.failure();
                    }
                    error
                }
            };

            if !self.retry.retryable.matches(&error) {
                return Err(ExecutorError::Operation(error));
            }

            if attempt >= self.retry.max_attempts {
                if self.retry.is_disabled() {
                    return Err(ExecutorError::Operation(error));
                }
                warn!(
                    executor = %self.name,
                    attempts = attempt,
                    error = %error,
                    "Retries exhausted"
                );
                self.listeners.emit(&ResilienceEvent::RetryExhausted {
                    executor: self.name.clone(),
                    attempts: attempt,
                });
                return Err(ExecutorError::RetryExhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            // A breaker opened by this failure stops the loop without waiting
            if let Some(breaker) = &self.circuit_breaker
                && breaker.state() == CircuitState::Open
            {
                return Err(self.circuit_open(breaker, key, Some(error)));
            }

            let delay = self.retry.next_delay(attempt);
            debug!(
                executor = %self.name,
                attempt,
                delay = ?delay,
                error = %error,
                "Attempt failed, retrying"
            );
            self.listeners.emit(&ResilienceEvent::RetryScheduled {
                executor: self.name.clone(),
                attempt,
                delay,
            });

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    fn enter_bulkhead<E>(&self, key: &str) -> Result<Option<BulkheadPermit>, ExecutorError<E>> {
        let Some(bulkhead) = &self.bulkhead else {
            return Ok(None);
        };

        match bulkhead.try_acquire(&self.partition) {
            Some(permit) => Ok(Some(permit)),
            None => {
                self.rejected(Layer::Bulkhead, &self.partition, key);
                Err(ExecutorError::BulkheadRejected {
                    partition: self.partition.clone(),
                })
            }
        }
    }

    fn check_rate_limit<E>(&self, key: &str) -> Result<(), ExecutorError<E>> {
        let Some(limiter) = &self.rate_limiter else {
            return Ok(());
        };

        let check = limiter.check(key);
        if check.allowed {
            return Ok(());
        }

        self.rejected(Layer::RateLimiter, &self.name, key);
        Err(ExecutorError::RateLimitExceeded {
            key: key.to_string(),
            retry_after: check.retry_after,
        })
    }

    fn circuit_open<E>(
        &self,
        breaker: &CircuitBreaker,
        key: &str,
        last_error: Option<E>,
    ) -> ExecutorError<E> {
        self.rejected(Layer::CircuitBreaker, breaker.name(), key);
        ExecutorError::CircuitOpen {
            name: breaker.name().to_string(),
            last_error,
        }
    }

    fn rejected(&self, layer: Layer, name: &str, key: &str) {
        debug!(executor = %self.name, layer = %layer, name = %name, key = %key, "Call rejected");
        self.listeners.emit(&ResilienceEvent::Rejected {
            layer,
            name: name.to_string(),
            key: key.to_string(),
        });
    }
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("name", &self.name)
            .field("partition", &self.partition)
            .field("bulkhead", &self.bulkhead.as_ref().map(|b| b.name().to_string()))
            .field("rate_limiter", &self.rate_limiter.as_ref().map(|l| l.limit()))
            .field(
                "circuit_breaker",
                &self.circuit_breaker.as_ref().map(|b| b.name().to_string()),
            )
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("listeners", &self.listeners)
            .finish()
    }
}

/// Builder for [`ResilientExecutor`].
pub struct ResilientExecutorBuilder {
    name: String,
    bulkhead: Option<Arc<Bulkhead>>,
    partition: Option<String>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    retry: Option<RetryPolicy>,
    timeout: Option<Duration>,
    listeners: EventListeners,
}

impl ResilientExecutorBuilder {
    /// Create a builder with no layers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bulkhead: None,
            partition: None,
            rate_limiter: None,
            circuit_breaker: None,
            retry: None,
            timeout: None,
            listeners: EventListeners::new(),
        }
    }

    /// Run calls inside a bulkhead.
    pub fn bulkhead(mut self, bulkhead: Arc<Bulkhead>) -> Self {
        self.bulkhead = Some(bulkhead);
        self
    }

    /// Bulkhead partition to use. Defaults to the executor name.
    pub fn partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Charge every call against a rate limiter.
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Gate every attempt through a circuit breaker.
    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Set the retry policy. Without one, each call makes a single attempt.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Set a default deadline for [`ResilientExecutor::execute`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Register an event listener.
    pub fn listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.add(listener);
        self
    }

    /// Replace the listener set.
    pub fn listeners(mut self, listeners: EventListeners) -> Self {
        self.listeners = listeners;
        self
    }

    /// Validate and build the executor.
    pub fn build(self) -> ConfigResult<ResilientExecutor> {
        let retry = self.retry.unwrap_or_else(RetryPolicy::disabled);
        retry.validate()?;
        let timeout = self
            .timeout
            .map(|duration| Timeout::new(self.name.as_str(), duration));
        if let Some(deadline) = &timeout {
            deadline.validate()?;
        }

        let partition = self.partition.unwrap_or_else(|| self.name.clone());

        info!(
            name = %self.name,
            partition = %partition,
            bulkhead = self.bulkhead.is_some(),
            rate_limiter = self.rate_limiter.is_some(),
            circuit_breaker = self.circuit_breaker.is_some(),
            max_attempts = retry.max_attempts,
            timeout = ?self.timeout,
            "Resilient executor initialized"
        );

        Ok(ResilientExecutor {
            name: self.name,
            bulkhead: self.bulkhead,
            partition,
            rate_limiter: self.rate_limiter,
            circuit_breaker: self.circuit_breaker,
            retry,
            timeout,
            listeners: self.listeners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{BulkheadConfig, CircuitBreakerConfig};
    use palisade_ratelimit::RateLimiterBuilder;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thiserror::Error;
    use tokio::time::Instant;

    #[derive(Debug, Error, PartialEq)]
    enum UpstreamError {
        #[error("upstream unavailable")]
        Unavailable,
        #[error("bad request")]
        BadRequest,
    }

    fn recorder() -> (Arc<Mutex<Vec<ResilienceEvent>>>, Arc<dyn EventListener>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener: Arc<dyn EventListener> = Arc::new(move |event: &ResilienceEvent| {
            sink.lock().push(event.clone());
        });
        (events, listener)
    }

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        CircuitBreaker::new(
            CircuitBreakerConfig::new("upstream")
                .failure_threshold(threshold)
                .reset_timeout(Duration::from_secs(60)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_plain_executor_runs_operation_once() {
        let executor = ResilientExecutor::builder("plain").build().unwrap();
        let calls = AtomicU32::new(0);

        let result = executor
            .execute("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(UpstreamError::Unavailable) }
            })
            .await;

        // Retries disabled: the error passes through untouched
        assert!(matches!(result, Err(ExecutorError::Operation(UpstreamError::Unavailable))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.partition(), "plain");
    }

    #[tokio::test]
    async fn test_retries_transient_failures_until_success() {
        let executor = ResilientExecutor::builder("retrying")
            .retry(RetryPolicy::immediate(3))
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);

        let result = executor
            .execute("k", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(UpstreamError::Unavailable)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_wraps_last_error() {
        let (events, listener) = recorder();
        let executor = ResilientExecutor::builder("exhausting")
            .retry(RetryPolicy::immediate(2))
            .listener(listener)
            .build()
            .unwrap();

        let result = executor
            .execute("k", || async { Err::<(), _>(UpstreamError::Unavailable) })
            .await;

        match result {
            Err(ExecutorError::RetryExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error, UpstreamError::Unavailable);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let kinds: Vec<_> = events.lock().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["retry_scheduled", "retry_exhausted"]);
    }

    #[tokio::test]
    async fn test_non_retryable_error_passes_through() {
        let executor = ResilientExecutor::builder("classifying")
            .retry(RetryPolicy::immediate(5).retry_on(|e| {
                matches!(e.downcast_ref::<UpstreamError>(), Some(UpstreamError::Unavailable))
            }))
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);

        let result = executor
            .execute("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(UpstreamError::BadRequest) }
            })
            .await;

        assert!(matches!(result, Err(ExecutorError::Operation(UpstreamError::BadRequest))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bulkhead_rejects_before_rate_limiter() {
        let bulkhead = Bulkhead::new(BulkheadConfig::new("pool", 1)).unwrap();
        let limiter = RateLimiterBuilder::new().token_bucket(5, 0.001).build().unwrap();
        let executor = ResilientExecutor::builder("ordered")
            .bulkhead(Arc::clone(&bulkhead))
            .rate_limiter(Arc::clone(&limiter))
            .build()
            .unwrap();

        let _held = bulkhead.try_acquire("ordered").unwrap();
        let result = executor.execute("k", || async { Ok::<_, UpstreamError>(()) }).await;

        assert!(matches!(
            result,
            Err(ExecutorError::BulkheadRejected { ref partition }) if partition == "ordered"
        ));
        // The rejected call never reached the limiter
        assert_eq!(limiter.remaining("k"), 5);
    }

    #[tokio::test]
    async fn test_rate_limit_rejection_is_not_retried() {
        let limiter = RateLimiterBuilder::new().token_bucket(1, 1.0).build().unwrap();
        let executor = ResilientExecutor::builder("limited")
            .rate_limiter(limiter)
            .retry(RetryPolicy::immediate(5))
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);

        let first = executor
            .execute("user-1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, UpstreamError>(()) }
            })
            .await;
        assert!(first.is_ok());

        let second = executor
            .execute("user-1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, UpstreamError>(()) }
            })
            .await;

        match second {
            Err(ExecutorError::RateLimitExceeded { key, retry_after }) => {
                assert_eq!(key, "user-1");
                assert!(retry_after.is_some());
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Other keys have their own budget
        assert!(executor
            .execute("user-2", || async { Ok::<_, UpstreamError>(()) })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_open_breaker_fast_fails_without_invoking() {
        let cb = breaker(1);
        cb.force_open();
        let (events, listener) = recorder();
        let executor = ResilientExecutor::builder("guarded")
            .circuit_breaker(cb)
            .listener(listener)
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);

        let result = executor
            .execute("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, UpstreamError>(()) }
            })
            .await;

        assert!(matches!(result, Err(ExecutorError::CircuitOpen { ref name, last_error: None }) if name == "upstream"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            events.lock().as_slice(),
            &[ResilienceEvent::Rejected {
                layer: Layer::CircuitBreaker,
                name: "upstream".into(),
                key: "k".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_breaker_opening_mid_retry_stops_attempts() {
        let cb = breaker(2);
        let executor = ResilientExecutor::builder("tripping")
            .circuit_breaker(Arc::clone(&cb))
            .retry(RetryPolicy::immediate(5))
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);

        let result = executor
            .execute("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(UpstreamError::Unavailable) }
            })
            .await;

        // The failure that tripped the breaker is surfaced, not swallowed
        assert!(matches!(
            result,
            Err(ExecutorError::CircuitOpen {
                last_error: Some(UpstreamError::Unavailable),
                ..
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_bulkhead_slot() {
        let bulkhead = Bulkhead::new(BulkheadConfig::new("pool", 1)).unwrap();
        let executor = ResilientExecutor::builder("slow")
            .bulkhead(Arc::clone(&bulkhead))
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        let result = executor
            .execute("k", || async {
                std::future::pending::<()>().await;
                Ok::<_, UpstreamError>(())
            })
            .await;

        assert!(matches!(result, Err(ExecutorError::Timeout(d)) if d == Duration::from_millis(50)));
        assert_eq!(bulkhead.active_count("slow"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_retry_delay() {
        let bulkhead = Bulkhead::new(BulkheadConfig::new("pool", 1)).unwrap();
        let (events, listener) = recorder();
        let executor = ResilientExecutor::builder("cancellable")
            .bulkhead(Arc::clone(&bulkhead))
            .retry(RetryPolicy::exponential(3, Duration::from_secs(10)))
            .listener(listener)
            .build()
            .unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = executor
            .execute_with_cancellation("k", &token, || async {
                Err::<(), _>(UpstreamError::Unavailable)
            })
            .await;

        assert!(matches!(result, Err(ExecutorError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(bulkhead.active_count("cancellable"), 0);
        assert_eq!(
            events.lock().last(),
            Some(&ResilienceEvent::Cancelled {
                executor: "cancellable".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_probe_frees_half_open_slot() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::new("probe")
                .failure_threshold(1)
                .reset_timeout(Duration::from_secs(1))
                .half_open_max_probes(1)
                .half_open_success_threshold(1),
        )
        .unwrap();
        cb.on_failure();
        tokio::time::advance(Duration::from_secs(1)).await;

        let executor = ResilientExecutor::builder("probing")
            .circuit_breaker(Arc::clone(&cb))
            .build()
            .unwrap();

        let stalled = executor
            .execute_with_timeout("k", Duration::from_millis(10), || async {
                std::future::pending::<()>().await;
                Ok::<_, UpstreamError>(())
            })
            .await;
        assert!(stalled.unwrap_err().is_timeout());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // The abandoned probe's slot is available to the next caller
        let result = executor.execute("k", || async { Ok::<_, UpstreamError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_build_validates() {
        assert!(ResilientExecutor::builder("bad")
            .retry(RetryPolicy::new(0))
            .build()
            .is_err());
        assert!(ResilientExecutor::builder("bad")
            .timeout(Duration::ZERO)
            .build()
            .is_err());

        let executor = ResilientExecutor::builder("ok")
            .partition("db")
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        assert_eq!(executor.partition(), "db");
        assert_eq!(executor.timeout(), Some(Duration::from_secs(2)));
        assert!(executor.retry_policy().is_disabled());
    }
}
