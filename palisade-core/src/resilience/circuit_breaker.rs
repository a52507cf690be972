//! Circuit Breaker pattern implementation.
//!
//! The circuit breaker prevents cascade failures by counting consecutive
//! failures of a protected resource and "opening" the circuit to reject calls
//! once a threshold is reached.
//!
//! ## States
//!
//! - **Closed**: Normal operation, calls pass through
//! - **Open**: Circuit is tripped, calls are rejected immediately
//! - **Half-Open**: A bounded number of probe calls test whether the resource recovered
//!
//! The Open to Half-Open edge is taken lazily by the first admission check
//! after `reset_timeout`; that call is itself the first probe.
//!
//! ## Example
//!
//! ```rust
//! use palisade_core::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::new("inventory")
//!         .failure_threshold(5)
//!         .reset_timeout(Duration::from_secs(30)),
//! )?;
//!
//! let result = breaker.call(|| async { Ok::<_, std::io::Error>("stock") }).await;
//!
//! match result {
//!     Ok(stock) => println!("{stock}"),
//!     Err(CircuitBreakerError::Open) => println!("inventory temporarily unavailable"),
//!     Err(CircuitBreakerError::Execution(e)) => println!("inventory failed: {e}"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{ConfigError, ConfigResult, Validate, require_non_zero, require_positive_u32};
use crate::events::{EventListeners, ResilienceEvent};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is half-open, testing recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Name of the protected resource (for logging and events).
    pub name: String,
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to wait in Open before admitting a probe.
    pub reset_timeout: Duration,
    /// Maximum number of probes admitted while half-open.
    pub half_open_max_probes: u32,
    /// Number of successful probes needed to close the circuit.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_probes: 3,
            half_open_success_threshold: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration with a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the reset timeout.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set the number of probes allowed while half-open.
    pub fn half_open_max_probes(mut self, probes: u32) -> Self {
        self.half_open_max_probes = probes;
        self
    }

    /// Set the number of probe successes needed to close.
    pub fn half_open_success_threshold(mut self, threshold: u32) -> Self {
        self.half_open_success_threshold = threshold;
        self
    }
}

impl Validate for CircuitBreakerConfig {
    fn validate(&self) -> ConfigResult<()> {
        require_positive_u32(self.failure_threshold, "failure_threshold")?;
        require_positive_u32(self.half_open_max_probes, "half_open_max_probes")?;
        require_positive_u32(self.half_open_success_threshold, "half_open_success_threshold")?;
        require_non_zero(self.reset_timeout, "reset_timeout")?;

        if self.half_open_success_threshold > self.half_open_max_probes {
            return Err(ConfigError::invalid(
                "half_open_success_threshold",
                format!(
                    "must not exceed half_open_max_probes ({})",
                    self.half_open_max_probes
                ),
            ));
        }
        Ok(())
    }
}

/// Circuit breaker error.
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open or the half-open probe budget is spent.
    Open,
    /// Request was executed but failed.
    Execution(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Circuit breaker is open"),
            Self::Execution(e) => write!(f, "Execution failed: {}", e),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CircuitBreakerError<E> {}

type Transition = Option<(CircuitState, CircuitState)>;

/// Mutable breaker state, guarded by one lock per breaker.
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    half_open_probes: u32,
    half_open_successes: u32,
    /// Bumped on every transition.
    generation: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            half_open_probes: 0,
            half_open_successes: 0,
            generation: 0,
        }
    }

    fn transition(&mut self, to: CircuitState, now: Instant) -> Transition {
        let from = self.state;
        if from == to {
            return None;
        }

        self.state = to;
        self.generation += 1;
        self.consecutive_failures = 0;
        self.half_open_probes = 0;
        self.half_open_successes = 0;
        match to {
            CircuitState::Open => self.last_failure_at = Some(now),
            CircuitState::Closed => self.last_failure_at = None,
            CircuitState::HalfOpen => {}
        }
        Some((from, to))
    }
}

/// Circuit breaker for protecting one resource against cascade failures.
///
/// Safe to share between any number of concurrent callers.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    listeners: EventListeners,
    total_requests: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Arc<Self>> {
        Self::with_listeners(config, EventListeners::new())
    }

    /// Create a circuit breaker that reports state transitions to `listeners`.
    pub fn with_listeners(
        config: CircuitBreakerConfig,
        listeners: EventListeners,
    ) -> ConfigResult<Arc<Self>> {
        config.validate()?;

        info!(
            name = %config.name,
            failure_threshold = config.failure_threshold,
            reset_timeout = ?config.reset_timeout,
            half_open_max_probes = config.half_open_max_probes,
            "Circuit breaker initialized"
        );

        Ok(Arc::new(Self {
            config,
            inner: Mutex::new(BreakerState::new()),
            listeners,
            total_requests: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }))
    }

    /// Get the current circuit state.
    ///
    /// Reading the state never moves an Open circuit to Half-Open; only an
    /// admission check does.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Get the circuit breaker name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Check if a request is allowed through the circuit.
    ///
    /// An admitted request must later be reported with
    /// [`on_success`](Self::on_success) or [`on_failure`](Self::on_failure).
    pub fn allow_request(&self) -> bool {
        self.admit().is_some()
    }

    /// Admit a request and return a permit that reports its outcome.
    ///
    /// Dropping the permit without reporting releases its half-open probe
    /// slot, so an abandoned attempt does not wedge the breaker.
    pub fn acquire(&self) -> Option<BreakerPermit<'_>> {
        self.admit().map(|admission| BreakerPermit {
            breaker: self,
            admission,
            resolved: false,
        })
    }

    fn admit(&self) -> Option<Admission> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        let (admission, transition) = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => (
                    Some(Admission {
                        generation: inner.generation,
                        probe: false,
                    }),
                    None,
                ),
                CircuitState::Open => {
                    let elapsed = inner
                        .last_failure_at
                        .map(|at| now.saturating_duration_since(at))
                        .unwrap_or(self.config.reset_timeout);

                    if elapsed >= self.config.reset_timeout {
                        let transition = inner.transition(CircuitState::HalfOpen, now);
                        inner.half_open_probes = 1;
                        (
                            Some(Admission {
                                generation: inner.generation,
                                probe: true,
                            }),
                            transition,
                        )
                    } else {
                        (None, None)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.half_open_probes < self.config.half_open_max_probes {
                        inner.half_open_probes += 1;
                        (
                            Some(Admission {
                                generation: inner.generation,
                                probe: true,
                            }),
                            None,
                        )
                    } else {
                        (None, None)
                    }
                }
            }
        };

        self.announce(transition);

        if admission.is_none() {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            debug!(name = %self.config.name, "Circuit breaker rejected request");
        } else {
            trace!(name = %self.config.name, "Circuit breaker admitted request");
        }
        admission
    }

    /// Record a successful operation.
    ///
    /// Unlike a [`BreakerPermit`], a bare report cannot tell which admission
    /// it belongs to and always applies to the current state.
    pub fn on_success(&self) {
        self.resolve(None, Outcome::Success);
    }

    /// Record a failed operation.
    pub fn on_failure(&self) {
        self.resolve(None, Outcome::Failure);
    }

    /// Apply an outcome. With an admission attached, outcomes from an earlier
    /// generation (a Closed-era call finishing during probation, or a probe of
    /// a previous half-open period) are counted in the stats only.
    fn resolve(&self, admission: Option<Admission>, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.total_successes.fetch_add(1, Ordering::Relaxed),
            Outcome::Failure => self.total_failures.fetch_add(1, Ordering::Relaxed),
        };
        let now = Instant::now();

        let transition = {
            let mut inner = self.inner.lock();
            let stale = admission.is_some_and(|a| a.generation != inner.generation);
            if stale {
                trace!(name = %self.config.name, outcome = ?outcome, "Stale outcome ignored");
                None
            } else {
                match (inner.state, outcome) {
                    (CircuitState::Closed, Outcome::Success) => {
                        inner.consecutive_failures = 0;
                        None
                    }
                    (CircuitState::Closed, Outcome::Failure) => {
                        inner.consecutive_failures += 1;
                        if inner.consecutive_failures >= self.config.failure_threshold {
                            inner.transition(CircuitState::Open, now)
                        } else {
                            None
                        }
                    }
                    (CircuitState::HalfOpen, Outcome::Success) => {
                        inner.half_open_successes += 1;
                        if inner.half_open_successes >= self.config.half_open_success_threshold {
                            inner.transition(CircuitState::Closed, now)
                        } else {
                            None
                        }
                    }
                    // Any failure during probation reopens the circuit
                    (CircuitState::HalfOpen, Outcome::Failure) => {
                        inner.transition(CircuitState::Open, now)
                    }
                    (CircuitState::Open, _) => None,
                }
            }
        };

        self.announce(transition);
    }

    /// Execute a function with circuit breaker protection.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.acquire() else {
            return Err(CircuitBreakerError::Open);
        };

        match f().await {
            Ok(result) => {
                permit.success();
                Ok(result)
            }
            Err(e) => {
                permit.failure();
                Err(CircuitBreakerError::Execution(e))
            }
        }
    }

    /// Manually reset the circuit breaker to closed state.
    pub fn reset(&self) {
        let transition = self.inner.lock().transition(CircuitState::Closed, Instant::now());
        self.announce(transition);
    }

    /// Manually force the circuit open.
    pub fn force_open(&self) {
        let transition = self.inner.lock().transition(CircuitState::Open, Instant::now());
        self.announce(transition);
    }

    fn abandon(&self, admission: Admission) {
        if !admission.probe {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.generation == admission.generation && inner.state == CircuitState::HalfOpen {
            inner.half_open_probes = inner.half_open_probes.saturating_sub(1);
            debug!(name = %self.config.name, "Abandoned half-open probe released");
        }
    }

    /// Log and publish a transition. Must be called with the lock released.
    fn announce(&self, transition: Transition) {
        let Some((from, to)) = transition else {
            return;
        };

        match to {
            CircuitState::Open => warn!(
                name = %self.config.name,
                from = %from,
                "Circuit breaker OPENED"
            ),
            CircuitState::Closed => info!(name = %self.config.name, "Circuit breaker CLOSED"),
            CircuitState::HalfOpen => {
                debug!(name = %self.config.name, "Circuit breaker transitioning to HALF-OPEN")
            }
        }

        self.listeners.emit(&ResilienceEvent::StateTransition {
            breaker: self.config.name.clone(),
            from,
            to,
        });
    }

    /// Get circuit breaker statistics.
    pub fn stats(&self) -> CircuitBreakerStats {
        let (state, consecutive_failures, half_open_probes) = {
            let inner = self.inner.lock();
            (
                inner.state,
                inner.consecutive_failures,
                inner.half_open_probes,
            )
        };

        CircuitBreakerStats {
            name: self.config.name.clone(),
            state,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            consecutive_failures,
            half_open_probes,
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy)]
struct Admission {
    generation: u64,
    probe: bool,
}

/// Admission granted by [`CircuitBreaker::acquire`].
///
/// Report the outcome with [`success`](Self::success) or
/// [`failure`](Self::failure). A permit dropped unresolved counts as neither.
#[must_use = "an unresolved permit never reports its outcome"]
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    resolved: bool,
}

impl BreakerPermit<'_> {
    /// Whether this call was admitted as a half-open probe.
    pub fn is_probe(&self) -> bool {
        self.admission.probe
    }

    /// Report that the call succeeded.
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.resolve(Some(self.admission), Outcome::Success);
    }

    /// Report that the call failed.
    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.resolve(Some(self.admission), Outcome::Failure);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.abandon(self.admission);
        }
    }
}

/// Circuit breaker statistics.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    /// Circuit breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Total admission checks.
    pub total_requests: u64,
    /// Total reported successes.
    pub total_successes: u64,
    /// Total reported failures.
    pub total_failures: u64,
    /// Total rejected admission checks.
    pub total_rejections: u64,
    /// Consecutive failures while closed.
    pub consecutive_failures: u32,
    /// Probes admitted in the current half-open period.
    pub half_open_probes: u32,
}

impl CircuitBreakerStats {
    /// Fraction of reported outcomes that succeeded (0.0 - 1.0).
    pub fn success_rate(&self) -> f64 {
        let outcomes = self.total_successes + self.total_failures;
        if outcomes == 0 {
            1.0
        } else {
            self.total_successes as f64 / outcomes as f64
        }
    }

    /// Fraction of admission checks that were rejected (0.0 - 1.0).
    pub fn rejection_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_rejections as f64 / self.total_requests as f64
        }
    }
}
