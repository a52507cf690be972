//! Observability hook for the resilience layer.
//!
//! Components emit [`ResilienceEvent`]s to every registered [`EventListener`].
//! Nothing in the core logic depends on a listener being installed; an empty
//! [`EventListeners`] set simply drops events.
//!
//! ```rust
//! use palisade_core::events::{EventListeners, ResilienceEvent};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&seen);
//!
//! let mut listeners = EventListeners::new();
//! listeners.add(Arc::new(move |_: &ResilienceEvent| {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! }));
//!
//! listeners.emit(&ResilienceEvent::Cancelled { executor: "orders".into() });
//! assert_eq!(seen.load(Ordering::Relaxed), 1);
//! ```

use crate::error::Layer;
use crate::resilience::CircuitState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Something worth observing happened in a resilience component.
#[derive(Debug, Clone, PartialEq)]
pub enum ResilienceEvent {
    /// A circuit breaker changed state.
    StateTransition {
        breaker: String,
        from: CircuitState,
        to: CircuitState,
    },
    /// An admission layer rejected a call.
    Rejected {
        layer: Layer,
        /// Name of the rejecting component (partition, breaker, executor).
        name: String,
        /// Caller key the call was made under.
        key: String,
    },
    /// A failed attempt will be retried after `delay`.
    RetryScheduled {
        executor: String,
        attempt: u32,
        delay: Duration,
    },
    /// The retry budget ran out.
    RetryExhausted { executor: String, attempts: u32 },
    /// The per-call deadline elapsed.
    TimedOut { executor: String, timeout: Duration },
    /// The caller cancelled an in-flight call.
    Cancelled { executor: String },
}

impl ResilienceEvent {
    /// Short machine-friendly name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateTransition { .. } => "state_transition",
            Self::Rejected { .. } => "rejected",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::TimedOut { .. } => "timed_out",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Receives resilience events.
///
/// Listeners are called synchronously on the thread that produced the event,
/// never while a component lock is held. Keep them cheap.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &ResilienceEvent);
}

impl<F> EventListener for F
where
    F: Fn(&ResilienceEvent) + Send + Sync,
{
    fn on_event(&self, event: &ResilienceEvent) {
        self(event)
    }
}

/// Fan-out over a set of listeners.
#[derive(Clone, Default)]
pub struct EventListeners {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventListeners {
    /// Create an empty listener set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn add(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Builder-style variant of [`add`](Self::add).
    pub fn with(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.add(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver an event to every listener in registration order.
    pub fn emit(&self, event: &ResilienceEvent) {
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }
}

impl std::fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

/// Listener that forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl EventListener for TracingListener {
    fn on_event(&self, event: &ResilienceEvent) {
        match event {
            ResilienceEvent::StateTransition { breaker, from, to } => {
                if *to == CircuitState::Open {
                    warn!(breaker = %breaker, from = %from, to = %to, "Circuit breaker state changed");
                } else {
                    info!(breaker = %breaker, from = %from, to = %to, "Circuit breaker state changed");
                }
            }
            ResilienceEvent::Rejected { layer, name, key } => {
                debug!(layer = %layer, name = %name, key = %key, "Call rejected");
            }
            ResilienceEvent::RetryScheduled {
                executor,
                attempt,
                delay,
            } => {
                debug!(executor = %executor, attempt, delay = ?delay, "Retry scheduled");
            }
            ResilienceEvent::RetryExhausted { executor, attempts } => {
                warn!(executor = %executor, attempts, "Retries exhausted");
            }
            ResilienceEvent::TimedOut { executor, timeout } => {
                warn!(executor = %executor, timeout = ?timeout, "Call timed out");
            }
            ResilienceEvent::Cancelled { executor } => {
                debug!(executor = %executor, "Call cancelled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ResilienceEvent>>);

    impl EventListener for Recorder {
        fn on_event(&self, event: &ResilienceEvent) {
            self.0.lock().push(event.clone());
        }
    }

    #[test]
    fn test_emit_reaches_every_listener_in_order() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());

        let listeners = EventListeners::new()
            .with(first.clone())
            .with(second.clone())
            .with(Arc::new(TracingListener));
        assert_eq!(listeners.len(), 3);

        let event = ResilienceEvent::StateTransition {
            breaker: "db".into(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
        };
        listeners.emit(&event);

        assert_eq!(first.0.lock().as_slice(), &[event.clone()]);
        assert_eq!(second.0.lock().as_slice(), &[event]);
    }

    #[test]
    fn test_empty_listeners_drop_events() {
        let listeners = EventListeners::new();
        assert!(listeners.is_empty());
        listeners.emit(&ResilienceEvent::Cancelled {
            executor: "noop".into(),
        });
    }

    #[test]
    fn test_event_kind() {
        let event = ResilienceEvent::Rejected {
            layer: Layer::Bulkhead,
            name: "db".into(),
            key: "user-1".into(),
        };
        assert_eq!(event.kind(), "rejected");
        assert_eq!(
            ResilienceEvent::RetryExhausted {
                executor: "x".into(),
                attempts: 3
            }
            .kind(),
            "retry_exhausted"
        );
    }
}
