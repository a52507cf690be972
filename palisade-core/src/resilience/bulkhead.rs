//! Bulkhead pattern for resource isolation.
//!
//! The bulkhead limits concurrent access to named partitions so that one slow
//! dependency cannot consume every execution slot in the process. Each
//! partition owns its own semaphore; exhausting one never affects another.
//!
//! Admission is non-blocking: a full partition rejects immediately and the
//! caller decides whether to back off.
//!
//! ## Example
//!
//! ```rust
//! use palisade_core::resilience::{Bulkhead, BulkheadConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bulkhead = Bulkhead::new(
//!     BulkheadConfig::new("downstream", 10).partition("payments", 2),
//! )?;
//!
//! let permit = bulkhead.try_acquire("payments").expect("capacity available");
//! assert_eq!(bulkhead.active_count("payments"), 1);
//! drop(permit);
//! assert_eq!(bulkhead.active_count("payments"), 0);
//! # Ok(())
//! # }
//! ```

use crate::error::{ConfigResult, Validate, require_positive_u32};
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, trace};

/// Bulkhead configuration.
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    /// Name of the bulkhead (for logging).
    pub name: String,
    /// Capacity of any partition without an explicit override.
    pub max_concurrent: u32,
    /// Per-partition capacity overrides. These partitions are created up front.
    pub partitions: HashMap<String, u32>,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_concurrent: 10,
            partitions: HashMap::new(),
        }
    }
}

impl BulkheadConfig {
    /// Create a new configuration.
    pub fn new(name: impl Into<String>, max_concurrent: u32) -> Self {
        Self {
            name: name.into(),
            max_concurrent,
            ..Default::default()
        }
    }

    /// Give a partition its own capacity.
    pub fn partition(mut self, name: impl Into<String>, max_concurrent: u32) -> Self {
        self.partitions.insert(name.into(), max_concurrent);
        self
    }
}

impl Validate for BulkheadConfig {
    fn validate(&self) -> ConfigResult<()> {
        require_positive_u32(self.max_concurrent, "max_concurrent")?;
        for max in self.partitions.values() {
            require_positive_u32(*max, "partitions")?;
        }
        Ok(())
    }
}

/// Bulkhead error.
#[derive(Debug)]
pub enum BulkheadError<E> {
    /// Partition is full, request rejected.
    Full,
    /// Execution failed.
    Execution(E),
}

impl<E: std::fmt::Display> std::fmt::Display for BulkheadError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "Bulkhead is full"),
            Self::Execution(e) => write!(f, "Execution failed: {}", e),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for BulkheadError<E> {}

#[derive(Debug)]
struct Partition {
    max_concurrent: u32,
    semaphore: Arc<Semaphore>,
    total_calls: AtomicU64,
    total_rejections: AtomicU64,
}

impl Partition {
    fn new(max_concurrent: u32) -> Self {
        Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent as usize)),
            total_calls: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    fn available(&self) -> u32 {
        self.semaphore.available_permits() as u32
    }
}

/// Bulkhead bounding concurrent executions per named partition.
#[derive(Debug)]
pub struct Bulkhead {
    config: BulkheadConfig,
    partitions: DashMap<String, Arc<Partition>>,
}

impl Bulkhead {
    /// Create a new bulkhead.
    pub fn new(config: BulkheadConfig) -> ConfigResult<Arc<Self>> {
        config.validate()?;

        info!(
            name = %config.name,
            max_concurrent = config.max_concurrent,
            partitions = config.partitions.len(),
            "Bulkhead initialized"
        );

        let partitions = config
            .partitions
            .iter()
            .map(|(name, max)| (name.clone(), Arc::new(Partition::new(*max))))
            .collect();

        Ok(Arc::new(Self { config, partitions }))
    }

    /// Get the bulkhead name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn partition(&self, name: &str) -> Arc<Partition> {
        if let Some(partition) = self.partitions.get(name) {
            return Arc::clone(partition.value());
        }

        let partition = self
            .partitions
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(bulkhead = %self.config.name, partition = %name, "Creating bulkhead partition");
                Arc::new(Partition::new(self.config.max_concurrent))
            });
        Arc::clone(partition.value())
    }

    /// Try to take a slot in `partition` without waiting.
    ///
    /// The slot is held until the returned permit is released or dropped.
    pub fn try_acquire(&self, partition: &str) -> Option<BulkheadPermit> {
        let slot = self.partition(partition);
        slot.total_calls.fetch_add(1, Ordering::Relaxed);

        match Arc::clone(&slot.semaphore).try_acquire_owned() {
            Ok(permit) => {
                trace!(bulkhead = %self.config.name, partition = %partition, "Bulkhead permit acquired");
                Some(BulkheadPermit {
                    partition: partition.to_string(),
                    _permit: permit,
                })
            }
            Err(_) => {
                slot.total_rejections.fetch_add(1, Ordering::Relaxed);
                debug!(
                    bulkhead = %self.config.name,
                    partition = %partition,
                    max_concurrent = slot.max_concurrent,
                    "Bulkhead full, rejecting request"
                );
                None
            }
        }
    }

    /// Execute with bulkhead protection.
    pub async fn call<F, Fut, T, E>(&self, partition: &str, f: F) -> Result<T, BulkheadError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(_permit) = self.try_acquire(partition) else {
            return Err(BulkheadError::Full);
        };

        f().await.map_err(BulkheadError::Execution)
    }

    /// Capacity of `partition`.
    pub fn max_concurrent(&self, partition: &str) -> u32 {
        self.partitions
            .get(partition)
            .map(|p| p.max_concurrent)
            .unwrap_or(self.config.max_concurrent)
    }

    /// Get current number of active executions in `partition`.
    pub fn active_count(&self, partition: &str) -> u32 {
        self.partitions
            .get(partition)
            .map(|p| p.max_concurrent - p.available())
            .unwrap_or(0)
    }

    /// Get available permits in `partition`.
    pub fn available_permits(&self, partition: &str) -> u32 {
        self.partitions
            .get(partition)
            .map(|p| p.available())
            .unwrap_or(self.config.max_concurrent)
    }

    /// Check if `partition` has capacity.
    pub fn has_capacity(&self, partition: &str) -> bool {
        self.available_permits(partition) > 0
    }

    /// Names of all partitions created so far, sorted.
    pub fn partitions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.iter().map(|p| p.key().clone()).collect();
        names.sort();
        names
    }

    /// Get statistics for `partition`.
    pub fn stats(&self, partition: &str) -> BulkheadStats {
        let (max_concurrent, available, total_calls, total_rejections) =
            match self.partitions.get(partition) {
                Some(p) => (
                    p.max_concurrent,
                    p.available(),
                    p.total_calls.load(Ordering::Relaxed),
                    p.total_rejections.load(Ordering::Relaxed),
                ),
                None => (self.config.max_concurrent, self.config.max_concurrent, 0, 0),
            };

        BulkheadStats {
            name: self.config.name.clone(),
            partition: partition.to_string(),
            max_concurrent,
            active_count: max_concurrent - available,
            available_permits: available,
            total_calls,
            total_rejections,
        }
    }
}

/// A held bulkhead slot. The slot is returned exactly once, on release or drop.
#[derive(Debug)]
pub struct BulkheadPermit {
    partition: String,
    _permit: OwnedSemaphorePermit,
}

impl BulkheadPermit {
    /// Partition this permit belongs to.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Return the slot.
    pub fn release(self) {}
}

/// Bulkhead statistics for one partition.
#[derive(Debug, Clone)]
pub struct BulkheadStats {
    /// Bulkhead name.
    pub name: String,
    /// Partition name.
    pub partition: String,
    /// Maximum concurrent executions.
    pub max_concurrent: u32,
    /// Current active executions.
    pub active_count: u32,
    /// Available permits.
    pub available_permits: u32,
    /// Total acquisition attempts.
    pub total_calls: u64,
    /// Total rejections.
    pub total_rejections: u64,
}

impl BulkheadStats {
    /// Calculate utilization (0.0 - 1.0).
    pub fn utilization(&self) -> f64 {
        self.active_count as f64 / self.max_concurrent as f64
    }
}
