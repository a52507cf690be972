//! File-based executor settings.
//!
//! An [`ExecutorSettings`] document describes one executor and the layers it
//! composes. Durations are given in milliseconds. Documents are TOML or JSON,
//! picked by file extension.
//!
//! ```toml
//! name = "payments"
//! timeout_ms = 2000
//!
//! [bulkhead]
//! max_concurrent = 16
//! partitions = { payments = 4 }
//!
//! [rate_limiter]
//! algorithm = "token_bucket"
//! capacity = 100
//! refill_rate = 20.0
//!
//! [circuit_breaker]
//! failure_threshold = 5
//! reset_timeout_ms = 30000
//!
//! [retry]
//! max_attempts = 3
//! backoff = { strategy = "exponential", initial_ms = 100, max_ms = 2000, jitter_ms = 25 }
//! ```

use crate::error::{ConfigError, ConfigResult, Validate};
use crate::events::EventListeners;
use crate::executor::ResilientExecutor;
use crate::resilience::{
    Backoff, Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig, RetryPolicy,
};
use palisade_ratelimit::Algorithm;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Supported settings file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            _ => None,
        }
    }

    /// Detect the format of `path` from its extension.
    pub fn detect(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat("no file extension".to_string()))?;

        Self::from_extension(ext).ok_or_else(|| ConfigError::UnsupportedFormat(ext.to_string()))
    }
}

/// Settings for one [`ResilientExecutor`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorSettings {
    pub name: String,
    /// Bulkhead partition, defaults to `name`.
    pub partition: Option<String>,
    /// Default per-call deadline.
    pub timeout_ms: Option<u64>,
    pub bulkhead: Option<BulkheadSettings>,
    pub rate_limiter: Option<RateLimiterSettings>,
    pub circuit_breaker: Option<CircuitBreakerSettings>,
    pub retry: Option<RetrySettings>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            partition: None,
            timeout_ms: None,
            bulkhead: None,
            rate_limiter: None,
            circuit_breaker: None,
            retry: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BulkheadSettings {
    /// Bulkhead name, defaults to the executor name.
    pub name: Option<String>,
    pub max_concurrent: u32,
    pub partitions: HashMap<String, u32>,
}

impl Default for BulkheadSettings {
    fn default() -> Self {
        let defaults = BulkheadConfig::default();
        Self {
            name: None,
            max_concurrent: defaults.max_concurrent,
            partitions: HashMap::new(),
        }
    }
}

/// Rate limiting algorithm, tagged by `algorithm`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum RateLimiterSettings {
    TokenBucket { capacity: u64, refill_rate: f64 },
    SlidingWindow { max_requests: u64, window_ms: u64 },
}

impl RateLimiterSettings {
    pub fn to_algorithm(&self) -> Algorithm {
        match self {
            Self::TokenBucket {
                capacity,
                refill_rate,
            } => Algorithm::TokenBucket {
                capacity: *capacity,
                refill_rate: *refill_rate,
            },
            Self::SlidingWindow {
                max_requests,
                window_ms,
            } => Algorithm::SlidingWindowLog {
                max_requests: *max_requests,
                window: Duration::from_millis(*window_ms),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Breaker name, defaults to the executor name.
    pub name: Option<String>,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_max_probes: u32,
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            name: None,
            failure_threshold: defaults.failure_threshold,
            reset_timeout_ms: defaults.reset_timeout.as_millis() as u64,
            half_open_max_probes: defaults.half_open_max_probes,
            half_open_success_threshold: defaults.half_open_success_threshold,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_config(&self, default_name: &str) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(self.name.as_deref().unwrap_or(default_name))
            .failure_threshold(self.failure_threshold)
            .reset_timeout(Duration::from_millis(self.reset_timeout_ms))
            .half_open_max_probes(self.half_open_max_probes)
            .half_open_success_threshold(self.half_open_success_threshold)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff: BackoffSettings,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: RetryPolicy::default().max_attempts,
            backoff: BackoffSettings::default(),
        }
    }
}

/// Backoff strategy, tagged by `strategy`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackoffSettings {
    Immediate,
    Exponential {
        initial_ms: u64,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        #[serde(default = "default_max_ms")]
        max_ms: u64,
        #[serde(default)]
        jitter_ms: u64,
    },
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_ms() -> u64 {
    60_000
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self::Exponential {
            initial_ms: 100,
            multiplier: default_multiplier(),
            max_ms: default_max_ms(),
            jitter_ms: 0,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        let backoff = match &self.backoff {
            BackoffSettings::Immediate => Backoff::Immediate,
            BackoffSettings::Exponential {
                initial_ms,
                multiplier,
                max_ms,
                jitter_ms,
            } => Backoff::Exponential {
                initial: Duration::from_millis(*initial_ms),
                multiplier: *multiplier,
                max: Duration::from_millis(*max_ms),
                jitter: Duration::from_millis(*jitter_ms),
            },
        };
        RetryPolicy::new(self.max_attempts).backoff(backoff)
    }
}

impl ExecutorSettings {
    /// Load settings from a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let format = FileFormat::detect(path)?;
        let content = fs::read_to_string(path)?;

        debug!(path = %path.display(), format = ?format, "Loading executor settings");

        match format {
            FileFormat::Toml => Self::from_toml_str(&content),
            FileFormat::Json => Self::from_json_str(&content),
        }
    }

    /// Parse settings from TOML.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let settings: Self = toml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("TOML parse error: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from JSON.
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let settings: Self = serde_json::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("JSON parse error: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Assemble the executor described by these settings.
    pub fn build(&self) -> ConfigResult<ResilientExecutor> {
        self.build_with_listeners(EventListeners::new())
    }

    /// Assemble the executor, reporting events from it and its breaker to `listeners`.
    pub fn build_with_listeners(&self, listeners: EventListeners) -> ConfigResult<ResilientExecutor> {
        self.validate()?;

        let mut builder = ResilientExecutor::builder(self.name.as_str()).listeners(listeners.clone());

        if let Some(partition) = &self.partition {
            builder = builder.partition(partition.as_str());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(bulkhead) = &self.bulkhead {
            let config = BulkheadConfig {
                name: bulkhead.name.clone().unwrap_or_else(|| self.name.clone()),
                max_concurrent: bulkhead.max_concurrent,
                partitions: bulkhead.partitions.clone(),
            };
            builder = builder.bulkhead(Bulkhead::new(config)?);
        }
        if let Some(limiter) = &self.rate_limiter {
            builder = builder.rate_limiter(limiter.to_algorithm().build()?);
        }
        if let Some(breaker) = &self.circuit_breaker {
            builder = builder.circuit_breaker(CircuitBreaker::with_listeners(
                breaker.to_config(&self.name),
                listeners,
            )?);
        }
        if let Some(retry) = &self.retry {
            builder = builder.retry(retry.to_policy());
        }

        builder.build()
    }
}

impl Validate for ExecutorSettings {
    fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::invalid("timeout_ms", "must be greater than 0"));
        }
        if let Some(bulkhead) = &self.bulkhead {
            BulkheadConfig {
                name: self.name.clone(),
                max_concurrent: bulkhead.max_concurrent,
                partitions: bulkhead.partitions.clone(),
            }
            .validate()?;
        }
        if let Some(limiter) = &self.rate_limiter {
            limiter.to_algorithm().validate()?;
        }
        if let Some(breaker) = &self.circuit_breaker {
            breaker.to_config(&self.name).validate()?;
        }
        if let Some(retry) = &self.retry {
            retry.to_policy().validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOML: &str = r#"
        name = "payments"
        timeout_ms = 2000

        [bulkhead]
        max_concurrent = 16
        partitions = { payments = 4 }

        [rate_limiter]
        algorithm = "token_bucket"
        capacity = 100
        refill_rate = 20.0

        [circuit_breaker]
        failure_threshold = 5
        reset_timeout_ms = 30000

        [retry]
        max_attempts = 3
        backoff = { strategy = "exponential", initial_ms = 100, max_ms = 2000, jitter_ms = 25 }
    "#;

    #[test]
    fn test_parse_toml() {
        let settings = ExecutorSettings::from_toml_str(TOML).unwrap();

        assert_eq!(settings.name, "payments");
        assert_eq!(settings.timeout_ms, Some(2000));
        assert_eq!(settings.bulkhead.as_ref().unwrap().partitions["payments"], 4);
        assert_eq!(
            settings.rate_limiter,
            Some(RateLimiterSettings::TokenBucket {
                capacity: 100,
                refill_rate: 20.0
            })
        );

        let breaker = settings.circuit_breaker.as_ref().unwrap();
        assert_eq!(breaker.half_open_max_probes, 3);

        let policy = settings.retry.as_ref().unwrap().to_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(
            policy.backoff,
            Backoff::Exponential {
                initial: Duration::from_millis(100),
                multiplier: 2.0,
                max: Duration::from_millis(2000),
                jitter: Duration::from_millis(25),
            }
        );
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "name": "search",
            "rate_limiter": { "algorithm": "sliding_window", "max_requests": 2, "window_ms": 1000 },
            "retry": { "max_attempts": 4, "backoff": { "strategy": "immediate" } }
        }"#;

        let settings = ExecutorSettings::from_json_str(json).unwrap();
        assert_eq!(
            settings.rate_limiter.unwrap().to_algorithm(),
            Algorithm::SlidingWindowLog {
                max_requests: 2,
                window: Duration::from_secs(1)
            }
        );
        assert_eq!(settings.retry.unwrap().to_policy().backoff, Backoff::Immediate);
    }

    #[test]
    fn test_build_executor() {
        let executor = ExecutorSettings::from_toml_str(TOML).unwrap().build().unwrap();

        assert_eq!(executor.name(), "payments");
        assert_eq!(executor.partition(), "payments");
        assert_eq!(executor.timeout(), Some(Duration::from_secs(2)));
        assert_eq!(executor.bulkhead().unwrap().max_concurrent("payments"), 4);
        assert_eq!(executor.rate_limiter().unwrap().limit(), 100);
        assert_eq!(executor.circuit_breaker().unwrap().name(), "payments");
        assert_eq!(executor.retry_policy().max_attempts, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ExecutorSettings::from_toml_str(
            r#"
            name = "bad"
            [circuit_breaker]
            failure_threshold = 0
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "failure_threshold", .. }));

        let err = ExecutorSettings::from_toml_str(
            r#"
            name = "bad"
            [rate_limiter]
            algorithm = "token_bucket"
            capacity = 0
            refill_rate = 1.0
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::RateLimit(_)));

        let err = ExecutorSettings::from_json_str(r#"{ "name": "bad", "timeout_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "timeout_ms", .. }));

        let err = ExecutorSettings::from_json_str(r#"{ "name": "bad", "rate_limiter": { "algorithm": "leaky" } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_detects_format() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("executor.toml");
        std::fs::File::create(&toml_path)
            .unwrap()
            .write_all(TOML.as_bytes())
            .unwrap();
        assert_eq!(ExecutorSettings::load(&toml_path).unwrap().name, "payments");

        let json_path = dir.path().join("executor.json");
        std::fs::write(&json_path, r#"{ "name": "from-json" }"#).unwrap();
        assert_eq!(ExecutorSettings::load(&json_path).unwrap().name, "from-json");

        let yaml_path = dir.path().join("executor.yaml");
        std::fs::write(&yaml_path, "name: nope").unwrap();
        assert!(matches!(
            ExecutorSettings::load(&yaml_path),
            Err(ConfigError::UnsupportedFormat(_))
        ));

        assert!(matches!(
            ExecutorSettings::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_extension("json"), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_extension("TOML"), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_extension("env"), None);
    }
}
