//! Palisade Logging
//!
//! Installs a `tracing` subscriber for applications that use Palisade. The
//! library crates only emit events through `tracing` macros; this crate
//! decides where they go.
//!
//! # Usage
//!
//! ```no_run
//! use palisade_log::{LogConfig, Format, Level};
//!
//! // Configure from the environment and keep the guard alive until exit
//! let _guard = LogConfig::from_env().init();
//!
//! // Or explicitly
//! let _guard = LogConfig::new()
//!     .level(Level::Debug)
//!     .format(Format::Pretty)
//!     .init();
//! ```
//!
//! # Environment Variables
//!
//! - `PALISADE_DEBUG=1` - Enable debug logging
//! - `PALISADE_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `PALISADE_LOG_FORMAT=json|pretty|compact` - Set output format
//! - `PALISADE_LOG_COLOR=1|0` - Enable/disable colors
//! - `RUST_LOG` - Full filter directive, overrides the level

use std::env;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use tracing_appender::rolling::Rotation;

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level of events to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Parse a level name. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Directive understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_directive().to_uppercase())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// JSON format for structured logging
    #[default]
    Json,
    /// Multi-line format for development
    Pretty,
    /// Compact single-line format
    Compact,
}

impl Format {
    /// Parse a format name. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

/// Where log events are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Output {
    /// Write to STDOUT (default)
    #[default]
    Stdout,
    /// Write to STDERR
    Stderr,
    /// Write to files in `directory`, rotated per `rotation`
    RollingFile {
        directory: PathBuf,
        prefix: String,
        rotation: Rotation,
    },
}

// ============================================================================
// Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Output destination
    pub output: Output,
    /// Whether ANSI colors are enabled
    pub color: bool,
    /// Whether to include the event target (module path)
    pub targets: bool,
    /// Full filter directive, overrides `level` when set
    pub env_filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            output: Output::Stdout,
            color: false, // JSON output doesn't use colors
            targets: true,
            env_filter: None,
        }
    }
}

fn flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl LogConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = lookup("PALISADE_DEBUG").is_some_and(|v| flag(&v));

        let level = lookup("PALISADE_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("PALISADE_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or_default();

        let color = lookup("PALISADE_LOG_COLOR")
            .map(|v| flag(&v))
            .unwrap_or(format != Format::Json);

        let env_filter = lookup("RUST_LOG").filter(|s| !s.trim().is_empty());

        Self {
            debug,
            level,
            format,
            color,
            env_filter,
            ..Default::default()
        }
    }

    /// Set log level
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set output format
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Set output destination
    pub fn output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_color(mut self, enable: bool) -> Self {
        self.color = enable;
        self
    }

    /// Enable or disable targets
    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    /// Set a custom filter such as `"palisade_core=debug,info"`
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter directive that [`init`](Self::init) will install.
    pub fn filter_directive(&self) -> String {
        match &self.env_filter {
            Some(filter) => filter.clone(),
            None => self.level.as_directive().to_string(),
        }
    }

    fn build_filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.filter_directive())
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_directive()))
    }

    /// Install the global subscriber.
    ///
    /// Returns a guard that flushes buffered events when dropped; keep it
    /// alive for the life of the program. Returns `None` when logging is off
    /// or a global subscriber is already installed.
    pub fn init(self) -> Option<WorkerGuard> {
        if self.level == Level::Off && self.env_filter.is_none() {
            return None;
        }

        let (writer, guard) = match &self.output {
            Output::Stdout => tracing_appender::non_blocking(io::stdout()),
            Output::Stderr => tracing_appender::non_blocking(io::stderr()),
            Output::RollingFile {
                directory,
                prefix,
                rotation,
            } => tracing_appender::non_blocking(tracing_appender::rolling::RollingFileAppender::new(
                rotation.clone(),
                directory,
                prefix,
            )),
        };

        let filter = self.build_filter();
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match self.format {
            Format::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_target(self.targets)
                        .with_current_span(true),
                )
                .try_init(),
            Format::Pretty => registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_writer(writer)
                        .with_ansi(self.color)
                        .with_target(self.targets),
                )
                .try_init(),
            Format::Compact => registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_writer(writer)
                        .with_ansi(self.color)
                        .with_target(self.targets),
                )
                .try_init(),
        };

        installed.ok().map(|_| guard)
    }
}
