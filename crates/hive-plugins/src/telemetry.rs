//! Structured telemetry initialisation for hosts and plugins.
//!
//! Both sides log to standard error. A plugin's standard error is relayed by
//! its host, which understands the JSON format and re-emits each record at
//! its original level, so plugin binaries should keep the default
//! [`LogFormat::Json`].

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use strum::{Display, EnumString};
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Environment variable holding the log filter expression.
pub const LOG_FILTER_ENV_VAR: &str = "HIVE_LOG";

/// Environment variable holding the log output format.
pub const LOG_FORMAT_ENV_VAR: &str = "HIVE_LOG_FORMAT";

/// Filter applied when none is configured.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Supported logging output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for relaying and ingestion.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    log_filter: String,
    log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_FILTER, LogFormat::default())
    }
}

impl TelemetryConfig {
    /// Builds a configuration from an `EnvFilter` expression and a format.
    #[must_use]
    pub fn new(log_filter: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            log_filter: log_filter.into(),
            log_format,
        }
    }

    /// Reads [`LOG_FILTER_ENV_VAR`] and [`LOG_FORMAT_ENV_VAR`].
    ///
    /// Unset variables fall back to the defaults; an unrecognised format is
    /// reported as an error.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Format`] when the format variable holds an
    /// unknown value.
    pub fn from_env() -> Result<Self, TelemetryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`TelemetryConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TelemetryError> {
        let log_filter = lookup(LOG_FILTER_ENV_VAR)
            .filter(|filter| !filter.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned());
        let log_format = match lookup(LOG_FORMAT_ENV_VAR) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| TelemetryError::Format(raw.clone()))?,
            None => LogFormat::default(),
        };
        Ok(Self::new(log_filter, log_format))
    }

    /// Replaces the filter expression.
    #[must_use]
    pub fn with_log_filter(mut self, log_filter: impl Into<String>) -> Self {
        self.log_filter = log_filter.into();
        self
    }

    /// Replaces the output format.
    #[must_use]
    pub const fn with_log_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }

    /// Returns the filter expression.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// The configured log format is not recognised.
    #[error("unknown log format '{0}' (expected 'json' or 'compact')")]
    Format(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent: only the first invocation installs the
/// global subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an invalid filter expression and
/// [`TelemetryError::Subscriber`] when another subscriber is already
/// installed.
///
/// # Examples
///
/// ```rust
/// use hive_plugins::telemetry::{self, TelemetryConfig};
///
/// # fn main() -> Result<(), telemetry::TelemetryError> {
/// let config = TelemetryConfig::default();
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config)?;
/// drop(first);
/// drop(second);
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &TelemetryConfig) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_writer(io::stderr)
            // Plugin stderr is a pipe; colour codes would corrupt relayed JSON.
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
