//! Process-wide logging setup.
//!
//! Library crates only emit `tracing` events; the embedding process calls
//! [`init_logging`] once to install the sink.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::fmt as fmt_layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the verbosity name.
pub const C_ENV_LOGGING_VERBOSITY: &str = "ZENML_LOGGING_VERBOSITY";

/// Log verbosity levels, named as in the Python framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumLogVerbosity {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Mapped onto `error`, the most severe `tracing` level.
    Critical,
}

impl EnumLogVerbosity {
    /// `EnvFilter` directive for this verbosity.
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

impl FromStr for EnumLogVerbosity {
    type Err = LogInitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(LogInitError::InvalidVerbosity(value.to_string())),
        }
    }
}

impl fmt::Display for EnumLogVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Error)]
pub enum LogInitError {
    #[error(
        "Invalid logging verbosity: `{0}`. Expected one of: ['DEBUG', 'INFO', 'WARN', 'ERROR', 'CRITICAL']"
    )]
    InvalidVerbosity(String),
    #[error("Failed to install global subscriber: {0}")]
    AlreadyInitialized(String),
}

/// Options for [`init_logging`].
#[derive(Debug, Clone)]
pub struct SpecLogOptions {
    /// Default verbosity, used when `RUST_LOG` is unset.
    pub verbosity: EnumLogVerbosity,
    /// Emit ANSI colors.
    pub if_ansi: bool,
    /// Include the event target (module path) in each line.
    pub if_show_target: bool,
}

impl Default for SpecLogOptions {
    fn default() -> Self {
        Self {
            verbosity: EnumLogVerbosity::Info,
            if_ansi: true,
            if_show_target: false,
        }
    }
}

impl SpecLogOptions {
    /// Defaults with verbosity taken from `ZENML_LOGGING_VERBOSITY`.
    pub fn from_env() -> Result<Self, LogInitError> {
        Self::from_env_value(std::env::var(C_ENV_LOGGING_VERBOSITY).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Result<Self, LogInitError> {
        let verbosity = match value {
            Some(v) if !v.trim().is_empty() => v.parse()?,
            _ => EnumLogVerbosity::default(),
        };
        Ok(Self {
            verbosity,
            ..Self::default()
        })
    }

    /// Filter from `RUST_LOG`, falling back to the configured verbosity.
    pub fn build_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.verbosity.as_directive()))
    }
}

/// Install the global `tracing` subscriber.
///
/// Fails when a global subscriber is already set.
pub fn init_logging(spec_log_options: &SpecLogOptions) -> Result<(), LogInitError> {
    tracing_subscriber::registry()
        .with(
            fmt_layer::layer()
                .with_ansi(spec_log_options.if_ansi)
                .with_target(spec_log_options.if_show_target)
                .with_level(true)
                .with_filter(spec_log_options.build_filter()),
        )
        .try_init()
        .map_err(|e| LogInitError::AlreadyInitialized(e.to_string()))
}
