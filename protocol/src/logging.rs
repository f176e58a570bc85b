//! # Structured Logging
//!
//! The library crates only emit `tracing` events; whoever embeds them
//! installs a subscriber once with [`try_init_logging`]. `RUST_LOG` wins
//! over the directives in [`LogSettings`] when it parses.
//!
//! Tests use [`try_init_test_logging`], which tolerates being called from
//! many tests in the same process.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    /// The configured filter directives do not parse.
    #[error("bad log directives: {0}")]
    Directive(#[from] ParseError),

    /// A global subscriber is already in place.
    #[error("logging already initialized: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for local development.
    #[default]
    Pretty,
    /// JSON lines for log aggregation.
    Json,
}

impl LogFormat {
    /// Accepts "json" or "pretty" (case-insensitive); anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// How an embedder wants logs emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directives, e.g. `vouch_contracts=debug,info`.
    pub directives: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            directives: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

fn filter(directives: &str) -> Result<EnvFilter, ParseError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(directives),
    }
}

/// Install the global tracing subscriber described by `settings`.
///
/// ```text
/// RUST_LOG=vouch_contracts=debug,vouch_protocol=info
/// ```
pub fn try_init_logging(settings: &LogSettings) -> Result<(), LoggingError> {
    let filter = filter(&settings.directives)?;
    match settings.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()?,
    }

    tracing::info!(format = ?settings.format, "logging initialized");
    Ok(())
}

/// Install a test-friendly subscriber writing through the test harness
/// capture. Returns `false` if a subscriber was already installed.
pub fn try_init_test_logging() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init()
        .is_ok()
}
