//! # Structured Logging
//!
//! Installs the global `tracing` subscriber for hosts that embed the engine.
//! The engine itself only emits events; nothing is printed unless a
//! subscriber is installed.
//!
//! Output goes to stderr so that stdout stays free for whatever the host
//! prints. `RUST_LOG` overrides the configured default level.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for local development.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

impl LogFormat {
    /// Parses "json" or "pretty" (case-insensitive). Anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Failure to install the global subscriber.
#[derive(Debug, thiserror::Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct LoggingError(#[source] tracing_subscriber::util::TryInitError);

/// Installs the global subscriber, or reports why it could not.
///
/// Fails when another global subscriber is already set, which is the normal
/// case in test binaries that initialise logging from several tests.
///
/// # Environment
///
/// `RUST_LOG` takes precedence over `default_level`, e.g.:
///
/// ```text
/// RUST_LOG=quorum_custody=debug
/// ```
pub fn try_init_logging(default_level: &str, format: LogFormat) -> Result<(), LoggingError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .try_init()
                .map_err(LoggingError)?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
                .try_init()
                .map_err(LoggingError)?;
        }
    }

    tracing::info!(?format, "custody logging initialized");
    Ok(())
}

/// Installs the global subscriber.
///
/// Call once, early, from the host's `main`.
///
/// # Panics
///
/// Panics if a global subscriber is already installed. Use
/// [`try_init_logging`] where that can happen.
pub fn init_logging(default_level: &str, format: LogFormat) {
    if let Err(err) = try_init_logging(default_level, format) {
        panic!("{err}");
    }
}
