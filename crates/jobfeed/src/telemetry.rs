//! Process-wide logging setup.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::JobfeedError;

/// `RUST_LOG` wins over the configured level when it is set and parses.
fn env_filter(level: &str) -> Result<EnvFilter, JobfeedError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| JobfeedError::Telemetry(format!("invalid log level '{}': {}", level, e)))
}

/// Installs the global subscriber and routes `log` records into it.
///
/// Output goes to stderr so that command output on stdout stays parseable.
/// Can only succeed once per process.
pub fn init_logging(config: &LoggingConfig) -> Result<(), JobfeedError> {
    let filter = env_filter(&config.level)?;

    tracing_log::LogTracer::init().map_err(|e| JobfeedError::Telemetry(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            ),
        ),
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_target(true).with_writer(std::io::stderr)),
        ),
    };
    installed.map_err(|e| JobfeedError::Telemetry(e.to_string()))
}
