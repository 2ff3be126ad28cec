//! Installs the process-wide `tracing` subscriber.
//!
//! Records go to stderr as flattened JSON or compact text, per the
//! configured [`LogFormat`]. Only the first successful call installs
//! anything. Every call still validates its filter.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{EnvFilter, fmt};

use hostwire_config::{LogFormat, WorkerConfig};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Errors raised while setting up logging.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The log filter does not parse.
    #[error("invalid log filter '{filter}': {source}")]
    Filter {
        /// Configured filter expression.
        filter: String,
        /// Parser error.
        #[source]
        source: ParseError,
    },
    /// Another subscriber was already installed globally.
    #[error("cannot install log subscriber: {source}")]
    Install {
        /// Error from `tracing`.
        #[source]
        source: SetGlobalDefaultError,
    },
}

/// Validates the configured filter and installs the subscriber once.
pub(crate) fn install(config: &WorkerConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_new(config.log_filter()).map_err(|source| TelemetryError::Filter {
            filter: config.log_filter().to_owned(),
            source,
        })?;
    INSTALLED
        .get_or_try_init(|| set_global(filter, config.log_format()))
        .map(|&()| ())
}

fn set_global(filter: EnvFilter, format: LogFormat) -> Result<(), TelemetryError> {
    let base = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_thread_names(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(base.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(base.compact().finish()),
    };
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|source| TelemetryError::Install { source })
}
