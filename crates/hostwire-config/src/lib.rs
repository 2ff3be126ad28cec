//! Configuration for hostwire workers.
//!
//! A worker hosts exactly one driver, so its configuration is small: the
//! driver triple (locator, entry point, optional generic dispatcher), the
//! endpoint to listen on, the bounded queue wait that also paces staleness
//! checks, and the logging setup. Values come from command-line flags with
//! `HOSTWIRE_*` environment fallbacks and are frozen once loaded; the worker
//! never re-reads them.

mod defaults;
mod logging;
mod socket;

use std::ffi::OsString;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TCP_PORT, DEFAULT_WORKER_NAME,
    default_log_filter, default_log_format, default_poll_interval, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{EndpointError, SocketDirError, SocketEndpoint};

/// Command-line surface of the worker binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "hostwired", about = "Hosts a hot-reloadable driver behind a socket")]
pub struct WorkerArgs {
    /// Name used to label log records.
    #[arg(long, env = "HOSTWIRE_WORKER_NAME", default_value = DEFAULT_WORKER_NAME)]
    pub worker_name: String,
    /// Locator of the driver code unit (a library path or `builtin:<name>`).
    #[arg(long, env = "HOSTWIRE_DRIVER")]
    pub driver: String,
    /// Zero-argument constructor used to build the driver instance.
    #[arg(long, env = "HOSTWIRE_ENTRY_POINT")]
    pub entry_point: String,
    /// Driver method that routes every call itself.
    #[arg(long, env = "HOSTWIRE_DISPATCH_METHOD")]
    pub dispatch_method: Option<String>,
    /// Endpoint to accept clients on (`tcp://host:port` or `unix:///path`).
    #[arg(long, env = "HOSTWIRE_LISTEN")]
    pub listen: Option<SocketEndpoint>,
    /// Bounded wait on the inbound queue in milliseconds.
    #[arg(long, env = "HOSTWIRE_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
    /// Tracing filter expression.
    #[arg(long, env = "HOSTWIRE_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
    /// Log output format (`json` or `compact`).
    #[arg(long, env = "HOSTWIRE_LOG_FORMAT", default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
    /// Print the driver's help text and exit without serving clients.
    #[arg(long)]
    pub describe: bool,
}

/// Identifies the driver a worker hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    locator: String,
    entry_point: String,
    dispatch_method: Option<String>,
}

impl DriverConfig {
    /// Builds a driver configuration without a generic dispatcher.
    #[must_use]
    pub fn new(locator: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            entry_point: entry_point.into(),
            dispatch_method: None,
        }
    }

    /// Routes every call through the named driver method.
    #[must_use]
    pub fn with_dispatch_method(mut self, method: impl Into<String>) -> Self {
        self.dispatch_method = Some(method.into());
        self
    }

    /// Locator of the driver code unit.
    #[must_use]
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Name of the zero-argument constructor.
    #[must_use]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Name of the generic dispatcher method, if configured.
    #[must_use]
    pub fn dispatch_method(&self) -> Option<&str> {
        self.dispatch_method.as_deref()
    }
}

/// Resolved, immutable worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    worker_name: String,
    driver: DriverConfig,
    listen: SocketEndpoint,
    poll_interval: Duration,
    log_filter: String,
    log_format: LogFormat,
    describe: bool,
}

impl WorkerConfig {
    /// Builds a configuration with defaults for everything but the driver.
    #[must_use]
    pub fn new(driver: DriverConfig) -> Self {
        Self {
            worker_name: DEFAULT_WORKER_NAME.to_owned(),
            listen: default_socket_endpoint(DEFAULT_WORKER_NAME),
            driver,
            poll_interval: default_poll_interval(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
            describe: false,
        }
    }

    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the arguments fail to parse or a value is
    /// unusable.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first item is the program name, as with [`std::env::args_os`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the arguments fail to parse or a value is
    /// unusable.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let parsed = WorkerArgs::try_parse_from(args).map_err(ConfigError::Cli)?;
        Self::from_args(parsed)
    }

    /// Validates parsed arguments into a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required value is blank or the poll
    /// interval is zero.
    pub fn from_args(args: WorkerArgs) -> Result<Self, ConfigError> {
        let WorkerArgs {
            worker_name,
            driver,
            entry_point,
            dispatch_method,
            listen,
            poll_interval_ms,
            log_filter,
            log_format,
            describe,
        } = args;

        let worker_name = non_blank("worker-name", worker_name)?;
        let mut driver_config = DriverConfig::new(
            non_blank("driver", driver)?,
            non_blank("entry-point", entry_point)?,
        );
        if let Some(method) = dispatch_method.filter(|method| !method.trim().is_empty()) {
            driver_config = driver_config.with_dispatch_method(method.trim());
        }
        if poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        Ok(Self {
            listen: listen.unwrap_or_else(|| default_socket_endpoint(&worker_name)),
            worker_name,
            driver: driver_config,
            poll_interval: Duration::from_millis(poll_interval_ms),
            log_filter,
            log_format,
            describe,
        })
    }

    /// Overrides the worker name.
    #[must_use]
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Overrides the listening endpoint.
    #[must_use]
    pub fn with_listen(mut self, endpoint: SocketEndpoint) -> Self {
        self.listen = endpoint;
        self
    }

    /// Overrides the bounded queue wait.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the log filter expression.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Name used to label log records.
    #[must_use]
    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// The hosted driver.
    #[must_use]
    pub const fn driver(&self) -> &DriverConfig {
        &self.driver
    }

    /// Endpoint to accept clients on.
    #[must_use]
    pub const fn listen(&self) -> &SocketEndpoint {
        &self.listen
    }

    /// Bounded wait on the inbound queue.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether the worker should print the driver help and exit.
    #[must_use]
    pub const fn describe_only(&self) -> bool {
        self.describe
    }
}

/// Errors raised while loading worker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line or environment parsing failed.
    #[error(transparent)]
    Cli(clap::Error),
    /// A required value was empty.
    #[error("configuration value '{field}' must not be blank")]
    Blank {
        /// Name of the offending flag.
        field: &'static str,
    },
    /// The bounded queue wait was zero.
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
}

fn non_blank(field: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Blank { field });
    }
    Ok(trimmed.to_owned())
}
