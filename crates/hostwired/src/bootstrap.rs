//! First launch step: configuration, then logging.

use std::sync::Arc;

use thiserror::Error;

use hostwire_config::{ConfigError, WorkerConfig};

use crate::context::WorkerContext;
use crate::health::LifecycleReporter;
use crate::telemetry::{self, TelemetryError};

/// Source of the worker configuration.
pub trait ConfigLoader: Send + Sync {
    /// Produces the configuration for this launch.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is unusable.
    fn load(&self) -> Result<WorkerConfig, ConfigError>;
}

/// Reads the process arguments and environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<WorkerConfig, ConfigError> {
        WorkerConfig::load()
    }
}

/// Hands out a configuration built in code.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader(WorkerConfig);

impl StaticConfigLoader {
    /// Serves `config` on every load.
    #[must_use]
    pub const fn new(config: WorkerConfig) -> Self {
        Self(config)
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<WorkerConfig, ConfigError> {
        Ok(self.0.clone())
    }
}

/// Why the worker could not get as far as loading its driver.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The configuration is unusable.
    #[error("configuration rejected: {source}")]
    Configuration {
        /// Loader error.
        #[source]
        source: ConfigError,
    },
    /// Logging could not be set up.
    #[error("logging setup failed: {source}")]
    Telemetry {
        /// Telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Loads the configuration and installs logging, reporting either outcome
/// through `reporter`.
///
/// # Errors
///
/// Returns [`BootstrapError`] when either step fails.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn LifecycleReporter>,
) -> Result<WorkerContext, BootstrapError> {
    reporter.bootstrap_starting();
    let prepared = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })
        .and_then(|config| {
            telemetry::install(&config)
                .map(|()| config)
                .map_err(|source| BootstrapError::Telemetry { source })
        });
    match prepared {
        Ok(config) => {
            reporter.bootstrap_succeeded(&config);
            Ok(WorkerContext::new(config, reporter))
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}
