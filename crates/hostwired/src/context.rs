//! Per-worker context threaded through the controller, registry and
//! dispatcher.

use std::fmt;
use std::sync::Arc;

use hostwire_config::{DriverConfig, WorkerConfig};

use crate::health::LifecycleReporter;

/// Immutable configuration plus the lifecycle reporter.
///
/// Cloning is cheap; clones share the same configuration and reporter.
#[derive(Clone)]
pub struct WorkerContext {
    config: Arc<WorkerConfig>,
    reporter: Arc<dyn LifecycleReporter>,
}

impl WorkerContext {
    /// Builds a context.
    #[must_use]
    pub fn new(config: WorkerConfig, reporter: Arc<dyn LifecycleReporter>) -> Self {
        Self {
            config: Arc::new(config),
            reporter,
        }
    }

    /// Resolved worker configuration.
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The hosted driver's configuration.
    #[must_use]
    pub fn driver(&self) -> &DriverConfig {
        self.config.driver()
    }

    /// Name used to label log records.
    #[must_use]
    pub fn worker_name(&self) -> &str {
        self.config.worker_name()
    }

    /// Lifecycle observer.
    #[must_use]
    pub fn reporter(&self) -> &dyn LifecycleReporter {
        self.reporter.as_ref()
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
