//! Structured reporting for worker lifecycle events.

use std::sync::Arc;

use hostwire_config::WorkerConfig;

use crate::bootstrap::BootstrapError;
use crate::registry::{DriverState, RefreshFailure, RegistryError};
use crate::session::SessionEnd;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait LifecycleReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &WorkerConfig);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the driver code unit has been loaded at startup.
    fn driver_loaded(&self, identity: &str);

    /// Invoked when the initial load fails; the worker stops afterwards.
    fn driver_load_failed(&self, error: &RegistryError);

    /// Invoked when a freshly built driver instance starts serving.
    fn driver_ready(&self, identity: &str);

    /// Invoked when a reload or construction attempt fails.
    fn driver_failed(&self, identity: &str, failure: &RefreshFailure);

    /// Invoked when a client handoff is dropped because the driver is not
    /// ready.
    fn handoff_dropped(&self, peer: &str, state: DriverState);

    /// Invoked when a client session ends.
    fn session_closed(&self, peer: &str, end: SessionEnd);

    /// Invoked when an unexpected fault escapes a controller iteration.
    fn loop_fault(&self, message: &str);

    /// Invoked after final teardown, just before the worker exits.
    fn worker_stopped(&self);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &WorkerConfig) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn driver_loaded(&self, identity: &str) {
        (**self).driver_loaded(identity);
    }

    fn driver_load_failed(&self, error: &RegistryError) {
        (**self).driver_load_failed(error);
    }

    fn driver_ready(&self, identity: &str) {
        (**self).driver_ready(identity);
    }

    fn driver_failed(&self, identity: &str, failure: &RefreshFailure) {
        (**self).driver_failed(identity, failure);
    }

    fn handoff_dropped(&self, peer: &str, state: DriverState) {
        (**self).handoff_dropped(peer, state);
    }

    fn session_closed(&self, peer: &str, end: SessionEnd) {
        (**self).session_closed(peer, end);
    }

    fn loop_fault(&self, message: &str) {
        (**self).loop_fault(message);
    }

    fn worker_stopped(&self) {
        (**self).worker_stopped();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredReporter;

impl StructuredReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting worker bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &WorkerConfig) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            worker = %config.worker_name(),
            driver = %config.driver().locator(),
            entry_point = %config.driver().entry_point(),
            dispatch_method = config.driver().dispatch_method(),
            listen = %config.listen(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "worker bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "worker bootstrap failed"
        );
    }

    fn driver_loaded(&self, identity: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "driver_loaded",
            driver = %identity,
            "driver code unit loaded"
        );
    }

    fn driver_load_failed(&self, error: &RegistryError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "driver_load_failed",
            fault = "fatal_load_failure",
            error = %error,
            "driver code unit could not be loaded"
        );
    }

    fn driver_ready(&self, identity: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "driver_ready",
            driver = %identity,
            "driver instance ready"
        );
    }

    fn driver_failed(&self, identity: &str, failure: &RefreshFailure) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "driver_failed",
            fault = "driver_construct_failure",
            driver = %identity,
            error = %failure,
            "driver instance unavailable until the code unit changes"
        );
    }

    fn handoff_dropped(&self, peer: &str, state: DriverState) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "handoff_dropped",
            fault = "driver_not_ready",
            peer = %peer,
            state = %state,
            "client dropped; driver not ready"
        );
    }

    fn session_closed(&self, peer: &str, end: SessionEnd) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "session_closed",
            peer = %peer,
            end = %end,
            "client session closed"
        );
    }

    fn loop_fault(&self, message: &str) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "loop_fault",
            fault = "unhandled_worker_fault",
            error = %message,
            "unhandled fault in worker loop"
        );
    }

    fn worker_stopped(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "worker_stopped",
            "worker stopped"
        );
    }
}
