//! Test double for [`LifecycleReporter`] that records events for assertions.

use std::sync::Mutex;

use hostwire_config::WorkerConfig;

use crate::bootstrap::BootstrapError;
use crate::health::LifecycleReporter;
use crate::registry::{DriverState, RefreshFailure, RegistryError};
use crate::session::SessionEnd;

/// Lifecycle events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    DriverLoaded(String),
    DriverLoadFailed(String),
    DriverReady(String),
    DriverFailed { identity: String, message: String },
    HandoffDropped { peer: String, state: DriverState },
    SessionClosed { peer: String, end: SessionEnd },
    LoopFault(String),
    WorkerStopped,
}

/// Records lifecycle events.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .clone()
    }

    pub fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(event);
    }

    /// Number of events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&LifecycleEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    /// How the most recent session ended.
    pub fn last_session_end(&self) -> Option<SessionEnd> {
        self.events().iter().rev().find_map(|event| match event {
            LifecycleEvent::SessionClosed { end, .. } => Some(*end),
            _ => None,
        })
    }
}

impl LifecycleReporter for RecordingReporter {
    fn bootstrap_starting(&self) {
        self.record(LifecycleEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &WorkerConfig) {
        self.record(LifecycleEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(LifecycleEvent::BootstrapFailed(error.to_string()));
    }

    fn driver_loaded(&self, identity: &str) {
        self.record(LifecycleEvent::DriverLoaded(identity.to_owned()));
    }

    fn driver_load_failed(&self, error: &RegistryError) {
        self.record(LifecycleEvent::DriverLoadFailed(error.to_string()));
    }

    fn driver_ready(&self, identity: &str) {
        self.record(LifecycleEvent::DriverReady(identity.to_owned()));
    }

    fn driver_failed(&self, identity: &str, failure: &RefreshFailure) {
        self.record(LifecycleEvent::DriverFailed {
            identity: identity.to_owned(),
            message: failure.to_string(),
        });
    }

    fn handoff_dropped(&self, peer: &str, state: DriverState) {
        self.record(LifecycleEvent::HandoffDropped {
            peer: peer.to_owned(),
            state,
        });
    }

    fn session_closed(&self, peer: &str, end: SessionEnd) {
        self.record(LifecycleEvent::SessionClosed {
            peer: peer.to_owned(),
            end,
        });
    }

    fn loop_fault(&self, message: &str) {
        self.record(LifecycleEvent::LoopFault(message.to_owned()));
    }

    fn worker_stopped(&self) {
        self.record(LifecycleEvent::WorkerStopped);
    }
}
