//! Driver lifecycle: load, staleness detection, rebuild and teardown.
//!
//! The registry exclusively owns the loaded code unit and the live driver
//! instance. It is only ever touched from the controller thread, and only
//! between client sessions, so a rebuild can never overlap a request.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tracing::{debug, info, warn};

use hostwire_driver::{
    DriverError, DriverInstance, DriverModule, DriverSource, LoadError, MethodDescriptor,
    ModificationMarker,
};

use crate::context::WorkerContext;
use crate::dispatch;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Lifecycle state of the hosted driver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No instance has been built yet.
    Uninitialized,
    /// An instance is built and serving.
    Ready,
    /// Construction failed or the instance was torn down pending a reload.
    Errored,
    /// The worker is shutting down; terminal.
    Closed,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Errored => "errored",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Fatal failure of the initial load.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The driver code unit could not be resolved or loaded.
    #[error("failed to load driver '{locator}': {source}")]
    Load {
        /// Configured locator.
        locator: String,
        /// Underlying load failure.
        #[source]
        source: LoadError,
    },
}

/// Non-fatal failure of a rebuild attempt.
#[derive(Debug, Error)]
pub enum RefreshFailure {
    /// The code unit could not be re-read.
    #[error("reload failed: {0}")]
    Reload(#[source] LoadError),
    /// The entry point raised, or panicked, while building the instance.
    #[error("entry point '{entry_point}' failed: {source}")]
    Construct {
        /// Entry point that was called.
        entry_point: String,
        /// Error raised by driver code.
        #[source]
        source: DriverError,
    },
}

/// What a call to [`DriverRegistry::refresh_if_needed`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Nothing changed; no reload was attempted.
    Unchanged,
    /// A new instance was built and is serving.
    Rebuilt,
    /// A rebuild was attempted and failed; the driver is `Errored`.
    Failed,
}

/// Borrowed view of a serving driver: its instance and the module that built
/// it.
pub struct LiveDriver<'a> {
    /// The serving instance.
    pub instance: &'a mut DriverInstance,
    /// The code unit that built it.
    pub module: &'a dyn DriverModule,
}

/// Owner of the driver module and its single live instance.
pub struct DriverRegistry {
    // Declared before `module` so an instance never outlives its code.
    instance: Option<DriverInstance>,
    module: Option<Box<dyn DriverModule>>,
    source: Box<dyn DriverSource>,
    state: DriverState,
    loaded_marker: Option<ModificationMarker>,
    failed_marker: Option<ModificationMarker>,
}

impl DriverRegistry {
    /// Creates an empty registry that resolves drivers through `source`.
    #[must_use]
    pub fn new(source: Box<dyn DriverSource>) -> Self {
        Self {
            instance: None,
            module: None,
            source,
            state: DriverState::Uninitialized,
            loaded_marker: None,
            failed_marker: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> DriverState {
        self.state
    }

    /// Identity of the loaded module, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.module.as_deref().map(|module| module.identity())
    }

    /// Resolves and loads the configured code unit.
    ///
    /// The instance is not built here; the first refresh builds it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Load`] when the unit cannot be found or
    /// loaded. This is the only failure that terminates the worker.
    pub fn load_initial(&mut self, ctx: &WorkerContext) -> Result<(), RegistryError> {
        let locator = ctx.driver().locator();
        info!(target: REGISTRY_TARGET, locator, "loading driver code unit");
        let module = match self.source.load(locator) {
            Ok(module) => module,
            Err(source) => {
                let error = RegistryError::Load {
                    locator: locator.to_owned(),
                    source,
                };
                ctx.reporter().driver_load_failed(&error);
                return Err(error);
            }
        };
        self.loaded_marker = read_marker(module.as_ref());
        self.failed_marker = None;
        self.state = DriverState::Uninitialized;
        ctx.reporter().driver_loaded(module.identity());
        self.module = Some(module);
        Ok(())
    }

    /// Rebuilds the driver when it has never been built, or when its code
    /// unit changed since the last load or the last failed attempt.
    ///
    /// Must only be called while no client session is active.
    pub fn refresh_if_needed(&mut self, ctx: &WorkerContext) -> RefreshOutcome {
        let Some(module) = self.module.as_deref() else {
            return RefreshOutcome::Unchanged;
        };
        let current = read_marker(module);
        let needed = match self.state {
            DriverState::Uninitialized => true,
            DriverState::Ready => changed(current.as_ref(), self.loaded_marker.as_ref()),
            DriverState::Errored => changed(current.as_ref(), self.failed_marker.as_ref()),
            DriverState::Closed => false,
        };
        if !needed {
            return RefreshOutcome::Unchanged;
        }
        self.rebuild(ctx, current)
    }

    /// Tears down the instance and closes the registry. Called once at
    /// shutdown.
    pub fn teardown_final(&mut self, ctx: &WorkerContext) {
        self.release_instance(ctx);
        self.state = DriverState::Closed;
        self.module = None;
    }

    /// The serving driver, when the state is `Ready`.
    pub fn live(&mut self) -> Option<LiveDriver<'_>> {
        if self.state != DriverState::Ready {
            return None;
        }
        let instance = self.instance.as_mut()?;
        let module = self.module.as_deref()?;
        Some(LiveDriver { instance, module })
    }

    /// The serving instance, when the state is `Ready`.
    pub fn instance_mut(&mut self) -> Option<&mut DriverInstance> {
        self.live().map(|driver| driver.instance)
    }

    /// Module-level help text, if the loaded module provides any.
    #[must_use]
    pub fn module_help(&self) -> Option<Result<String, DriverError>> {
        self.module.as_deref().and_then(|module| module.help())
    }

    /// Descriptors of the serving instance; empty when not `Ready`.
    #[must_use]
    pub fn descriptors(&self) -> Vec<&MethodDescriptor> {
        match (&self.state, &self.instance) {
            (DriverState::Ready, Some(instance)) => instance.descriptors(),
            _ => Vec::new(),
        }
    }

    /// Help synthesised from the serving instance. Help the module supplies
    /// itself is not consulted. `None` before the initial load.
    #[must_use]
    pub fn synthesized_help(&self, dispatch_method: Option<&str>) -> Option<String> {
        self.module.as_ref()?;
        let instance = match self.state {
            DriverState::Ready => self.instance.as_ref(),
            _ => None,
        };
        Some(dispatch::synthesized_help(instance, dispatch_method))
    }

    fn rebuild(
        &mut self,
        ctx: &WorkerContext,
        current: Option<ModificationMarker>,
    ) -> RefreshOutcome {
        let reload_first =
            self.state != DriverState::Uninitialized || current != self.loaded_marker;
        info!(
            target: REGISTRY_TARGET,
            state = %self.state,
            reload = reload_first,
            "rebuilding driver instance"
        );
        self.release_instance(ctx);
        self.state = DriverState::Errored;

        let Some(module) = self.module.as_mut() else {
            return RefreshOutcome::Unchanged;
        };
        let identity = module.identity().to_owned();

        if reload_first {
            if let Err(error) = module.reload() {
                self.failed_marker = current;
                ctx.reporter()
                    .driver_failed(&identity, &RefreshFailure::Reload(error));
                return RefreshOutcome::Failed;
            }
            self.loaded_marker = current;
        }

        let entry_point = ctx.driver().entry_point();
        let built = panic::catch_unwind(AssertUnwindSafe(|| module.instantiate(entry_point)))
            .unwrap_or_else(|payload| Err(DriverError::from_panic(payload)));
        match built {
            Ok(instance) => {
                debug!(
                    target: REGISTRY_TARGET,
                    driver_type = instance.type_name(),
                    methods = instance.descriptors().len(),
                    "driver instance built"
                );
                self.instance = Some(instance);
                self.state = DriverState::Ready;
                self.failed_marker = None;
                ctx.reporter().driver_ready(&identity);
                RefreshOutcome::Rebuilt
            }
            Err(source) => {
                self.failed_marker = current;
                let failure = RefreshFailure::Construct {
                    entry_point: entry_point.to_owned(),
                    source,
                };
                ctx.reporter().driver_failed(&identity, &failure);
                RefreshOutcome::Failed
            }
        }
    }

    fn release_instance(&mut self, ctx: &WorkerContext) {
        let Some(mut instance) = self.instance.take() else {
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| instance.teardown()))
            .unwrap_or_else(|payload| Some(Err(DriverError::from_panic(payload))));
        match outcome {
            None => debug!(
                target: REGISTRY_TARGET,
                worker = ctx.worker_name(),
                "driver has no teardown hook"
            ),
            Some(Ok(())) => debug!(target: REGISTRY_TARGET, "driver instance torn down"),
            Some(Err(error)) => warn!(
                target: REGISTRY_TARGET,
                error = %error,
                "driver teardown failed; continuing"
            ),
        }
        drop(instance);
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("state", &self.state)
            .field("module", &self.identity())
            .finish_non_exhaustive()
    }
}

fn read_marker(module: &dyn DriverModule) -> Option<ModificationMarker> {
    match module.marker() {
        Ok(marker) => Some(marker),
        Err(error) => {
            debug!(
                target: REGISTRY_TARGET,
                driver = module.identity(),
                error = %error,
                "modification marker unavailable; treating as unchanged"
            );
            None
        }
    }
}

/// An unreadable marker never counts as a change.
fn changed(current: Option<&ModificationMarker>, recorded: Option<&ModificationMarker>) -> bool {
    current.is_some_and(|marker| recorded != Some(marker))
}
