//! A worker process that hosts one hot-reloadable driver behind a socket.
//!
//! The worker loads a driver code unit named by its configuration, builds a
//! driver instance from a zero-argument entry point and serves one client at
//! a time. Each client sends newline-delimited JSON requests of the form
//! `{"keepAlive": bool, "function": string|null, "args": [...]}` and
//! receives `{"result": ...}` or `{"error": ...}` in reply.
//!
//! ## Lifecycle
//!
//! A single controller thread owns the [`DriverRegistry`] and drains an
//! inbound queue fed by the socket listener. While a session runs nothing
//! else happens. When the queue stays empty for the poll interval, the
//! controller asks the registry whether the code unit changed; if it did, the
//! old instance is torn down and a new one is built. A failed rebuild leaves
//! the driver errored until the code unit changes again, so a broken driver
//! never causes a retry storm.
//!
//! Only a failure to load the driver at startup stops the worker. Faults in
//! driver code, protocol violations and lost connections end at most the
//! current session.

mod bootstrap;
mod context;
mod controller;
pub mod dispatch;
mod health;
mod process;
mod registry;
pub mod session;
mod sources;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use context::WorkerContext;
pub use controller::{ClientHandoff, WorkItem, WorkerController, WorkerExit, WorkerHandle};
pub use health::{LifecycleReporter, StructuredReporter};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_worker, worker_exit_code,
};
pub use registry::{
    DriverRegistry, DriverState, LiveDriver, RefreshFailure, RefreshOutcome, RegistryError,
};
pub use sources::{builtin_catalogue, is_builtin, resolve_source};
pub use telemetry::TelemetryError;

#[cfg(test)]
mod tests;
