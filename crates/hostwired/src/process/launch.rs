//! Sequences worker launch: bootstrap, driver load, listener and shutdown.

use std::io::{self, Write};
use std::sync::Arc;

use flume::Sender;
use tracing::{debug, info};

use hostwire_driver::DriverSource;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::context::WorkerContext;
use crate::controller::{WorkItem, WorkerController, WorkerExit, WorkerHandle};
use crate::health::{LifecycleReporter, StructuredReporter};
use crate::registry::DriverRegistry;
use crate::sources::resolve_source;
use crate::transport::{QueueHandler, SocketListener};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal, forward_shutdown};

/// Collaborators required to launch the worker.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn LifecycleReporter>,
    pub(crate) shutdown: S,
}

/// Runs the worker using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when configuration, telemetry, the listener or
/// signal handling cannot be set up. A driver that fails to load is not an
/// error here; it is reported as [`WorkerExit::LoadFailed`].
pub fn run_worker() -> Result<WorkerExit, LaunchError> {
    let plan = LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredReporter::new()),
        shutdown: SystemShutdownSignal::install()?,
    };
    run_worker_with(plan, &mut io::stdout().lock())
}

/// Maps a launch result to the process exit code.
#[must_use]
pub fn worker_exit_code(result: &Result<WorkerExit, LaunchError>) -> u8 {
    match result {
        Ok(exit) => exit.exit_code(),
        Err(error) if error.cli_error().is_some_and(|cli| !cli.use_stderr()) => 0,
        Err(_) => 1,
    }
}

/// Runs the worker with injected collaborators.
///
/// `out` receives the synthesised help text when the configuration asks to
/// describe the driver instead of serving it.
pub(crate) fn run_worker_with<L, S>(
    plan: LaunchPlan<L, S>,
    out: &mut dyn Write,
) -> Result<WorkerExit, LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
    } = plan;
    let ctx = bootstrap_with(&loader, reporter)?;
    let source = resolve_source(ctx.driver().locator());
    if ctx.config().describe_only() {
        describe(&ctx, source, out)?;
        return Ok(WorkerExit::Stopped);
    }
    serve(&ctx, source, shutdown)
}

fn describe(
    ctx: &WorkerContext,
    source: Box<dyn DriverSource>,
    out: &mut dyn Write,
) -> Result<(), LaunchError> {
    let mut registry = DriverRegistry::new(source);
    registry.load_initial(ctx)?;
    registry.refresh_if_needed(ctx);
    let text = registry.synthesized_help(ctx.driver().dispatch_method());
    registry.teardown_final(ctx);

    let Some(text) = text else {
        return Ok(());
    };
    writeln!(out, "{text}")
        .and_then(|()| out.flush())
        .map_err(|source| LaunchError::Output { source })
}

fn serve<S>(
    ctx: &WorkerContext,
    source: Box<dyn DriverSource>,
    shutdown: S,
) -> Result<WorkerExit, LaunchError>
where
    S: ShutdownSignal,
{
    let endpoint = ctx.config().listen();
    endpoint.prepare_filesystem()?;

    let (queue, inbox) = flume::unbounded();
    let (ready_sender, ready) = flume::bounded(1);
    let worker = WorkerController::new(ctx.clone(), source, inbox)
        .with_readiness(ready_sender)
        .spawn()
        .map_err(|source| LaunchError::Spawn { source })?;

    if !ready.recv().unwrap_or(false) {
        info!(
            target: PROCESS_TARGET,
            "driver failed to load; not accepting clients"
        );
        return Ok(worker.join());
    }

    let handler = Arc::new(QueueHandler::new(queue.clone()));
    let listener = match SocketListener::bind(endpoint).and_then(|bound| bound.start(handler)) {
        Ok(listener) => listener,
        Err(error) => {
            stop(&queue, worker);
            return Err(error.into());
        }
    };
    if let Err(error) = forward_shutdown(shutdown, queue.clone()) {
        listener.shutdown();
        stop(&queue, worker);
        return Err(error.into());
    }
    drop(queue);

    info!(
        target: PROCESS_TARGET,
        endpoint = %endpoint,
        "worker accepting clients"
    );
    let exit = worker.join();
    listener.shutdown();
    listener.join()?;
    info!(
        target: PROCESS_TARGET,
        ?exit,
        "shutdown sequence completed"
    );
    Ok(exit)
}

fn stop(queue: &Sender<WorkItem>, worker: WorkerHandle) -> WorkerExit {
    if queue.send(WorkItem::Shutdown).is_err() {
        debug!(target: PROCESS_TARGET, "controller already stopped");
    }
    worker.join()
}
