//! The worker control loop.
//!
//! The controller owns the driver registry and drains the inbound queue on a
//! single thread. A client handoff runs a whole session before the next item
//! is taken; a wait that times out is the only moment a reload may happen.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use hostwire_driver::DriverSource;

use crate::context::WorkerContext;
use crate::registry::{DriverRegistry, DriverState};
use crate::session::{Connection, SessionHandler, panic_message};

const CONTROLLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::controller");

/// A client connection handed over by the listener.
pub struct ClientHandoff {
    connection: Box<dyn Connection>,
    peer: String,
}

impl ClientHandoff {
    /// Wraps an accepted connection and its peer address.
    pub fn new(connection: Box<dyn Connection>, peer: impl Into<String>) -> Self {
        Self {
            connection,
            peer: peer.into(),
        }
    }

    /// Peer address as reported by the listener.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Releases the connection.
    #[must_use]
    pub fn into_connection(self) -> Box<dyn Connection> {
        self.connection
    }
}

impl fmt::Debug for ClientHandoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandoff")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Items carried by the inbound queue.
#[derive(Debug)]
pub enum WorkItem {
    /// Serve this client.
    Client(ClientHandoff),
    /// Stop after the current iteration.
    Shutdown,
}

/// How the controller finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown was requested and the driver was torn down.
    Stopped,
    /// The driver could not be loaded at startup.
    LoadFailed,
}

impl WorkerExit {
    /// Process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::LoadFailed => 1,
        }
    }
}

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cycle {
    Served,
    Dropped,
    Refreshed,
    Faulted,
    Shutdown,
}

/// Runs the load, serve and shutdown phases of a worker.
pub struct WorkerController {
    ctx: WorkerContext,
    registry: DriverRegistry,
    inbox: Receiver<WorkItem>,
    readiness: Option<Sender<bool>>,
}

impl WorkerController {
    /// Builds a controller that resolves its driver through `source` and
    /// takes work from `inbox`.
    #[must_use]
    pub fn new(
        ctx: WorkerContext,
        source: Box<dyn DriverSource>,
        inbox: Receiver<WorkItem>,
    ) -> Self {
        Self {
            ctx,
            registry: DriverRegistry::new(source),
            inbox,
            readiness: None,
        }
    }

    /// Sends exactly one readiness flag on `sender` after the initial load.
    #[must_use]
    pub fn with_readiness(mut self, sender: Sender<bool>) -> Self {
        self.readiness = Some(sender);
        self
    }

    /// Read access to the registry.
    #[must_use]
    pub const fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Loads the driver, then serves the queue until shutdown.
    pub fn run(mut self) -> WorkerExit {
        if !self.load() {
            return WorkerExit::LoadFailed;
        }
        info!(
            target: CONTROLLER_TARGET,
            worker = self.ctx.worker_name(),
            poll_interval_ms = u64::try_from(self.ctx.config().poll_interval().as_millis())
                .unwrap_or(u64::MAX),
            "worker ready for clients"
        );
        while self.run_cycle() != Cycle::Shutdown {}
        self.shutdown();
        WorkerExit::Stopped
    }

    /// Runs [`Self::run`] on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised when the thread cannot be spawned.
    pub fn spawn(self) -> std::io::Result<WorkerHandle> {
        let name = format!("{}-controller", self.ctx.worker_name());
        let handle = thread::Builder::new().name(name).spawn(move || self.run())?;
        Ok(WorkerHandle { handle })
    }

    /// Performs the initial load and emits the readiness flag.
    pub(crate) fn load(&mut self) -> bool {
        let loaded = self.registry.load_initial(&self.ctx).is_ok();
        if let Some(sender) = self.readiness.take()
            && sender.send(loaded).is_err()
        {
            debug!(target: CONTROLLER_TARGET, "readiness receiver dropped");
        }
        loaded
    }

    /// Takes at most one item from the queue and acts on it.
    pub(crate) fn run_cycle(&mut self) -> Cycle {
        let received = self.inbox.recv_timeout(self.ctx.config().poll_interval());
        let item = match received {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => {
                return self.guarded(|controller| {
                    controller.registry.refresh_if_needed(&controller.ctx);
                    Cycle::Refreshed
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!(target: CONTROLLER_TARGET, "inbound queue closed; shutting down");
                return Cycle::Shutdown;
            }
        };
        match item {
            WorkItem::Shutdown => {
                info!(target: CONTROLLER_TARGET, "shutdown requested");
                Cycle::Shutdown
            }
            WorkItem::Client(handoff) => self.guarded(move |controller| controller.serve(handoff)),
        }
    }

    fn serve(&mut self, handoff: ClientHandoff) -> Cycle {
        let ClientHandoff {
            mut connection,
            peer,
        } = handoff;
        let state = self.registry.state();
        if state != DriverState::Ready {
            self.ctx.reporter().handoff_dropped(&peer, state);
            if let Err(error) = connection.close() {
                debug!(
                    target: CONTROLLER_TARGET,
                    peer = %peer,
                    %error,
                    "dropped connection already closed"
                );
            }
            if state == DriverState::Uninitialized {
                self.registry.refresh_if_needed(&self.ctx);
            }
            return Cycle::Dropped;
        }
        let end =
            SessionHandler::new(&self.ctx).run(&mut self.registry, connection.as_mut(), &peer);
        debug!(target: CONTROLLER_TARGET, peer = %peer, %end, "client served");
        Cycle::Served
    }

    fn guarded(&mut self, step: impl FnOnce(&mut Self) -> Cycle) -> Cycle {
        panic::catch_unwind(AssertUnwindSafe(|| step(self))).unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            self.ctx.reporter().loop_fault(&message);
            Cycle::Faulted
        })
    }

    pub(crate) fn shutdown(&mut self) {
        for item in self.inbox.drain() {
            if let WorkItem::Client(mut handoff) = item
                && let Err(error) = handoff.connection.close()
            {
                warn!(
                    target: CONTROLLER_TARGET,
                    peer = handoff.peer(),
                    %error,
                    "failed to close pending client"
                );
            }
        }
        self.registry.teardown_final(&self.ctx);
        self.ctx.reporter().worker_stopped();
    }
}

impl fmt::Debug for WorkerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerController")
            .field("ctx", &self.ctx)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Handle to a controller running on its own thread.
#[derive(Debug)]
pub struct WorkerHandle {
    handle: thread::JoinHandle<WorkerExit>,
}

impl WorkerHandle {
    /// Waits for the controller to finish.
    ///
    /// A controller thread that panicked outside the guarded loop reports
    /// [`WorkerExit::LoadFailed`].
    #[must_use]
    pub fn join(self) -> WorkerExit {
        self.handle.join().unwrap_or_else(|payload| {
            warn!(
                target: CONTROLLER_TARGET,
                error = %panic_message(payload.as_ref()),
                "controller thread panicked"
            );
            WorkerExit::LoadFailed
        })
    }
}
