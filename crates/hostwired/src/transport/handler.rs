//! Handing accepted connections to the worker.

use flume::Sender;
use tracing::warn;

use super::{ConnectionStream, LISTENER_TARGET};
use crate::controller::{ClientHandoff, WorkItem};

/// Receives connections accepted by the listener.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Takes ownership of one accepted connection. Must not block for long;
    /// the accept loop waits for it.
    fn handle(&self, stream: ConnectionStream, peer: String);
}

/// Forwards every connection to the controller's inbound queue.
#[derive(Debug, Clone)]
pub struct QueueHandler {
    queue: Sender<WorkItem>,
}

impl QueueHandler {
    /// Builds a handler feeding `queue`.
    #[must_use]
    pub const fn new(queue: Sender<WorkItem>) -> Self {
        Self { queue }
    }
}

impl ConnectionHandler for QueueHandler {
    fn handle(&self, stream: ConnectionStream, peer: String) {
        let handoff = ClientHandoff::new(Box::new(stream), peer);
        if let Err(flume::SendError(WorkItem::Client(refused))) =
            self.queue.send(WorkItem::Client(handoff))
        {
            warn!(
                target: LISTENER_TARGET,
                peer = refused.peer(),
                "controller stopped; refusing client"
            );
            let mut connection = refused.into_connection();
            if let Err(error) = connection.close() {
                warn!(target: LISTENER_TARGET, %error, "failed to close refused client");
            }
        }
    }
}
