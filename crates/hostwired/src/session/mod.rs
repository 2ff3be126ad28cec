//! Client session handling.
//!
//! A session owns one connection for as long as the client keeps it alive.
//! Each request line is validated, dispatched against the live driver and
//! answered with exactly one response, except a `null` function which ends
//! the session silently. Whatever happens, the connection is closed before
//! [`SessionHandler::run`] returns.

mod framing;

use std::fmt;
use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::context::WorkerContext;
use crate::dispatch::{
    DispatchFault, Dispatcher, Outcome, ProtocolFault, Request, Response, ResponseWriter,
};
use crate::registry::DriverRegistry;

use self::framing::{FrameError, LineReader};

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// A bidirectional client stream the worker can close.
pub trait Connection: Read + Write + Send {
    /// Shuts the stream down in both directions.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; callers log and ignore it.
    fn close(&mut self) -> io::Result<()>;
}

/// Errors raised while writing a response.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Writing to the connection failed.
    #[error("connection write failed: {0}")]
    Io(#[from] io::Error),
    /// The response could not be encoded.
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// A request without `keepAlive` was answered.
    Completed,
    /// The client sent a `null` function.
    Disconnected,
    /// The client closed the stream between requests.
    PeerClosed,
    /// The client violated the protocol.
    ProtocolFault,
    /// Reading or writing the connection failed.
    ConnectionLost,
    /// An unexpected worker-side fault interrupted the session.
    Unhandled,
    /// The driver stopped serving mid-session.
    DriverUnavailable,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::PeerClosed => "peer_closed",
            Self::ProtocolFault => "protocol_fault",
            Self::ConnectionLost => "connection_lost",
            Self::Unhandled => "unhandled",
            Self::DriverUnavailable => "driver_unavailable",
        };
        f.write_str(label)
    }
}

/// Runs the request loop for one client.
#[derive(Debug, Clone, Copy)]
pub struct SessionHandler<'a> {
    ctx: &'a WorkerContext,
}

impl<'a> SessionHandler<'a> {
    /// Builds a handler for the worker described by `ctx`.
    #[must_use]
    pub const fn new(ctx: &'a WorkerContext) -> Self {
        Self { ctx }
    }

    /// Serves `connection` until the session ends, then closes it.
    pub fn run(
        &self,
        registry: &mut DriverRegistry,
        connection: &mut dyn Connection,
        peer: &str,
    ) -> SessionEnd {
        debug!(target: SESSION_TARGET, peer, "session started");
        let served =
            panic::catch_unwind(AssertUnwindSafe(|| self.serve(registry, connection, peer)));
        let end = served.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(
                target: SESSION_TARGET,
                fault = "unhandled_worker_fault",
                peer,
                error = %message,
                "session aborted by unexpected fault"
            );
            send_failure(&mut *connection, peer);
            SessionEnd::Unhandled
        });
        if let Err(error) = connection.close() {
            debug!(target: SESSION_TARGET, peer, %error, "connection already closed");
        }
        self.ctx.reporter().session_closed(peer, end);
        end
    }

    fn serve(
        &self,
        registry: &mut DriverRegistry,
        connection: &mut dyn Connection,
        peer: &str,
    ) -> SessionEnd {
        let mut lines = LineReader::new();
        loop {
            let line = match lines.read_line(&mut *connection) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!(target: SESSION_TARGET, peer, "peer closed the connection");
                    return SessionEnd::PeerClosed;
                }
                Err(FrameError::TooLarge { size, max_size }) => {
                    let fault = ProtocolFault::RequestTooLarge { size, max_size };
                    return protocol_fault(connection, peer, &fault);
                }
                Err(FrameError::Io(error)) => {
                    warn!(
                        target: SESSION_TARGET,
                        fault = "connection_lost",
                        peer,
                        %error,
                        "failed to read request"
                    );
                    return SessionEnd::ConnectionLost;
                }
            };

            let request = match Request::parse(&line) {
                Ok(request) => request,
                Err(fault) => return protocol_fault(connection, peer, &fault),
            };
            let (keep_alive, function, args) = request.into_parts();

            let state = registry.state();
            let Some(driver) = registry.live() else {
                warn!(
                    target: SESSION_TARGET,
                    fault = "driver_not_ready",
                    peer,
                    %state,
                    "driver stopped serving during a session"
                );
                send_failure(connection, peer);
                return SessionEnd::DriverUnavailable;
            };

            let dispatched =
                Dispatcher::new(self.ctx).dispatch(driver, peer, function.as_deref(), args);
            let response = match dispatched {
                Ok(Outcome::Reply(value)) => Response::Result(value),
                Ok(Outcome::Disconnect) => {
                    debug!(target: SESSION_TARGET, peer, "client requested disconnect");
                    return SessionEnd::Disconnected;
                }
                Err(DispatchFault::Protocol(fault)) => {
                    return protocol_fault(connection, peer, &fault);
                }
                Err(DispatchFault::Driver(fault)) => {
                    warn!(
                        target: SESSION_TARGET,
                        fault = "driver_fault",
                        peer,
                        function = fault.function(),
                        cause = %fault.cause(),
                        "driver call failed"
                    );
                    Response::failure()
                }
            };

            match ResponseWriter::new(&mut *connection).write_response(&response) {
                Ok(()) => {}
                Err(SessionError::Io(error)) => {
                    warn!(
                        target: SESSION_TARGET,
                        fault = "connection_lost",
                        peer,
                        %error,
                        "failed to write response"
                    );
                    return SessionEnd::ConnectionLost;
                }
                Err(error @ SessionError::Encode(_)) => {
                    error!(
                        target: SESSION_TARGET,
                        fault = "unhandled_worker_fault",
                        peer,
                        %error,
                        "failed to encode response"
                    );
                    send_failure(connection, peer);
                    return SessionEnd::Unhandled;
                }
            }

            if !keep_alive {
                return SessionEnd::Completed;
            }
        }
    }
}

fn protocol_fault(
    connection: &mut dyn Connection,
    peer: &str,
    fault: &ProtocolFault,
) -> SessionEnd {
    warn!(
        target: SESSION_TARGET,
        fault = "protocol_fault",
        peer,
        error = %fault,
        "ending session after protocol violation"
    );
    send_failure(connection, peer);
    SessionEnd::ProtocolFault
}

/// Best-effort generic failure reply.
fn send_failure(connection: &mut dyn Connection, peer: &str) {
    if let Err(error) = ResponseWriter::new(connection).write_response(&Response::failure()) {
        debug!(target: SESSION_TARGET, peer, %error, "could not deliver failure reply");
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
