//! Listener failures.

use std::io;

use thiserror::Error;

/// Errors raised while binding or running the listener.
///
/// Every one of them stops the worker before it accepts a client.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured host did not resolve.
    #[error("cannot resolve {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// The host resolved to nothing.
    #[error("{host}:{port} resolved to no addresses")]
    NoAddress {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// The socket could not be bound.
    #[error("cannot bind {endpoint}: {source}")]
    Bind {
        /// Address or socket path that was tried.
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// The bound socket could not be switched to polling mode.
    #[error("cannot configure listener on {endpoint}: {source}")]
    Configure {
        /// Bound endpoint.
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// Unix sockets are unavailable on this platform.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported: {endpoint}")]
    Unsupported {
        /// Configured endpoint.
        endpoint: String,
    },
    /// Something other than a socket occupies the socket path.
    #[error("{path} exists and is not a socket")]
    NotASocket {
        /// Socket path.
        path: String,
    },
    /// Another process answers on the socket path.
    #[error("another process is listening on {path}")]
    InUse {
        /// Socket path.
        path: String,
    },
    /// A stale socket file could not be inspected or removed.
    #[error("cannot reclaim socket path {path}: {source}")]
    Reclaim {
        /// Socket path.
        path: String,
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be started.
    #[error("failed to spawn accept thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("accept thread panicked")]
    Panicked,
}
