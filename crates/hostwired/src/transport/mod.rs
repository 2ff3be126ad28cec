//! Socket listener for the worker endpoint.
//!
//! The listener binds the configured endpoint and accepts clients on a
//! background thread. Accepted connections are only handed over; serving
//! them is the controller's job.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod listener_tests;
mod stream;

pub use self::errors::ListenerError;
pub use self::handler::{ConnectionHandler, QueueHandler};
pub(crate) use self::listener::SocketListener;
pub use self::stream::ConnectionStream;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
