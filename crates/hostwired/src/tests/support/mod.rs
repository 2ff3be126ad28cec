//! Shared doubles for the behavioural suites.

mod bench;
mod connection;
mod reporter;
mod world;

pub use connection::LinkFault;
pub use reporter::{LifecycleEvent, RecordingReporter};
pub use world::{PEER, WorkerWorld};
