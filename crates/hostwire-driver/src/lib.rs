//! Driver-side contract for hostwire workers.
//!
//! A driver is a stateful object that exposes named methods to remote
//! clients. Driver authors implement [`Driver`] and describe their methods in
//! a [`MethodTable`]; the worker hosts one constructed [`DriverInstance`] at
//! a time and invokes methods by name with positional [`CallArgs`].
//!
//! Driver code lives in a loadable code unit, a [`DriverModule`], that a
//! [`DriverSource`] resolves from a locator. Two sources ship here:
//!
//! - [`LibrarySource`] loads `cdylib` driver libraries that use
//!   [`export_driver!`], shadow-copying each load so rebuilt libraries are
//!   picked up.
//! - [`Catalogue`] holds drivers linked into the host binary and treats a
//!   republication as a modification.
//!
//! Both report a [`ModificationMarker`] so the worker can detect changed code
//! and reload it.

mod args;
mod catalogue;
mod descriptor;
mod error;
pub mod export;
mod instance;
mod library;
mod marker;
mod module;
mod table;

pub use args::{CallArgs, reply};
pub use catalogue::{Catalogue, CatalogueUnit};
pub use descriptor::{MethodDescriptor, PRIVATE_PREFIX};
pub use error::{BoxedCause, DriverError, LoadError};
pub use instance::{Driver, DriverInstance};
pub use library::{LibraryModule, LibrarySource};
pub use marker::ModificationMarker;
pub use module::{DriverModule, DriverSource};
pub use table::{MethodTable, Thunk};
