//! Request validation, routing and response encoding.

mod errors;
mod request;
mod response;
mod router;

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

pub use errors::{DispatchFault, DriverFault, ProtocolFault};
pub use request::Request;
pub use response::{Response, ResponseWriter};
pub use router::{Dispatcher, HELP_FUNCTION, Outcome, help, synthesized_help};
