//! Loopback reference driver.
//!
//! Values written to the device are queued and read back in order. The
//! driver stands in for real hardware when exercising a worker: build this
//! crate as a `cdylib` and point the worker at the library, or use the
//! in-process [`catalogue_unit`] registered under `builtin:loopback`.

use std::collections::VecDeque;

use hostwire_driver::{
    CallArgs, CatalogueUnit, Driver, DriverError, MethodDescriptor, MethodTable, reply,
};
use serde_json::Value;

/// Locator under which the in-process build of this driver is published.
pub const BUILTIN_LOCATOR: &str = "builtin:loopback";

/// Queue depth of the default device.
pub const DEFAULT_CAPACITY: usize = 16;

const HELP: &str = "Loopback device: values written are read back in order.";

/// A bounded loopback device.
#[derive(Debug)]
pub struct Loopback {
    queue: VecDeque<Value>,
    capacity: usize,
    writes: u64,
}

impl Loopback {
    /// Opens a device with [`DEFAULT_CAPACITY`].
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the entry point contract.
    pub fn open() -> Result<Self, DriverError> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Opens a device that holds a single value.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the entry point contract.
    pub fn open_single() -> Result<Self, DriverError> {
        Self::with_capacity(1)
    }

    /// Opens a device holding up to `capacity` values.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidArguments`] for a zero capacity.
    pub fn with_capacity(capacity: usize) -> Result<Self, DriverError> {
        if capacity == 0 {
            return Err(DriverError::invalid_arguments("capacity must be positive"));
        }
        Ok(Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            writes: 0,
        })
    }

    fn write(&mut self, value: Value) -> Result<Value, DriverError> {
        if self.queue.len() >= self.capacity {
            return Err(DriverError::failed(format!(
                "loopback full ({} values queued)",
                self.capacity
            )));
        }
        self.queue.push_back(value);
        self.writes += 1;
        reply(self.queue.len())
    }

    fn read(&mut self) -> Value {
        self.queue.pop_front().unwrap_or(Value::Null)
    }

    fn status(&self) -> Result<Value, DriverError> {
        reply(serde_json::json!({
            "queued": self.queue.len(),
            "capacity": self.capacity,
            "writes": self.writes,
        }))
    }

    fn call(&mut self, function: &str, args: &CallArgs) -> Result<Value, DriverError> {
        match function {
            "ping" => reply("pong"),
            "echo" => {
                args.require_arity(1)?;
                args.get(0)
            }
            "write" => {
                args.require_arity(1)?;
                self.write(args.get(0)?)
            }
            "read" => Ok(self.read()),
            "status" => self.status(),
            "fail" => Err(DriverError::failed(
                args.get::<String>(0)
                    .unwrap_or_else(|_| String::from("requested failure")),
            )),
            _ => Err(DriverError::missing_method(function)),
        }
    }
}

fn route(driver: &mut Loopback, args: CallArgs) -> Result<Value, DriverError> {
    let mut values = args.into_inner().into_iter();
    let (Some(peer), Some(function)) = (values.next(), values.next()) else {
        return Err(DriverError::invalid_arguments(
            "route expects a peer and a function name",
        ));
    };
    let rest = CallArgs::new(values.collect());
    match function {
        Value::String(name) if name == "whoami" => Ok(peer),
        Value::String(name) => driver.call(&name, &rest),
        _ => Err(DriverError::invalid_arguments("function name must be a string")),
    }
}

impl Driver for Loopback {
    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new()
            .method(
                MethodDescriptor::new("ping", "ping(&self)").with_doc("Replies with \"pong\"."),
                |driver, args| {
                    args.require_arity(0)?;
                    driver.call("ping", &args)
                },
            )
            .method(
                MethodDescriptor::new("echo", "echo(&self, value)")
                    .with_doc("Returns its argument unchanged."),
                |driver, args| driver.call("echo", &args),
            )
            .method(
                MethodDescriptor::new("write", "write(&mut self, value)")
                    .with_doc("Queues a value and returns the queue depth."),
                |driver, args| driver.call("write", &args),
            )
            .method(
                MethodDescriptor::new("read", "read(&mut self)")
                    .with_doc("Pops the oldest queued value, or null."),
                |driver, args| driver.call("read", &args),
            )
            .method(
                MethodDescriptor::new("status", "status(&self)"),
                |driver, args| driver.call("status", &args),
            )
            .method(
                MethodDescriptor::new("fail", "fail(&self, message)")
                    .with_doc("Raises a driver error with the given message."),
                |driver, args| driver.call("fail", &args),
            )
            .method(
                MethodDescriptor::new("_route", "_route(&mut self, peer, function, *args)")
                    .with_doc("Routes a call by name; answers \"whoami\" with the peer."),
                route,
            )
            .method(MethodDescriptor::new("_drain", ""), |driver, _| {
                let drained = driver.queue.drain(..).collect::<Vec<_>>();
                reply(drained)
            })
    }

    fn teardown(&mut self) -> Option<Result<(), DriverError>> {
        self.queue.clear();
        Some(Ok(()))
    }
}

/// Module-level help text.
///
/// # Errors
///
/// Never fails; the signature matches the help contract.
pub fn help() -> Result<String, DriverError> {
    Ok(HELP.to_owned())
}

/// In-process build of this driver for [`hostwire_driver::Catalogue`].
#[must_use]
pub fn catalogue_unit() -> CatalogueUnit {
    CatalogueUnit::new()
        .entry_point("open_loopback", Loopback::open)
        .entry_point("open_single", Loopback::open_single)
        .help(help)
}

hostwire_driver::export_driver! {
    entry_points: [
        open_loopback => Loopback::open,
        open_single => Loopback::open_single,
    ],
    help: help,
}
