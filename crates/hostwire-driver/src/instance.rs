//! The driver trait and its type-erased, hosted form.

use std::fmt;

use serde_json::Value;

use crate::args::CallArgs;
use crate::descriptor::MethodDescriptor;
use crate::error::DriverError;
use crate::table::MethodTable;

/// A stateful object exposing named methods to remote clients.
pub trait Driver: Sized + Send + 'static {
    /// Capability table for this driver type.
    fn methods() -> MethodTable<Self>;

    /// Releases hardware or other resources before the instance is dropped.
    ///
    /// Returns `None` when the driver has nothing to release.
    fn teardown(&mut self) -> Option<Result<(), DriverError>> {
        None
    }
}

trait ErasedDriver: Send {
    fn descriptors(&self) -> Vec<&MethodDescriptor>;
    fn descriptor(&self, name: &str) -> Option<&MethodDescriptor>;
    fn invoke(&mut self, name: &str, args: CallArgs) -> Result<Value, DriverError>;
    fn teardown(&mut self) -> Option<Result<(), DriverError>>;
}

struct Bound<D: Driver> {
    driver: D,
    table: MethodTable<D>,
}

impl<D: Driver> ErasedDriver for Bound<D> {
    fn descriptors(&self) -> Vec<&MethodDescriptor> {
        self.table.descriptors().collect()
    }

    fn descriptor(&self, name: &str) -> Option<&MethodDescriptor> {
        self.table.descriptor(name)
    }

    fn invoke(&mut self, name: &str, args: CallArgs) -> Result<Value, DriverError> {
        let thunk = self
            .table
            .thunk(name)
            .ok_or_else(|| DriverError::missing_method(name))?;
        thunk(&mut self.driver, args)
    }

    fn teardown(&mut self) -> Option<Result<(), DriverError>> {
        self.driver.teardown()
    }
}

/// A constructed driver paired with its capability table.
pub struct DriverInstance {
    inner: Box<dyn ErasedDriver>,
    type_name: &'static str,
}

impl DriverInstance {
    /// Hosts `driver`.
    #[must_use]
    pub fn new<D: Driver>(driver: D) -> Self {
        Self {
            inner: Box::new(Bound {
                driver,
                table: D::methods(),
            }),
            type_name: std::any::type_name::<D>(),
        }
    }

    /// Rust type name of the hosted driver.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Every declared method, private ones included, in name order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<&MethodDescriptor> {
        self.inner.descriptors()
    }

    /// Methods a client may call directly.
    #[must_use]
    pub fn public_descriptors(&self) -> Vec<&MethodDescriptor> {
        self.inner
            .descriptors()
            .into_iter()
            .filter(|descriptor| !descriptor.is_private())
            .collect()
    }

    /// Looks up any method, private ones included.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&MethodDescriptor> {
        self.inner.descriptor(name)
    }

    /// Invokes `name` with positional arguments.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingMethod`] when no such method exists, or
    /// whatever error the method itself raises.
    pub fn invoke(&mut self, name: &str, args: CallArgs) -> Result<Value, DriverError> {
        self.inner.invoke(name, args)
    }

    /// Runs the driver's teardown hook.
    #[must_use = "teardown failures should be reported"]
    pub fn teardown(&mut self) -> Option<Result<(), DriverError>> {
        self.inner.teardown()
    }
}

impl fmt::Debug for DriverInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverInstance")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}
