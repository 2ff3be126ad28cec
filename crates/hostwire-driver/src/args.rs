//! Positional call arguments.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DriverError;

/// Ordered positional arguments passed to a driver method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs(Vec<Value>);

impl CallArgs {
    /// Wraps the supplied values.
    #[must_use]
    pub const fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no arguments were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the raw values.
    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }

    /// Places `values` ahead of the existing arguments.
    #[must_use]
    pub fn prepend(self, values: impl IntoIterator<Item = Value>) -> Self {
        let mut combined: Vec<Value> = values.into_iter().collect();
        combined.extend(self.0);
        Self(combined)
    }

    /// Fails unless exactly `arity` arguments were supplied.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidArguments`] on a count mismatch.
    pub fn require_arity(&self, arity: usize) -> Result<(), DriverError> {
        if self.0.len() == arity {
            Ok(())
        } else {
            Err(DriverError::invalid_arguments(format!(
                "expected {arity} argument(s), got {}",
                self.0.len()
            )))
        }
    }

    /// Deserialises the argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidArguments`] when the argument is missing
    /// or has the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, DriverError> {
        let value = self.0.get(index).ok_or_else(|| {
            DriverError::invalid_arguments(format!("missing argument at position {index}"))
        })?;
        serde_json::from_value(value.clone()).map_err(|error| {
            DriverError::invalid_arguments(format!("argument {index}: {error}"))
        })
    }
}

impl From<Vec<Value>> for CallArgs {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Serialises a method's return value.
///
/// # Errors
///
/// Returns [`DriverError::Failed`] when the value cannot be represented as
/// JSON.
pub fn reply<T: Serialize>(value: T) -> Result<Value, DriverError> {
    serde_json::to_value(value)
        .map_err(|error| DriverError::with_source("result is not serialisable", error))
}
