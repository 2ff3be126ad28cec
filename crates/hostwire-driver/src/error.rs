//! Errors raised by driver code and by driver loading.
//!
//! [`DriverError`] is what driver-owned code hands back to the host: a
//! failed call, rejected arguments, a missing entry point, or a caught
//! panic. [`LoadError`] covers resolving and (re)loading the code unit that
//! contains the driver. Non-clone sources are wrapped in `Arc` to keep the
//! enums cheap to move.

use std::any::Any;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error type carried as the cause of a driver failure.
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

/// Faults raised by driver-owned code.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver reported a failure.
    #[error("{message}")]
    Failed {
        /// Human-readable description.
        message: String,
        /// Optional underlying cause.
        #[source]
        source: Option<BoxedCause>,
    },
    /// The caller supplied unusable arguments.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Description of the mismatch.
        message: String,
    },
    /// Driver code panicked; the panic was caught at the boundary.
    #[error("driver panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },
    /// The code unit has no constructor with the requested name.
    #[error("entry point '{name}' not found")]
    MissingEntryPoint {
        /// Requested entry point.
        name: String,
    },
    /// The driver's capability table has no method with the requested name.
    #[error("method '{name}' not found")]
    MissingMethod {
        /// Requested method.
        name: String,
    },
}

impl DriverError {
    /// Builds a plain failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a failure that wraps an underlying cause.
    #[must_use]
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        Self::Failed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Builds an argument error.
    #[must_use]
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Converts a caught panic payload into a driver error.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_owned()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            String::from("non-string panic payload")
        };
        Self::Panicked { message }
    }

    /// Builds a missing entry point error.
    #[must_use]
    pub fn missing_entry_point(name: impl Into<String>) -> Self {
        Self::MissingEntryPoint { name: name.into() }
    }

    /// Builds a missing method error.
    #[must_use]
    pub fn missing_method(name: impl Into<String>) -> Self {
        Self::MissingMethod { name: name.into() }
    }
}

/// Errors raised while resolving or reloading a driver code unit.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Nothing exists at the locator.
    #[error("driver '{locator}' not found")]
    NotFound {
        /// Locator that failed to resolve.
        locator: String,
    },
    /// Reading the code unit from disk failed.
    #[error("failed to read driver '{path}': {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The dynamic loader rejected the library.
    #[error("failed to load driver library '{path}': {source}")]
    Library {
        /// Library path.
        path: PathBuf,
        /// Loader error.
        #[source]
        source: Arc<libloading::Error>,
    },
    /// A mandatory symbol is absent from the library.
    #[error("driver library '{path}' does not export '{symbol}'")]
    MissingSymbol {
        /// Library path.
        path: PathBuf,
        /// Symbol that was looked up.
        symbol: String,
    },
    /// The library was built against another driver ABI.
    #[error("driver library '{path}' uses ABI {found}, host expects {expected}")]
    AbiMismatch {
        /// Library path.
        path: PathBuf,
        /// ABI version of the host.
        expected: u32,
        /// ABI version reported by the library.
        found: u32,
    },
    /// The in-process catalogue lock was poisoned.
    #[error("driver catalogue is unavailable: {message}")]
    Catalogue {
        /// Description of the failure.
        message: String,
    },
}

impl LoadError {
    /// Builds a not-found error.
    #[must_use]
    pub fn not_found(locator: impl Into<String>) -> Self {
        Self::NotFound {
            locator: locator.into(),
        }
    }

    /// Builds an IO error for the given path.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic;

    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let payload = panic::catch_unwind(|| panic!("sensor on fire")).expect_err("panics");
        let error = DriverError::from_panic(payload);
        assert_eq!(error.to_string(), "driver panicked: sensor on fire");
    }

    #[test]
    fn formatted_panic_payloads_become_messages() {
        let channel = 3;
        let payload =
            panic::catch_unwind(|| panic!("channel {channel} missing")).expect_err("panics");
        let error = DriverError::from_panic(payload);
        assert!(matches!(error, DriverError::Panicked { ref message } if message == "channel 3 missing"));
    }

    #[test]
    fn failures_keep_their_cause() {
        let cause = io::Error::new(io::ErrorKind::TimedOut, "bus timeout");
        let error = DriverError::with_source("read failed", cause);
        let source = std::error::Error::source(&error).expect("cause retained");
        assert_eq!(source.to_string(), "bus timeout");
    }
}
