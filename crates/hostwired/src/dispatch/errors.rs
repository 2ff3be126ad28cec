//! Fault taxonomy for request validation and dispatch.
//!
//! A [`ProtocolFault`] is the client's mistake and ends the session after a
//! generic failure reply. A [`DriverFault`] is raised by driver code; the
//! cause is logged but only an opaque indicator reaches the client, and the
//! session carries on.

use thiserror::Error;

use hostwire_driver::DriverError;

/// Violations of the request protocol.
#[derive(Debug, Error)]
pub enum ProtocolFault {
    /// The request line could not be decoded.
    #[error("malformed request: {message}")]
    Malformed {
        /// Human-readable description.
        message: String,
        /// Decoder error, when decoding failed.
        #[source]
        source: Option<serde_json::Error>,
    },
    /// The decoded request does not match the schema.
    #[error("invalid request structure: {message}")]
    InvalidStructure {
        /// Human-readable description.
        message: String,
    },
    /// The requested function is not a public driver method.
    #[error("function '{function}' not found (names are case-sensitive)")]
    FunctionNotFound {
        /// Requested function.
        function: String,
    },
    /// The request line exceeds the framing limit.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge {
        /// Bytes buffered when the limit was hit.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },
}

impl ProtocolFault {
    /// Builds a decoding fault without an underlying error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a decoding fault from a JSON error.
    pub fn from_json_error(error: serde_json::Error) -> Self {
        Self::Malformed {
            message: error.to_string(),
            source: Some(error),
        }
    }

    /// Builds a schema fault.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Builds an unknown function fault.
    pub fn function_not_found(function: impl Into<String>) -> Self {
        Self::FunctionNotFound {
            function: function.into(),
        }
    }
}

/// Failure raised by driver-owned code while serving a call.
#[derive(Debug, Error)]
#[error("driver call '{function}' failed: {cause}")]
pub struct DriverFault {
    function: String,
    #[source]
    cause: DriverError,
}

impl DriverFault {
    /// Wraps `cause` raised while serving `function`.
    pub fn new(function: impl Into<String>, cause: DriverError) -> Self {
        Self {
            function: function.into(),
            cause,
        }
    }

    /// Function the client asked for.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Original error, for logging only.
    pub fn cause(&self) -> &DriverError {
        &self.cause
    }
}

/// Any fault raised while dispatching a validated request.
#[derive(Debug, Error)]
pub enum DispatchFault {
    /// Client-side protocol violation; propagated unchanged.
    #[error(transparent)]
    Protocol(#[from] ProtocolFault),
    /// Failure inside driver code.
    #[error(transparent)]
    Driver(#[from] DriverFault),
}
