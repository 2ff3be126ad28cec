//! Response encoding.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use crate::session::SessionError;

/// Reply to one request, serialised as `{"result": ...}` or
/// `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    /// Successful call.
    Result(Value),
    /// Failed call; never carries the internal cause of a driver fault.
    Error(Value),
}

impl Response {
    /// The opaque failure indicator, `{"error": true}`.
    #[must_use]
    pub const fn failure() -> Self {
        Self::Error(Value::Bool(true))
    }
}

/// Writer that frames responses as JSON lines.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Wraps the output stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one response line and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if encoding or writing fails.
    pub fn write_response(&mut self, response: &Response) -> Result<(), SessionError> {
        let mut line = serde_json::to_vec(response)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }
}
