//! Request decoding and validation.
//!
//! A request is one JSON object with exactly three fields:
//!
//! ```json
//! {"keepAlive":true,"function":"read","args":[1]}
//! ```
//!
//! `function` may be `null`, which asks the worker to close the session
//! without replying.

use serde_json::{Map, Value};

use hostwire_driver::CallArgs;

use super::errors::ProtocolFault;

const KEEP_ALIVE: &str = "keepAlive";
const FUNCTION: &str = "function";
const ARGS: &str = "args";
const FIELDS: [&str; 3] = [KEEP_ALIVE, FUNCTION, ARGS];

/// A validated remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    keep_alive: bool,
    function: Option<String>,
    args: CallArgs,
}

impl Request {
    /// Decodes and validates one request line.
    ///
    /// Surrounding whitespace, including the newline delimiter, is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolFault::Malformed`] for an empty line or invalid JSON
    /// and [`ProtocolFault::InvalidStructure`] for schema violations.
    pub fn parse(line: &[u8]) -> Result<Self, ProtocolFault> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return Err(ProtocolFault::malformed("empty request line"));
        }
        let raw: Value = serde_json::from_slice(trimmed).map_err(ProtocolFault::from_json_error)?;
        Self::validate(raw)
    }

    /// Validates a decoded message against the request schema.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolFault::InvalidStructure`] unless `raw` is an object
    /// holding exactly `keepAlive` (boolean), `function` (string or null) and
    /// `args` (array).
    pub fn validate(raw: Value) -> Result<Self, ProtocolFault> {
        let Value::Object(mut fields) = raw else {
            return Err(ProtocolFault::invalid_structure("request must be an object"));
        };
        reject_unknown_fields(&fields)?;

        let keep_alive = match take(&mut fields, KEEP_ALIVE)? {
            Value::Bool(flag) => flag,
            _ => {
                return Err(ProtocolFault::invalid_structure(
                    "keepAlive must be a boolean",
                ));
            }
        };
        let function = match take(&mut fields, FUNCTION)? {
            Value::String(name) => Some(name),
            Value::Null => None,
            _ => {
                return Err(ProtocolFault::invalid_structure(
                    "function must be a string or null",
                ));
            }
        };
        let args = match take(&mut fields, ARGS)? {
            Value::Array(values) => CallArgs::new(values),
            _ => {
                return Err(ProtocolFault::invalid_structure(
                    "args must be an array of values",
                ));
            }
        };

        Ok(Self {
            keep_alive,
            function,
            args,
        })
    }

    /// Whether the session continues after this request is answered.
    #[must_use]
    pub const fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Requested function; `None` asks for a silent disconnect.
    #[must_use]
    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }

    /// Positional arguments.
    #[must_use]
    pub const fn args(&self) -> &CallArgs {
        &self.args
    }

    /// Splits the request into its parts.
    #[must_use]
    pub fn into_parts(self) -> (bool, Option<String>, CallArgs) {
        (self.keep_alive, self.function, self.args)
    }
}

fn reject_unknown_fields(fields: &Map<String, Value>) -> Result<(), ProtocolFault> {
    match fields.keys().find(|key| !FIELDS.contains(&key.as_str())) {
        Some(unknown) => Err(ProtocolFault::invalid_structure(format!(
            "unexpected field '{unknown}'"
        ))),
        None => Ok(()),
    }
}

fn take(fields: &mut Map<String, Value>, name: &str) -> Result<Value, ProtocolFault> {
    fields
        .remove(name)
        .ok_or_else(|| ProtocolFault::invalid_structure(format!("missing field '{name}'")))
}
