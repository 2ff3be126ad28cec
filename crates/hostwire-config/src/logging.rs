//! Log output formats.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How log records are rendered on stderr.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One flattened JSON object per record.
    #[default]
    Json,
    /// One human-readable line per record.
    Compact,
}

/// Error for a format name that is neither `json` nor `compact`.
pub type LogFormatParseError = strum::ParseError;
