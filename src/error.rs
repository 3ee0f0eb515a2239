//-----------------------------------------------------------------------------
// Module error
// Error type of the HEX image loader and the address resolver

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse error classes as seen by the callers (import pipeline, web UI)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HexErrorCategory {
    /// HEX file missing or unreadable
    File,
    /// Malformed HEX record
    Format,
    /// Address range not covered by continuous data
    Range,
    /// Unsupported data type, missing axis description or internal size mismatch
    Config,
    /// Unparsable address or invalid element count
    Value,
}

#[derive(Error, Debug)]
pub enum HexError {
    #[error("Can not read HEX file '{}': {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid Intel-Hex record in line {line}: {reason}")]
    Format { line: usize, reason: String },

    #[error("Address 0x{address:X} (size {size}) is not within a continuous range of HEX data")]
    Range { address: u64, size: usize },

    #[error("Unsupported data type '{name}', supported types: {supported}")]
    UnknownType { name: String, supported: String },

    #[error("Unsupported byte order '{0}', supported: little, big, MSB_LAST, MSB_FIRST")]
    UnknownByteOrder(String),

    #[error("{value_type} needs {expected} bytes, got {actual}")]
    WidthMismatch { value_type: String, expected: usize, actual: usize },

    #[error("Characteristic '{name}' has no {axis} axis description")]
    MissingAxis { name: String, axis: &'static str },

    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Invalid element count {count} for '{name}', must be greater than 0")]
    InvalidCount { name: String, count: i64 },

    #[error("Requested an empty byte range at 0x{0:X}")]
    EmptyRange(u64),
}

impl HexError {
    pub fn category(&self) -> HexErrorCategory {
        match self {
            HexError::File { .. } => HexErrorCategory::File,
            HexError::Format { .. } => HexErrorCategory::Format,
            HexError::Range { .. } => HexErrorCategory::Range,
            HexError::UnknownType { .. } | HexError::UnknownByteOrder(_) | HexError::WidthMismatch { .. } | HexError::MissingAxis { .. } => HexErrorCategory::Config,
            HexError::InvalidAddress(_) | HexError::InvalidCount { .. } | HexError::EmptyRange(_) => HexErrorCategory::Value,
        }
    }

    pub(crate) fn format<T: Into<String>>(line: usize, reason: T) -> HexError {
        HexError::Format { line, reason: reason.into() }
    }
}

//-------------------------------------------------------------------------------------------------
// Test module
