//! Error types for the OSC core

use thiserror::Error;

/// Result type alias for OSC core operations
pub type Result<T> = std::result::Result<T, Error>;

/// OSC core error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer ended before a field was complete
    #[error("truncated input: need {needed} bytes, have {have}")]
    TruncatedInput { needed: usize, have: usize },

    /// Leading string is neither `#bundle` nor an address
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Type tag character outside the standard and skip sets
    #[error("unknown type tag: {0:?}")]
    UnknownTypeTag(char),

    /// Address pattern could not be tokenized
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Input cannot be represented as a time tag
    #[error("invalid time value: {0}")]
    InvalidTimeValue(String),

    /// Message address is empty, relative or contains pattern characters
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Argument cannot be coerced into the requested type tag
    #[error("cannot coerce {found} to type tag {tag:?}")]
    TypeMismatch { tag: char, found: String },

    /// Length does not fit the 32-bit length field or the configured maximum
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

impl From<std::convert::Infallible> for Error {
    fn from(e: std::convert::Infallible) -> Self {
        match e {}
    }
}
