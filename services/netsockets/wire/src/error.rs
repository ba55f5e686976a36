//! Wire codec error types.

use thiserror::Error;

/// Wire codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Incomplete input (need more bytes)
    #[error("incomplete input: need {needed} bytes, have {available}")]
    Incomplete {
        /// Bytes required to decode
        needed: usize,
        /// Bytes actually available
        available: usize,
    },

    /// Text or bytes are not a valid address or identity
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Payload size outside the allowed range
    #[error("size out of range: {0}")]
    Size(usize),

    /// Unknown identity discriminant
    #[error("unknown identity type {0}")]
    UnknownIdentityType(i32),
}
