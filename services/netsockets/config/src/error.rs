//! Configuration error types.

use crate::{ConfigDataType, ConfigKey};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Value type disagrees with the key's declared type
    #[error("type mismatch for {key}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Key being accessed
        key: ConfigKey,
        /// Declared type of the key
        expected: ConfigDataType,
        /// Type supplied or requested by the caller
        actual: ConfigDataType,
    },

    /// Scope object missing, unknown, or too narrow for the key
    #[error("bad scope object: {0}")]
    BadScopeObject(String),

    /// Unknown key or value outside the key's range
    #[error("bad value: {0}")]
    BadValue(String),

    /// Caller buffer cannot hold a string value
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required, including the NUL terminator
        needed: usize,
        /// Bytes the caller provided
        available: usize,
    },
}
