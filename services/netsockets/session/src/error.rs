//! Session error types.

use crate::ResultCode;
use netsockets_config::ConfigError;
use netsockets_wire::WireError;
use thiserror::Error;

/// Errors returned by the session facade
#[derive(Error, Debug)]
pub enum SessionError {
    /// Address or identity could not be parsed or encoded
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Configuration rejected the call
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A size or count limit was exceeded
    #[error("limit exceeded: {what} is {actual}, limit {limit}")]
    LimitExceeded {
        /// What was too large
        what: &'static str,
        /// Largest allowed value
        limit: usize,
        /// Value supplied
        actual: usize,
    },

    /// Object is in the wrong state for the call
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Call is not valid for this object
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Handle unknown, already closed, or the connection is dead
    #[error("no connection: {0}")]
    NoConnection(String),

    /// Caller buffer too small
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes the caller provided
        available: usize,
    },

    /// Engine failure with no more specific mapping
    #[error("engine returned {0:?}")]
    Engine(ResultCode),
}

/// Session result type
pub type Result<T> = std::result::Result<T, SessionError>;
