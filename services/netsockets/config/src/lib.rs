//! Typed, scoped configuration values with scope inheritance for netsockets.
//!
//! This crate holds override values for engine tunables. Every key has a fixed
//! data type and a compiled-in default; overrides can be attached globally, to
//! the interface instance, to a listen socket, or to a single connection.
//!
//! ## Resolution
//!
//! ```text
//! Connection ──▶ ListenSocket (if accepted on one) ──▶ InterfaceInstance ──▶ Global ──▶ default
//! ```
//!
//! A lookup walks its [`ScopeChain`] from the narrowest object outward and
//! reports whether the value came from the requested scope (`Ok`) or from a
//! broader one (`OkInherited`).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod scope;
pub mod store;
pub mod value;

pub use error::ConfigError;
pub use key::{log_level, ConfigKey};
pub use scope::{ConfigScope, ScopeChain, ScopeTarget};
pub use store::{ConfigKeyInfo, ConfigStatus, ConfigStore, Resolved};
pub use value::{CallbackRef, ConfigDataType, ConfigValue};
