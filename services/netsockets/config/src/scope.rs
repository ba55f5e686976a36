//! Configuration scopes and lookup chains.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Scope at which a value may be overridden, narrowest last
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigScope {
    /// Process-wide
    Global = 1,
    /// One interface instance
    InterfaceInstance = 2,
    /// One listen socket and the connections accepted on it
    ListenSocket = 3,
    /// One connection
    Connection = 4,
}

impl ConfigScope {
    /// Next broader scope, `None` for Global
    pub fn broader(self) -> Option<ConfigScope> {
        match self {
            ConfigScope::Global => None,
            ConfigScope::InterfaceInstance => Some(ConfigScope::Global),
            ConfigScope::ListenSocket => Some(ConfigScope::InterfaceInstance),
            ConfigScope::Connection => Some(ConfigScope::ListenSocket),
        }
    }

    /// True if targets at this scope carry an object handle
    pub fn requires_handle(self) -> bool {
        matches!(self, ConfigScope::ListenSocket | ConfigScope::Connection)
    }
}

/// Concrete object a value is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeTarget {
    /// Process-wide
    Global,
    /// The interface instance
    InterfaceInstance,
    /// A listen socket handle
    ListenSocket(u32),
    /// A connection handle
    Connection(u32),
}

impl ScopeTarget {
    /// Scope of this target
    pub fn scope(&self) -> ConfigScope {
        match self {
            ScopeTarget::Global => ConfigScope::Global,
            ScopeTarget::InterfaceInstance => ConfigScope::InterfaceInstance,
            ScopeTarget::ListenSocket(_) => ConfigScope::ListenSocket,
            ScopeTarget::Connection(_) => ConfigScope::Connection,
        }
    }

    /// Object handle, if the scope has one
    pub fn handle(&self) -> Option<u32> {
        match self {
            ScopeTarget::ListenSocket(h) | ScopeTarget::Connection(h) => Some(*h),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeTarget::Global => f.write_str("global"),
            ScopeTarget::InterfaceInstance => f.write_str("interface"),
            ScopeTarget::ListenSocket(h) => write!(f, "listen_socket#{}", h),
            ScopeTarget::Connection(h) => write!(f, "connection#{}", h),
        }
    }
}

/// Ordered lookup list from the requested object out to Global
///
/// A connection accepted on a listen socket inherits from that socket; an
/// outbound connection inherits straight from the interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeChain {
    targets: SmallVec<[ScopeTarget; 4]>,
}

impl ScopeChain {
    /// `[Global]`
    pub fn global() -> Self {
        Self {
            targets: SmallVec::from_slice(&[ScopeTarget::Global]),
        }
    }

    /// `[InterfaceInstance, Global]`
    pub fn interface() -> Self {
        Self {
            targets: SmallVec::from_slice(&[ScopeTarget::InterfaceInstance, ScopeTarget::Global]),
        }
    }

    /// `[ListenSocket, InterfaceInstance, Global]`
    pub fn listen_socket(socket: u32) -> Self {
        Self {
            targets: SmallVec::from_slice(&[
                ScopeTarget::ListenSocket(socket),
                ScopeTarget::InterfaceInstance,
                ScopeTarget::Global,
            ]),
        }
    }

    /// `[Connection, ListenSocket?, InterfaceInstance, Global]`
    pub fn connection(connection: u32, accepted_on: Option<u32>) -> Self {
        let mut targets = SmallVec::new();
        targets.push(ScopeTarget::Connection(connection));
        if let Some(socket) = accepted_on {
            targets.push(ScopeTarget::ListenSocket(socket));
        }
        targets.push(ScopeTarget::InterfaceInstance);
        targets.push(ScopeTarget::Global);
        Self { targets }
    }

    /// Chain for an arbitrary target; `accepted_on` only applies to connections
    pub fn for_target(target: ScopeTarget, accepted_on: Option<u32>) -> Self {
        match target {
            ScopeTarget::Global => Self::global(),
            ScopeTarget::InterfaceInstance => Self::interface(),
            ScopeTarget::ListenSocket(h) => Self::listen_socket(h),
            ScopeTarget::Connection(h) => Self::connection(h, accepted_on),
        }
    }

    /// The object the lookup was made for
    pub fn requested(&self) -> ScopeTarget {
        self.targets[0]
    }

    /// Targets, narrowest first
    pub fn iter(&self) -> impl Iterator<Item = &ScopeTarget> {
        self.targets.iter()
    }

    /// Number of links in the chain
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Always false; every chain ends at Global
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
