//! Opaque object handles issued by the engine.

use std::fmt;

/// Handle to one connection
///
/// Zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(pub u32);

impl ConnectionHandle {
    /// The handle no connection ever has
    pub const INVALID: ConnectionHandle = ConnectionHandle(0);

    /// False for [`ConnectionHandle::INVALID`]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Handle to one listen socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenSocketHandle(pub u32);

impl ListenSocketHandle {
    /// The handle no listen socket ever has
    pub const INVALID: ListenSocketHandle = ListenSocketHandle(0);

    /// False for [`ListenSocketHandle::INVALID`]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ListenSocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listen#{}", self.0)
    }
}

/// Where a batch receive pulls messages from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    /// One connection's queue
    Connection(ConnectionHandle),
    /// Every connection accepted on a listen socket
    ListenSocket(ListenSocketHandle),
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageSource::Connection(h) => h.fmt(f),
            MessageSource::ListenSocket(h) => h.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_handles() {
        assert!(!ConnectionHandle::INVALID.is_valid());
        assert!(ConnectionHandle(7).is_valid());
        assert!(!ListenSocketHandle::INVALID.is_valid());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionHandle(3).to_string(), "conn#3");
        assert_eq!(MessageSource::ListenSocket(ListenSocketHandle(2)).to_string(), "listen#2");
    }
}
