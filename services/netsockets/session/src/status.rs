//! Connection state, status snapshots, and send flags.

use crate::{ConnectionHandle, ListenSocketHandle};
use bitflags::bitflags;
use netsockets_wire::{PeerIdentity, WireAddress};

/// Lifecycle state of a connection
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Unknown handle, or not yet created
    #[default]
    None = 0,
    /// Handshake in progress (outbound), or awaiting accept (inbound)
    Connecting = 1,
    /// Looking for a relay route
    FindingRoute = 2,
    /// Established; messages flow
    Connected = 3,
    /// The remote side closed the connection
    ClosedByPeer = 4,
    /// Failed locally (timeout, no listener, ...)
    ProblemDetectedLocally = 5,
}

impl ConnectionState {
    /// Dead but not yet closed by the application
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::ClosedByPeer | ConnectionState::ProblemDetectedLocally
        )
    }
}

impl TryFrom<i32> for ConnectionState {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectionState::None),
            1 => Ok(ConnectionState::Connecting),
            2 => Ok(ConnectionState::FindingRoute),
            3 => Ok(ConnectionState::Connected),
            4 => Ok(ConnectionState::ClosedByPeer),
            5 => Ok(ConnectionState::ProblemDetectedLocally),
            other => Err(other),
        }
    }
}

/// End reason codes reported in [`ConnectionInfo::end_reason`]
///
/// Applications close with codes up to [`MAX_APP_REASON`]; the engine uses
/// the higher ranges for failures it detects itself.
pub mod end_reason {
    /// No reason recorded
    pub const INVALID: i32 = 0;
    /// Largest code an application may close with
    pub const MAX_APP_REASON: i32 = 999;
    /// Start of the locally detected range
    pub const LOCAL_MIN: i32 = 3000;
    /// Local host has no usable network
    pub const LOCAL_OFFLINE_MODE: i32 = 3001;
    /// Start of the remote-caused range
    pub const REMOTE_MIN: i32 = 4000;
    /// Remote timed out
    pub const REMOTE_TIMEOUT: i32 = 4001;
    /// Start of the miscellaneous range
    pub const MISC_MIN: i32 = 5000;
    /// Could not reach the remote host at all
    pub const MISC_TIMEOUT: i32 = 5003;
}

/// Snapshot of one connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    /// Who is on the other end
    pub identity_remote: PeerIdentity,
    /// Application user data
    pub user_data: i64,
    /// Listen socket the connection was accepted on, if inbound
    pub listen_socket: Option<ListenSocketHandle>,
    /// Remote transport address
    pub remote_address: WireAddress,
    /// Remote point of presence (relayed connections only)
    pub pop_remote: u32,
    /// Relay point of presence (relayed connections only)
    pub pop_relay: u32,
    /// Current state
    pub state: ConnectionState,
    /// End reason once the connection has died
    pub end_reason: i32,
    /// Human-readable end reason
    pub end_debug: String,
    /// Human-readable description for logs
    pub description: String,
}

/// Fast-changing connection counters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuickStatus {
    /// Current state
    pub state: ConnectionState,
    /// Round-trip estimate in milliseconds
    pub ping_ms: i32,
    /// Fraction of packets delivered locally (0.0-1.0)
    pub quality_local: f32,
    /// Fraction of packets delivered remotely (0.0-1.0)
    pub quality_remote: f32,
    /// Messages sent per second
    pub out_packets_per_sec: f32,
    /// Bytes sent per second
    pub out_bytes_per_sec: f32,
    /// Messages received per second
    pub in_packets_per_sec: f32,
    /// Bytes received per second
    pub in_bytes_per_sec: f32,
    /// Estimated send rate in bytes per second
    pub send_rate_bytes_per_sec: i32,
    /// Unreliable bytes queued and not yet delivered
    pub pending_unreliable: i32,
    /// Reliable bytes queued and not yet delivered
    pub pending_reliable: i32,
    /// Reliable bytes delivered but not acknowledged
    pub sent_unacked_reliable: i32,
    /// Expected wait before a newly queued message goes out, in microseconds
    pub queue_time_us: i64,
}

/// A queued connection state change
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatusEvent {
    /// Connection that changed
    pub connection: ConnectionHandle,
    /// Snapshot taken when the change happened
    pub info: ConnectionInfo,
    /// State before the change
    pub old_state: ConnectionState,
}

bitflags! {
    /// Send behaviour flags
    ///
    /// The empty set is an unreliable, Nagle-delayed send.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SendFlags: u32 {
        /// Send now instead of waiting for more data
        const NO_NAGLE = 1;
        /// Drop the message rather than queue it if it cannot go out now
        const NO_DELAY = 4;
        /// Guaranteed, ordered delivery
        const RELIABLE = 8;
        /// Service the send on the calling thread
        const USE_CURRENT_THREAD = 16;
    }
}

impl SendFlags {
    /// Best-effort delivery
    pub const UNRELIABLE: SendFlags = SendFlags::empty();
    /// Unreliable, sent immediately
    pub const UNRELIABLE_NO_NAGLE: SendFlags = SendFlags::NO_NAGLE;
    /// Unreliable, dropped unless it can go out immediately
    pub const UNRELIABLE_NO_DELAY: SendFlags =
        SendFlags::NO_DELAY.union(SendFlags::NO_NAGLE);
    /// Reliable, sent immediately
    pub const RELIABLE_NO_NAGLE: SendFlags = SendFlags::RELIABLE.union(SendFlags::NO_NAGLE);

    /// True if delivery is guaranteed
    pub fn is_reliable(self) -> bool {
        self.contains(SendFlags::RELIABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_codes() {
        assert_eq!(ConnectionState::Connected as i32, 3);
        assert_eq!(ConnectionState::try_from(5), Ok(ConnectionState::ProblemDetectedLocally));
        assert_eq!(ConnectionState::try_from(9), Err(9));
        assert!(ConnectionState::ClosedByPeer.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
    }

    #[test]
    fn test_send_flag_bits() {
        assert_eq!(SendFlags::UNRELIABLE.bits(), 0);
        assert_eq!(SendFlags::UNRELIABLE_NO_DELAY.bits(), 5);
        assert_eq!(SendFlags::RELIABLE_NO_NAGLE.bits(), 9);
        assert!(SendFlags::RELIABLE_NO_NAGLE.is_reliable());
        assert!(!SendFlags::UNRELIABLE_NO_NAGLE.is_reliable());
    }
}
