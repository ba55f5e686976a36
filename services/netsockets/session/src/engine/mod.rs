//! Boundary between the session facade and the transport engine.
//!
//! Everything below this trait (handshakes, encryption, congestion control,
//! relays) belongs to the engine. The facade only validates arguments,
//! converts results, and dispatches status callbacks.

pub mod loopback;

pub use loopback::LoopbackEngine;

use crate::{
    ConnectionHandle, ConnectionInfo, ConnectionStatusEvent, ListenSocketHandle, MessageSource,
    QuickStatus, RawMessage, SendFlags,
};
use netsockets_config::ConfigStore;
use netsockets_wire::{PeerIdentity, WireAddress};

/// Engine result codes
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// Success
    Ok = 1,
    /// Generic failure
    Fail = 2,
    /// Handle unknown or connection dead
    NoConnection = 3,
    /// Argument rejected
    InvalidParam = 8,
    /// Resource already in use
    Busy = 10,
    /// Object is in the wrong state for the call
    InvalidState = 11,
    /// Not permitted
    AccessDenied = 15,
    /// Operation timed out
    Timeout = 16,
    /// A queue or buffer is full
    LimitExceeded = 25,
    /// Connection attempt failed
    ConnectFailed = 35,
    /// The remote side went away
    RemoteDisconnect = 38,
    /// Request had no effect
    Ignored = 41,
}

impl ResultCode {
    /// True for [`ResultCode::Ok`]
    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

/// Low-level transport engine
///
/// Implementations must be callable from any thread. Status changes are
/// queued by the engine and handed out only through
/// [`run_status_callbacks`](TransportEngine::run_status_callbacks).
pub trait TransportEngine: Send + Sync {
    /// Bind a listen socket
    fn create_listen_socket(&self, addr: &WireAddress) -> Result<ListenSocketHandle, ResultCode>;

    /// Start an outbound connection; failure to reach the peer is reported
    /// later as a status change, not here
    fn connect(&self, addr: &WireAddress) -> Result<ConnectionHandle, ResultCode>;

    /// Accept an inbound connection that is still connecting
    fn accept_connection(&self, conn: ConnectionHandle) -> ResultCode;

    /// Close and free a connection. Returns false for a handle never issued.
    fn close_connection(
        &self,
        conn: ConnectionHandle,
        reason: i32,
        debug_text: &str,
        linger: bool,
    ) -> bool;

    /// Close a listen socket and every connection accepted on it
    fn close_listen_socket(&self, socket: ListenSocketHandle, debug_text: &str) -> bool;

    /// Queue one message, returning its message number
    fn send_message(
        &self,
        conn: ConnectionHandle,
        data: &[u8],
        flags: SendFlags,
    ) -> Result<i64, ResultCode>;

    /// Push out anything held back by Nagle
    fn flush_messages(&self, conn: ConnectionHandle) -> ResultCode;

    /// Append up to `max_messages` pending messages to `out`
    fn receive_batch(
        &self,
        source: MessageSource,
        out: &mut Vec<RawMessage>,
        max_messages: usize,
    ) -> usize;

    /// Snapshot of a connection
    fn connection_info(&self, conn: ConnectionHandle) -> Option<ConnectionInfo>;

    /// Counters for a connection
    fn quick_status(&self, conn: ConnectionHandle) -> Option<QuickStatus>;

    /// Multi-line human-readable status
    fn detailed_status(&self, conn: ConnectionHandle) -> Option<String>;

    /// Bound address of a listen socket
    fn listen_socket_address(&self, socket: ListenSocketHandle) -> Option<WireAddress>;

    /// Set application user data on a connection
    fn set_connection_user_data(&self, conn: ConnectionHandle, user_data: i64) -> bool;

    /// Application user data of a connection
    fn connection_user_data(&self, conn: ConnectionHandle) -> Option<i64>;

    /// Set the name used in logs for a connection
    fn set_connection_name(&self, conn: ConnectionHandle, name: &str) -> bool;

    /// Name used in logs for a connection
    fn connection_name(&self, conn: ConnectionHandle) -> Option<String>;

    /// Create two connections already connected to each other
    fn create_socket_pair(
        &self,
        use_network_loopback: bool,
        identity1: Option<&PeerIdentity>,
        identity2: Option<&PeerIdentity>,
    ) -> Result<(ConnectionHandle, ConnectionHandle), ResultCode>;

    /// Configuration overrides for this engine's objects
    fn config(&self) -> &ConfigStore;

    /// Drain queued status changes and hand each to `dispatch`
    ///
    /// `dispatch` runs without engine locks held, so it may call back into
    /// the engine. Changes queued while dispatching wait for the next call.
    fn run_status_callbacks(&self, dispatch: &mut dyn FnMut(ConnectionStatusEvent));

    /// Engine clock in microseconds
    fn local_timestamp(&self) -> i64;
}
