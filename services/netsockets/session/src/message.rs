//! Received messages and their release handles.

use crate::{ConnectionHandle, SendFlags, SessionError};
use bytes::Bytes;
use netsockets_wire::PeerIdentity;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Owner of engine-side message storage
pub trait MessageRelease: Send + Sync {
    /// Free the storage behind `token`. False if it was already freed or
    /// never existed.
    fn release_message(&self, token: u64) -> bool;
}

/// Proof of ownership of one engine message
pub struct ReleaseHandle {
    owner: Arc<dyn MessageRelease>,
    token: u64,
}

impl ReleaseHandle {
    /// Wrap an engine token
    pub fn new(owner: Arc<dyn MessageRelease>, token: u64) -> Self {
        Self { owner, token }
    }

    /// Engine token
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Hand the message back to its owner
    pub fn release(self) -> bool {
        self.owner.release_message(self.token)
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHandle").field("token", &self.token).finish()
    }
}

/// A message exactly as the engine produced it
#[derive(Debug)]
pub struct RawMessage {
    /// Payload
    pub data: Bytes,
    /// Connection it arrived on
    pub connection: ConnectionHandle,
    /// Identity of the sender
    pub identity_peer: PeerIdentity,
    /// User data of the connection at receive time
    pub connection_user_data: i64,
    /// Local receive time in microseconds
    pub time_received: i64,
    /// Sender-assigned sequence number
    pub message_number: i64,
    /// Lane
    pub channel: i32,
    /// Flags the message was sent with
    pub flags: SendFlags,
    /// Storage handle; `None` once released
    pub release: Option<ReleaseHandle>,
}

/// Read-only view of one received message
///
/// The payload is borrowed from engine storage, not copied. Call
/// [`release`](MessageView::release) when done; a view dropped without
/// release logs a warning and leaves the engine storage allocated.
///
/// A released view cannot be used again:
///
/// ```compile_fail
/// # fn demo(view: netsockets_session::MessageView) {
/// view.release().ok();
/// let _ = view.data();
/// # }
/// ```
#[derive(Debug)]
pub struct MessageView {
    raw: RawMessage,
}

impl MessageView {
    pub(crate) fn from_raw(raw: RawMessage) -> Self {
        Self { raw }
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.raw.data
    }

    /// Payload length
    pub fn len(&self) -> usize {
        self.raw.data.len()
    }

    /// True for a zero-length message
    pub fn is_empty(&self) -> bool {
        self.raw.data.is_empty()
    }

    /// Connection it arrived on
    pub fn connection(&self) -> ConnectionHandle {
        self.raw.connection
    }

    /// Sender identity
    pub fn identity(&self) -> &PeerIdentity {
        &self.raw.identity_peer
    }

    /// Local receive time in microseconds
    pub fn time_received(&self) -> i64 {
        self.raw.time_received
    }

    /// Sender-assigned sequence number
    pub fn message_number(&self) -> i64 {
        self.raw.message_number
    }

    /// Lane
    pub fn channel(&self) -> i32 {
        self.raw.channel
    }

    /// Connection user data at receive time
    pub fn user_data(&self) -> i64 {
        self.raw.connection_user_data
    }

    /// Send flags
    pub fn flags(&self) -> SendFlags {
        self.raw.flags
    }

    /// Copy the payload into the front of `dest`
    pub fn copy_to(&self, dest: &mut [u8]) -> Result<usize, SessionError> {
        let len = self.raw.data.len();
        if dest.len() < len {
            return Err(SessionError::BufferTooSmall {
                needed: len,
                available: dest.len(),
            });
        }
        dest[..len].copy_from_slice(&self.raw.data);
        Ok(len)
    }

    /// Return the message storage to the engine
    pub fn release(mut self) -> Result<(), SessionError> {
        let handle = self.raw.release.take().ok_or_else(|| {
            SessionError::InvalidOperation("message not created by an engine".to_string())
        })?;
        if handle.release() {
            Ok(())
        } else {
            Err(SessionError::InvalidOperation(format!(
                "engine rejected release of message {} on {}",
                self.raw.message_number, self.raw.connection
            )))
        }
    }
}

impl Drop for MessageView {
    fn drop(&mut self) {
        if let Some(handle) = self.raw.release.take() {
            warn!(
                "Message dropped without release: conn={} number={} token={}",
                self.raw.connection,
                self.raw.message_number,
                handle.token()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Tracker {
        released: Mutex<Vec<u64>>,
    }

    impl MessageRelease for Tracker {
        fn release_message(&self, token: u64) -> bool {
            let mut released = self.released.lock().unwrap();
            if released.contains(&token) {
                return false;
            }
            released.push(token);
            true
        }
    }

    fn raw(owner: Option<Arc<Tracker>>, token: u64, data: &'static [u8]) -> RawMessage {
        RawMessage {
            data: Bytes::from_static(data),
            connection: ConnectionHandle(4),
            identity_peer: PeerIdentity::from_numeric_id(77),
            connection_user_data: -1,
            time_received: 10,
            message_number: 1,
            channel: 0,
            flags: SendFlags::RELIABLE,
            release: owner.map(|o| ReleaseHandle::new(o, token)),
        }
    }

    #[test]
    fn test_accessors_and_copy() {
        let view = MessageView::from_raw(raw(None, 0, b"hello"));
        assert_eq!(view.data(), b"hello");
        assert_eq!(view.len(), 5);
        assert_eq!(view.connection(), ConnectionHandle(4));
        assert_eq!(view.identity().numeric_id(), Some(77));

        let mut dest = [0u8; 8];
        assert_eq!(view.copy_to(&mut dest).unwrap(), 5);
        assert_eq!(&dest[..5], b"hello");

        let mut small = [0u8; 3];
        assert!(matches!(
            view.copy_to(&mut small),
            Err(SessionError::BufferTooSmall { needed: 5, available: 3 })
        ));
    }

    #[test]
    fn test_release_goes_to_owner() {
        let tracker = Arc::new(Tracker::default());
        let view = MessageView::from_raw(raw(Some(tracker.clone()), 9, b"x"));
        view.release().unwrap();
        assert_eq!(*tracker.released.lock().unwrap(), vec![9]);
    }

    #[test]
    fn test_release_without_engine_fails() {
        let view = MessageView::from_raw(raw(None, 0, b"x"));
        assert!(matches!(view.release(), Err(SessionError::InvalidOperation(_))));
    }

    #[test]
    fn test_release_rejected_by_engine() {
        let tracker = Arc::new(Tracker::default());
        tracker.released.lock().unwrap().push(5);
        let view = MessageView::from_raw(raw(Some(tracker), 5, b"x"));
        assert!(matches!(view.release(), Err(SessionError::InvalidOperation(_))));
    }

    #[test]
    fn test_drop_without_release_leaves_storage() {
        let tracker = Arc::new(Tracker::default());
        drop(MessageView::from_raw(raw(Some(tracker.clone()), 1, b"x")));
        assert!(tracker.released.lock().unwrap().is_empty());
    }
}
