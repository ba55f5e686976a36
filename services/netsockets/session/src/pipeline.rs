//! Batched receive with per-thread buffer reuse.
//!
//! Each thread keeps one spare buffer of [`MAX_MESSAGES_PER_BATCH`] slots.
//! A receive takes the spare (or allocates one if a batch from this thread
//! is still alive), the engine fills it, and the buffer goes back to the
//! thread's slot when the batch is dropped. Steady-state receives therefore
//! allocate nothing, and concurrent receives on different threads never
//! share a buffer.

use crate::{MessageSource, MessageView, RawMessage, SessionError, TransportEngine};
use std::cell::Cell;
use tracing::{trace, warn};

/// Largest batch one receive may request
pub const MAX_MESSAGES_PER_BATCH: usize = 256;

thread_local! {
    static SPARE_BUFFER: Cell<Option<Vec<RawMessage>>> = const { Cell::new(None) };
}

fn take_buffer() -> Vec<RawMessage> {
    SPARE_BUFFER
        .with(|slot| slot.take())
        .unwrap_or_else(|| Vec::with_capacity(MAX_MESSAGES_PER_BATCH))
}

fn return_buffer(buffer: Vec<RawMessage>) {
    debug_assert!(buffer.is_empty());
    SPARE_BUFFER.with(|slot| slot.set(Some(buffer)));
}

/// Pull up to `max_messages` pending messages from `source`
///
/// An unknown source yields an empty batch. Asking for more than
/// [`MAX_MESSAGES_PER_BATCH`] is an error and receives nothing.
pub fn receive(
    engine: &dyn TransportEngine,
    source: MessageSource,
    max_messages: usize,
) -> Result<MessageBatch, SessionError> {
    if max_messages > MAX_MESSAGES_PER_BATCH {
        return Err(SessionError::LimitExceeded {
            what: "max_messages",
            limit: MAX_MESSAGES_PER_BATCH,
            actual: max_messages,
        });
    }

    let mut buffer = take_buffer();
    if max_messages > 0 {
        let count = engine.receive_batch(source, &mut buffer, max_messages);
        if count != buffer.len() {
            warn!(
                "Engine reported {} messages from {} but produced {}",
                count,
                source,
                buffer.len()
            );
        }
        trace!("Received batch: source={} count={}", source, buffer.len());
    }

    // Popped from the back while iterating.
    buffer.reverse();
    Ok(MessageBatch { buffer })
}

/// One-shot sequence of received messages
///
/// Messages not taken before the batch is dropped are released back to the
/// engine; taken messages are owned by their [`MessageView`].
#[derive(Debug)]
pub struct MessageBatch {
    buffer: Vec<RawMessage>,
}

impl MessageBatch {
    /// Messages not yet taken
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    #[cfg(test)]
    fn buffer_ptr(&self) -> *const RawMessage {
        self.buffer.as_ptr()
    }
}

impl Iterator for MessageBatch {
    type Item = MessageView;

    fn next(&mut self) -> Option<MessageView> {
        self.buffer.pop().map(MessageView::from_raw)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.buffer.len(), Some(self.buffer.len()))
    }
}

impl ExactSizeIterator for MessageBatch {}

impl Drop for MessageBatch {
    fn drop(&mut self) {
        let mut released = 0usize;
        for raw in self.buffer.drain(..) {
            if let Some(handle) = raw.release {
                if handle.release() {
                    released += 1;
                }
            }
        }
        if released > 0 {
            trace!("Released {} untaken messages", released);
        }
        return_buffer(std::mem::take(&mut self.buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionHandle, LoopbackEngine, SendFlags, SessionFacade};
    use netsockets_wire::WireAddress;
    use std::sync::Arc;

    fn connected_pair(engine: &Arc<LoopbackEngine>) -> (ConnectionHandle, ConnectionHandle) {
        let facade = SessionFacade::new(engine.clone());
        facade.create_socket_pair(false, None, None).unwrap()
    }

    #[test]
    fn test_receive_limit() {
        let engine = Arc::new(LoopbackEngine::new());
        let (a, _) = connected_pair(&engine);
        let err = receive(engine.as_ref(), MessageSource::Connection(a), 257).unwrap_err();
        assert!(matches!(
            err,
            SessionError::LimitExceeded { limit: 256, actual: 257, .. }
        ));
        assert!(receive(engine.as_ref(), MessageSource::Connection(a), 256).is_ok());
    }

    #[test]
    fn test_zero_max_and_unknown_source() {
        let engine = Arc::new(LoopbackEngine::new());
        let (a, b) = connected_pair(&engine);
        engine.send_message(a, b"x", SendFlags::RELIABLE).unwrap();

        assert_eq!(receive(engine.as_ref(), MessageSource::Connection(b), 0).unwrap().len(), 0);
        let unknown = MessageSource::Connection(ConnectionHandle(999));
        assert_eq!(receive(engine.as_ref(), unknown, 16).unwrap().len(), 0);
        assert_eq!(receive(engine.as_ref(), MessageSource::Connection(b), 16).unwrap().len(), 1);
    }

    #[test]
    fn test_batch_yields_in_order_and_releases_rest() {
        let engine = Arc::new(LoopbackEngine::new());
        let (a, b) = connected_pair(&engine);
        for i in 0..5u8 {
            engine.send_message(a, &[i], SendFlags::RELIABLE).unwrap();
        }

        let mut batch = receive(engine.as_ref(), MessageSource::Connection(b), 5).unwrap();
        assert_eq!(batch.len(), 5);
        let first = batch.next().unwrap();
        let second = batch.next().unwrap();
        assert_eq!(first.data(), &[0]);
        assert_eq!(second.data(), &[1]);
        assert_eq!(batch.remaining(), 3);
        assert_eq!(engine.outstanding_messages(), 5);

        drop(batch);
        assert_eq!(engine.outstanding_messages(), 2);
        first.release().unwrap();
        second.release().unwrap();
        assert_eq!(engine.outstanding_messages(), 0);
    }

    #[test]
    fn test_buffer_reused_on_same_thread() {
        let engine = Arc::new(LoopbackEngine::new());
        let (_, b) = connected_pair(&engine);
        let source = MessageSource::Connection(b);

        let first = receive(engine.as_ref(), source, 8).unwrap();
        let ptr = first.buffer_ptr();
        drop(first);
        let second = receive(engine.as_ref(), source, 8).unwrap();
        assert_eq!(second.buffer_ptr(), ptr);

        // A nested receive while `second` is alive gets its own buffer.
        let nested = receive(engine.as_ref(), source, 8).unwrap();
        assert_ne!(nested.buffer_ptr(), ptr);
    }

    #[test]
    fn test_concurrent_receives_do_not_interleave() {
        let engine = Arc::new(LoopbackEngine::new());
        let facade = SessionFacade::new(engine.clone());
        let listen = facade
            .create_listen_socket(&WireAddress::localhost(0))
            .unwrap();
        let addr = facade.listen_socket_address(listen).unwrap();

        let mut pairs = Vec::new();
        for _ in 0..4 {
            let client = facade.connect(&addr).unwrap();
            pairs.push(client);
        }
        facade.pump();
        let server_side: Vec<_> = pairs
            .iter()
            .map(|c| engine.peer_of(*c).unwrap())
            .collect();
        for s in &server_side {
            facade.accept_connection(*s).unwrap();
        }
        for (i, c) in pairs.iter().enumerate() {
            for n in 0..50u8 {
                facade
                    .send_message(*c, &[i as u8, n], SendFlags::RELIABLE)
                    .unwrap();
            }
        }

        let handles: Vec<_> = server_side
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    let batch =
                        receive(engine.as_ref(), MessageSource::Connection(s), 64).unwrap();
                    for msg in batch {
                        assert_eq!(msg.connection(), s);
                        assert_eq!(msg.data()[0], i as u8);
                        seen.push(msg.data()[1]);
                        msg.release().unwrap();
                    }
                    seen
                })
            })
            .collect();

        for h in handles {
            let seen = h.join().unwrap();
            assert_eq!(seen, (0..50u8).collect::<Vec<_>>());
        }
        assert_eq!(engine.outstanding_messages(), 0);
    }
}
