//! Session facade, batch receive pipeline, and engine boundary for netsockets.
//!
//! This crate sits between an application and a transport engine. The
//! engine owns sockets, connections, and message storage; the facade
//! validates calls, maps engine results to [`SessionError`], hands out
//! received messages in batches, and runs connection status callbacks.
//!
//! ## Features
//!
//! - **Engine boundary**: the [`TransportEngine`] trait, plus an in-process
//!   [`LoopbackEngine`]
//! - **Batch receive**: up to [`MAX_MESSAGES_PER_BATCH`] messages per call,
//!   with a reused per-thread buffer
//! - **Zero-copy messages**: [`MessageView`] borrows engine storage until
//!   released
//! - **Scoped callbacks**: status callbacks resolved per connection through
//!   the configuration store
//!
//! ## Message lifecycle
//!
//! ```text
//!   engine queue ──receive──► MessageBatch ──next──► MessageView ──release──► engine
//!                                  │
//!                                  └─ dropped: untaken messages released
//! ```
//!
//! ## Example
//!
//! ```rust
//! use netsockets_session::{
//!     ConnectionState, LoopbackEngine, SendFlags, SessionFacade,
//! };
//! use netsockets_wire::WireAddress;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), netsockets_session::SessionError> {
//! let facade = SessionFacade::new(Arc::new(LoopbackEngine::new()));
//! facade.set_status_callback(|f, event| {
//!     if event.info.state == ConnectionState::Connecting && event.info.listen_socket.is_some() {
//!         let _ = f.accept_connection(event.connection);
//!     }
//! })?;
//!
//! let addr: WireAddress = "127.0.0.1:27015".parse()?;
//! let listen = facade.create_listen_socket(&addr)?;
//! let client = facade.connect(&addr)?;
//! facade.pump(); // accepts
//! facade.pump(); // both sides connected
//!
//! facade.send_message(client, b"hello", SendFlags::RELIABLE)?;
//! for msg in facade.receive_messages_on_listen_socket(listen, 16)? {
//!     assert_eq!(msg.data(), b"hello");
//!     msg.release()?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod engine;
pub mod error;
pub mod facade;
pub mod handle;
pub mod message;
pub mod pipeline;
pub mod status;

pub use engine::{LoopbackEngine, ResultCode, TransportEngine};
pub use error::{Result, SessionError};
pub use facade::{SessionFacade, StatusCallback, MAX_CLOSE_MESSAGE_LEN, MAX_CLOSE_REASON};
pub use handle::{ConnectionHandle, ListenSocketHandle, MessageSource};
pub use message::{MessageRelease, MessageView, RawMessage, ReleaseHandle};
pub use pipeline::{receive, MessageBatch, MAX_MESSAGES_PER_BATCH};
pub use status::{
    end_reason, ConnectionInfo, ConnectionState, ConnectionStatusEvent, QuickStatus, SendFlags,
};
