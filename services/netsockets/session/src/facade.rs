//! Application-facing session API.

use crate::pipeline::{self, MessageBatch};
use crate::{
    end_reason, ConnectionHandle, ConnectionInfo, ConnectionState, ConnectionStatusEvent,
    ListenSocketHandle, MessageSource, QuickStatus, ResultCode, SendFlags, SessionError,
    TransportEngine,
};
use netsockets_config::{
    CallbackRef, ConfigError, ConfigKey, ConfigKeyInfo, ConfigStatus, ConfigValue, Resolved,
    ScopeChain, ScopeTarget,
};
use netsockets_wire::{PeerIdentity, WireAddress};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Longest debug string accepted by [`SessionFacade::close_connection`]
pub const MAX_CLOSE_MESSAGE_LEN: usize = 128;

/// Largest reason code accepted by [`SessionFacade::close_connection`]
pub const MAX_CLOSE_REASON: i32 = end_reason::MAX_APP_REASON;

type StatusFn = dyn Fn(&SessionFacade, &ConnectionStatusEvent) + Send + Sync;

/// Connection status callback, stored in configuration under
/// [`ConfigKey::ConnectionStatusChanged`]
pub struct StatusCallback(Box<StatusFn>);

impl StatusCallback {
    /// Wrap a closure
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&SessionFacade, &ConnectionStatusEvent) + Send + Sync + 'static,
    {
        Self(Box::new(f))
    }

    fn call(&self, facade: &SessionFacade, event: &ConnectionStatusEvent) {
        (self.0)(facade, event)
    }
}

impl fmt::Debug for StatusCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StatusCallback")
    }
}

fn engine_error(code: ResultCode, what: impl fmt::Display) -> SessionError {
    match code {
        ResultCode::NoConnection => SessionError::NoConnection(what.to_string()),
        ResultCode::InvalidState => SessionError::InvalidState(what.to_string()),
        other => SessionError::Engine(other),
    }
}

/// Session facade over a transport engine
///
/// Validates arguments, converts engine results into [`SessionError`], and
/// dispatches connection status callbacks from [`pump`](SessionFacade::pump).
/// Cloning is cheap; clones share the engine.
#[derive(Clone)]
pub struct SessionFacade {
    engine: Arc<dyn TransportEngine>,
}

impl fmt::Debug for SessionFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFacade").finish_non_exhaustive()
    }
}

impl SessionFacade {
    /// Wrap an engine
    pub fn new(engine: Arc<dyn TransportEngine>) -> Self {
        Self { engine }
    }

    /// The underlying engine
    pub fn engine(&self) -> &Arc<dyn TransportEngine> {
        &self.engine
    }

    // ---- sockets and connections ----

    /// Bind a listen socket
    pub fn create_listen_socket(
        &self,
        addr: &WireAddress,
    ) -> Result<ListenSocketHandle, SessionError> {
        let socket = self
            .engine
            .create_listen_socket(addr)
            .map_err(|code| engine_error(code, addr))?;
        debug!("Listening: socket={} addr={}", socket, addr);
        Ok(socket)
    }

    /// Start connecting to `addr`
    ///
    /// Success only means the attempt started; watch the status callback
    /// for `Connected` or a failure state.
    pub fn connect(&self, addr: &WireAddress) -> Result<ConnectionHandle, SessionError> {
        let conn = self
            .engine
            .connect(addr)
            .map_err(|code| engine_error(code, addr))?;
        debug!("Connecting: conn={} addr={}", conn, addr);
        Ok(conn)
    }

    /// Accept an inbound connection reported as `Connecting`
    pub fn accept_connection(&self, conn: ConnectionHandle) -> Result<(), SessionError> {
        let info = self
            .engine
            .connection_info(conn)
            .ok_or_else(|| SessionError::NoConnection(conn.to_string()))?;
        if info.listen_socket.is_none() {
            return Err(SessionError::InvalidState(format!(
                "{} is not an inbound connection",
                conn
            )));
        }
        if info.state != ConnectionState::Connecting {
            return Err(SessionError::InvalidState(format!(
                "{} is {:?}, not Connecting",
                conn, info.state
            )));
        }
        match self.engine.accept_connection(conn) {
            ResultCode::Ok => Ok(()),
            code => Err(engine_error(code, conn)),
        }
    }

    /// Close a connection and free its handle
    ///
    /// Closing an already closed handle succeeds again. With `linger`,
    /// reliable data already queued is still delivered.
    pub fn close_connection(
        &self,
        conn: ConnectionHandle,
        reason: i32,
        debug_text: &str,
        linger: bool,
    ) -> Result<(), SessionError> {
        if !(0..=MAX_CLOSE_REASON).contains(&reason) {
            return Err(SessionError::LimitExceeded {
                what: "close reason",
                limit: MAX_CLOSE_REASON as usize,
                actual: reason.max(0) as usize,
            });
        }
        if debug_text.len() > MAX_CLOSE_MESSAGE_LEN {
            return Err(SessionError::LimitExceeded {
                what: "close debug message",
                limit: MAX_CLOSE_MESSAGE_LEN,
                actual: debug_text.len(),
            });
        }
        if self.engine.close_connection(conn, reason, debug_text, linger) {
            Ok(())
        } else {
            Err(SessionError::NoConnection(conn.to_string()))
        }
    }

    /// Close a listen socket and every connection accepted on it
    pub fn close_listen_socket(
        &self,
        socket: ListenSocketHandle,
        debug_text: &str,
    ) -> Result<(), SessionError> {
        if debug_text.len() > MAX_CLOSE_MESSAGE_LEN {
            return Err(SessionError::LimitExceeded {
                what: "close debug message",
                limit: MAX_CLOSE_MESSAGE_LEN,
                actual: debug_text.len(),
            });
        }
        if self.engine.close_listen_socket(socket, debug_text) {
            Ok(())
        } else {
            Err(SessionError::NoConnection(socket.to_string()))
        }
    }

    // ---- messages ----

    /// Queue one message, returning its message number
    pub fn send_message(
        &self,
        conn: ConnectionHandle,
        data: &[u8],
        flags: SendFlags,
    ) -> Result<i64, SessionError> {
        self.engine
            .send_message(conn, data, flags)
            .map_err(|code| match code {
                ResultCode::LimitExceeded => SessionError::LimitExceeded {
                    what: "send buffer",
                    limit: self.send_buffer_size(conn),
                    actual: data.len(),
                },
                other => engine_error(other, conn),
            })
    }

    /// Push out anything held back by Nagle
    pub fn flush_messages(&self, conn: ConnectionHandle) -> Result<(), SessionError> {
        match self.engine.flush_messages(conn) {
            ResultCode::Ok => Ok(()),
            code => Err(engine_error(code, conn)),
        }
    }

    /// Receive up to `max_messages` messages from one connection
    pub fn receive_messages_on_connection(
        &self,
        conn: ConnectionHandle,
        max_messages: usize,
    ) -> Result<MessageBatch, SessionError> {
        pipeline::receive(self.engine.as_ref(), MessageSource::Connection(conn), max_messages)
    }

    /// Receive up to `max_messages` messages from all connections accepted
    /// on a listen socket
    pub fn receive_messages_on_listen_socket(
        &self,
        socket: ListenSocketHandle,
        max_messages: usize,
    ) -> Result<MessageBatch, SessionError> {
        pipeline::receive(self.engine.as_ref(), MessageSource::ListenSocket(socket), max_messages)
    }

    // ---- status ----

    /// Connection snapshot, `None` for an unknown or closed handle
    pub fn connection_info(&self, conn: ConnectionHandle) -> Option<ConnectionInfo> {
        self.engine.connection_info(conn)
    }

    /// Connection counters
    pub fn quick_status(&self, conn: ConnectionHandle) -> Option<QuickStatus> {
        self.engine.quick_status(conn)
    }

    /// Human-readable connection status
    pub fn detailed_status(&self, conn: ConnectionHandle) -> Option<String> {
        self.engine.detailed_status(conn)
    }

    /// Bound address of a listen socket
    pub fn listen_socket_address(&self, socket: ListenSocketHandle) -> Option<WireAddress> {
        self.engine.listen_socket_address(socket)
    }

    /// Set application user data on a connection
    pub fn set_connection_user_data(
        &self,
        conn: ConnectionHandle,
        user_data: i64,
    ) -> Result<(), SessionError> {
        if self.engine.set_connection_user_data(conn, user_data) {
            Ok(())
        } else {
            Err(SessionError::NoConnection(conn.to_string()))
        }
    }

    /// Application user data; -1 for an unknown handle
    pub fn connection_user_data(&self, conn: ConnectionHandle) -> i64 {
        self.engine.connection_user_data(conn).unwrap_or(-1)
    }

    /// Name a connection for logs
    pub fn set_connection_name(
        &self,
        conn: ConnectionHandle,
        name: &str,
    ) -> Result<(), SessionError> {
        if self.engine.set_connection_name(conn, name) {
            Ok(())
        } else {
            Err(SessionError::NoConnection(conn.to_string()))
        }
    }

    /// Name of a connection
    pub fn connection_name(&self, conn: ConnectionHandle) -> Option<String> {
        self.engine.connection_name(conn)
    }

    /// Create two connections already connected to each other
    pub fn create_socket_pair(
        &self,
        use_network_loopback: bool,
        identity1: Option<&PeerIdentity>,
        identity2: Option<&PeerIdentity>,
    ) -> Result<(ConnectionHandle, ConnectionHandle), SessionError> {
        self.engine
            .create_socket_pair(use_network_loopback, identity1, identity2)
            .map_err(|code| engine_error(code, "socket pair"))
    }

    /// Engine clock in microseconds
    pub fn local_timestamp(&self) -> i64 {
        self.engine.local_timestamp()
    }

    // ---- configuration ----

    fn scope_chain(&self, target: ScopeTarget) -> Result<ScopeChain, SessionError> {
        match target {
            ScopeTarget::Global | ScopeTarget::InterfaceInstance => {
                Ok(ScopeChain::for_target(target, None))
            }
            ScopeTarget::ListenSocket(h) => {
                if self.engine.listen_socket_address(ListenSocketHandle(h)).is_none() {
                    return Err(ConfigError::BadScopeObject(target.to_string()).into());
                }
                Ok(ScopeChain::listen_socket(h))
            }
            ScopeTarget::Connection(h) => {
                let info = self
                    .engine
                    .connection_info(ConnectionHandle(h))
                    .ok_or_else(|| ConfigError::BadScopeObject(target.to_string()))?;
                Ok(ScopeChain::connection(h, info.listen_socket.map(|s| s.0)))
            }
        }
    }

    fn send_buffer_size(&self, conn: ConnectionHandle) -> usize {
        self.get_config_value(ConfigKey::SendBufferSize, ScopeTarget::Connection(conn.0))
            .ok()
            .and_then(|r| match r.value {
                ConfigValue::Int32(v) => usize::try_from(v).ok(),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// Override a configuration value on a live object
    pub fn set_config_value(
        &self,
        key: ConfigKey,
        target: ScopeTarget,
        value: ConfigValue,
    ) -> Result<(), SessionError> {
        self.scope_chain(target)?;
        self.engine.config().set(key, target, value)?;
        Ok(())
    }

    /// Remove an override so the object inherits again
    pub fn unset_config_value(
        &self,
        key: ConfigKey,
        target: ScopeTarget,
    ) -> Result<bool, SessionError> {
        self.scope_chain(target)?;
        Ok(self.engine.config().unset(key, target))
    }

    /// Effective value of `key` for `target`
    pub fn get_config_value(
        &self,
        key: ConfigKey,
        target: ScopeTarget,
    ) -> Result<Resolved, SessionError> {
        let chain = self.scope_chain(target)?;
        Ok(self.engine.config().get(key, &chain)?)
    }

    /// Effective string value copied into `buf` with a NUL terminator
    pub fn get_config_string(
        &self,
        key: ConfigKey,
        target: ScopeTarget,
        buf: &mut [u8],
    ) -> Result<(usize, ConfigStatus), SessionError> {
        let chain = self.scope_chain(target)?;
        Ok(self.engine.config().get_string_into(key, &chain, buf)?)
    }

    /// Describe a key
    pub fn config_value_info(&self, key: ConfigKey) -> ConfigKeyInfo {
        self.engine.config().describe(key)
    }

    /// First key in id order, for enumerating all keys
    pub fn first_config_key(&self) -> ConfigKey {
        ConfigKey::first()
    }

    // ---- status callbacks ----

    /// Install the global connection status callback
    pub fn set_status_callback<F>(&self, callback: F) -> Result<(), SessionError>
    where
        F: Fn(&SessionFacade, &ConnectionStatusEvent) + Send + Sync + 'static,
    {
        self.set_status_callback_on(ScopeTarget::Global, callback)
    }

    /// Install a status callback for one object (or a broader scope)
    pub fn set_status_callback_on<F>(
        &self,
        target: ScopeTarget,
        callback: F,
    ) -> Result<(), SessionError>
    where
        F: Fn(&SessionFacade, &ConnectionStatusEvent) + Send + Sync + 'static,
    {
        let value = ConfigValue::FunctionPtr(CallbackRef::new(StatusCallback::new(callback)));
        self.set_config_value(ConfigKey::ConnectionStatusChanged, target, value)
    }

    /// Dispatch queued status changes to their callbacks
    ///
    /// Each event goes to the callback resolved for its connection at
    /// dispatch time. Events with no callback are dropped. Returns the
    /// number of events drained.
    pub fn pump(&self) -> usize {
        let mut drained = 0usize;
        let engine = self.engine.clone();
        engine.run_status_callbacks(&mut |event: ConnectionStatusEvent| {
            drained += 1;
            let chain = ScopeChain::connection(
                event.connection.0,
                event.info.listen_socket.map(|s| s.0),
            );
            match engine.config().get_callback(ConfigKey::ConnectionStatusChanged, &chain) {
                Ok(Some(callback)) => match callback.downcast_ref::<StatusCallback>() {
                    Some(callback) => callback.call(self, &event),
                    None => warn!(
                        "Status callback for {} has an unexpected type",
                        event.connection
                    ),
                },
                Ok(None) => trace!(
                    "No status callback: conn={} state={:?}",
                    event.connection,
                    event.info.state
                ),
                Err(e) => warn!(
                    "Status callback lookup failed: conn={} error={}",
                    event.connection, e
                ),
            }
        });
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoopbackEngine;
    use std::sync::Mutex;

    fn facade() -> (Arc<LoopbackEngine>, SessionFacade) {
        let engine = Arc::new(LoopbackEngine::new());
        let facade = SessionFacade::new(engine.clone());
        (engine, facade)
    }

    type Seen = Arc<Mutex<Vec<(ConnectionHandle, ConnectionState, ConnectionState)>>>;

    fn record_events(facade: &SessionFacade, auto_accept: bool) -> Seen {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        facade
            .set_status_callback(move |f, ev| {
                sink.lock()
                    .unwrap()
                    .push((ev.connection, ev.old_state, ev.info.state));
                if auto_accept
                    && ev.info.state == ConnectionState::Connecting
                    && ev.info.listen_socket.is_some()
                {
                    f.accept_connection(ev.connection).unwrap();
                }
            })
            .unwrap();
        seen
    }

    #[test]
    fn test_end_to_end_loopback() {
        let (engine, facade) = facade();
        let seen = record_events(&facade, true);

        let addr: WireAddress = "127.0.0.1:27020".parse().unwrap();
        let listen = facade.create_listen_socket(&addr).unwrap();
        let client = facade.connect(&addr).unwrap();

        // First pump sees Connecting on both sides and accepts; second sees
        // the resulting Connected transitions.
        assert_eq!(facade.pump(), 2);
        assert_eq!(facade.pump(), 2);
        let server = engine.peer_of(client).unwrap();
        {
            let seen = seen.lock().unwrap();
            let connected = |conn| (conn, ConnectionState::Connecting, ConnectionState::Connected);
            assert!(seen.contains(&connected(client)));
            assert!(seen.contains(&connected(server)));
        }

        let payload = b"hello over loopback";
        let n1 = facade.send_message(client, payload, SendFlags::RELIABLE).unwrap();
        let n2 = facade.send_message(client, payload, SendFlags::RELIABLE).unwrap();
        assert!(n2 > n1);

        let mut batch = facade.receive_messages_on_listen_socket(listen, 16).unwrap();
        assert_eq!(batch.len(), 2);
        let msg = batch.next().unwrap();
        assert_eq!(msg.data(), payload);
        assert_eq!(msg.connection(), server);
        assert_eq!(msg.message_number(), n1);
        assert!(msg.identity().ip_address().unwrap().is_loopback());
        msg.release().unwrap();
        drop(batch);
        assert_eq!(engine.outstanding_messages(), 0);
    }

    #[test]
    fn test_close_idempotent_and_peer_notified() {
        let (engine, facade) = facade();
        let seen = record_events(&facade, true);
        let addr = WireAddress::localhost(27021);
        facade.create_listen_socket(&addr).unwrap();
        let client = facade.connect(&addr).unwrap();
        facade.pump();
        facade.pump();
        let server = engine.peer_of(client).unwrap();
        seen.lock().unwrap().clear();

        facade.close_connection(client, 7, "done", false).unwrap();
        facade.close_connection(client, 7, "done", false).unwrap();
        assert!(matches!(
            facade.close_connection(ConnectionHandle(5000), 0, "", false),
            Err(SessionError::NoConnection(_))
        ));

        assert_eq!(facade.pump(), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(server, ConnectionState::Connected, ConnectionState::ClosedByPeer)]
        );
        let info = facade.connection_info(server).unwrap();
        assert_eq!(info.end_reason, 7);
        assert_eq!(info.end_debug, "done");
    }

    #[test]
    fn test_close_argument_limits() {
        let (_, facade) = facade();
        let (a, _) = facade.create_socket_pair(false, None, None).unwrap();
        let long = "x".repeat(MAX_CLOSE_MESSAGE_LEN + 1);
        assert!(matches!(
            facade.close_connection(a, 0, &long, false),
            Err(SessionError::LimitExceeded { limit: 128, actual: 129, .. })
        ));
        assert!(matches!(
            facade.close_connection(a, 1000, "", false),
            Err(SessionError::LimitExceeded { limit: 999, .. })
        ));
        // Rejected closes leave the connection open.
        assert!(facade.connection_info(a).is_some());
        facade.close_connection(a, 999, &"x".repeat(128), false).unwrap();
        assert!(facade.connection_info(a).is_none());
    }

    #[test]
    fn test_close_debug_text_reaches_peer() {
        let (_, facade) = facade();
        let (a, b) = facade.create_socket_pair(false, None, None).unwrap();
        facade.close_connection(a, 42, "shutting down: maintenance", true).unwrap();

        let info = facade.connection_info(b).unwrap();
        assert_eq!(info.state, ConnectionState::ClosedByPeer);
        assert_eq!(info.end_reason, 42);
        assert_eq!(info.end_debug, "shutting down: maintenance");

        let listen = facade.create_listen_socket(&WireAddress::localhost(0)).unwrap();
        facade.close_listen_socket(listen, "listener retired").unwrap();
        facade.close_listen_socket(listen, "listener retired").unwrap();
    }

    #[test]
    fn test_accept_rules() {
        let (engine, facade) = facade();
        let addr = WireAddress::localhost(27022);
        facade.create_listen_socket(&addr).unwrap();
        let client = facade.connect(&addr).unwrap();
        let server = engine.peer_of(client).unwrap();

        assert!(matches!(
            facade.accept_connection(client),
            Err(SessionError::InvalidState(_))
        ));
        assert!(matches!(
            facade.accept_connection(ConnectionHandle(4242)),
            Err(SessionError::NoConnection(_))
        ));
        facade.accept_connection(server).unwrap();
        assert!(matches!(
            facade.accept_connection(server),
            Err(SessionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_connect_failure_reported_through_callback() {
        let (_, facade) = facade();
        let seen = record_events(&facade, false);
        let client = facade.connect(&WireAddress::localhost(9)).unwrap();
        facade.pump();
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.last(),
            Some(&(
                client,
                ConnectionState::Connecting,
                ConnectionState::ProblemDetectedLocally
            ))
        );
        assert!(matches!(
            facade.connect(&WireAddress::unspecified()),
            Err(SessionError::Engine(ResultCode::InvalidParam))
        ));
    }

    #[test]
    fn test_send_errors() {
        let (_, facade) = facade();
        let (a, b) = facade.create_socket_pair(false, None, None).unwrap();
        facade
            .set_config_value(
                ConfigKey::SendBufferSize,
                ScopeTarget::Connection(a.0),
                ConfigValue::Int32(100),
            )
            .unwrap();
        facade.send_message(a, &[0u8; 80], SendFlags::RELIABLE).unwrap();
        assert!(matches!(
            facade.send_message(a, &[0u8; 80], SendFlags::RELIABLE),
            Err(SessionError::LimitExceeded { what: "send buffer", limit: 100, actual: 80 })
        ));

        facade.close_connection(b, 0, "", false).unwrap();
        assert!(matches!(
            facade.send_message(b, b"x", SendFlags::RELIABLE),
            Err(SessionError::NoConnection(_))
        ));
        assert!(matches!(
            facade.send_message(a, b"x", SendFlags::RELIABLE),
            Err(SessionError::NoConnection(_))
        ));
    }

    #[test]
    fn test_config_through_facade() {
        let (engine, facade) = facade();
        let addr = WireAddress::localhost(27023);
        let listen = facade.create_listen_socket(&addr).unwrap();
        let client = facade.connect(&addr).unwrap();
        let server = engine.peer_of(client).unwrap();

        facade
            .set_config_value(
                ConfigKey::TimeoutConnected,
                ScopeTarget::ListenSocket(listen.0),
                ConfigValue::Int32(2500),
            )
            .unwrap();
        let resolved = facade
            .get_config_value(ConfigKey::TimeoutConnected, ScopeTarget::Connection(server.0))
            .unwrap();
        assert_eq!(resolved.value, ConfigValue::Int32(2500));
        assert_eq!(resolved.status, ConfigStatus::OkInherited);

        // Outbound connections do not inherit from listen sockets.
        let resolved = facade
            .get_config_value(ConfigKey::TimeoutConnected, ScopeTarget::Connection(client.0))
            .unwrap();
        assert_eq!(resolved.value, ConfigValue::Int32(10_000));

        assert!(matches!(
            facade.set_config_value(
                ConfigKey::TimeoutConnected,
                ScopeTarget::Connection(9999),
                ConfigValue::Int32(1),
            ),
            Err(SessionError::Config(ConfigError::BadScopeObject(_)))
        ));
        assert!(matches!(
            facade.set_config_value(
                ConfigKey::TimeoutConnected,
                ScopeTarget::Global,
                ConfigValue::Float(1.0),
            ),
            Err(SessionError::Config(ConfigError::TypeMismatch { .. }))
        ));
        assert!(facade
            .unset_config_value(ConfigKey::TimeoutConnected, ScopeTarget::ListenSocket(listen.0))
            .unwrap());
    }

    #[test]
    fn test_per_connection_callback_overrides_global() {
        let (_, facade) = facade();
        let global_hits = Arc::new(Mutex::new(0usize));
        let local_hits = Arc::new(Mutex::new(0usize));

        let g = global_hits.clone();
        facade
            .set_status_callback(move |_, _| *g.lock().unwrap() += 1)
            .unwrap();
        let (a, b) = facade.create_socket_pair(false, None, None).unwrap();
        let l = local_hits.clone();
        facade
            .set_status_callback_on(ScopeTarget::Connection(a.0), move |_, _| {
                *l.lock().unwrap() += 1
            })
            .unwrap();

        assert_eq!(facade.pump(), 2);
        assert_eq!(*local_hits.lock().unwrap(), 1);
        assert_eq!(*global_hits.lock().unwrap(), 1);

        facade.close_connection(a, 0, "", false).unwrap();
        facade.pump();
        // b saw ClosedByPeer through the global callback.
        assert_eq!(*global_hits.lock().unwrap(), 2);
        let _ = b;
    }

    #[test]
    fn test_pump_without_callback_drains() {
        let (_, facade) = facade();
        facade.create_socket_pair(true, None, None).unwrap();
        assert_eq!(facade.pump(), 2);
        assert_eq!(facade.pump(), 0);
    }

    #[test]
    fn test_user_data_and_names() {
        let (_, facade) = facade();
        let (a, _) = facade.create_socket_pair(false, None, None).unwrap();
        assert_eq!(facade.connection_user_data(a), -1);
        facade.set_connection_user_data(a, 1234).unwrap();
        assert_eq!(facade.connection_user_data(a), 1234);
        assert_eq!(facade.connection_user_data(ConnectionHandle(777)), -1);
        assert!(facade.set_connection_name(ConnectionHandle(777), "x").is_err());
        facade.set_connection_name(a, "player-1").unwrap();
        assert_eq!(facade.connection_name(a).as_deref(), Some("player-1"));
        assert!(facade.detailed_status(a).unwrap().contains("player-1"));
        assert_eq!(facade.quick_status(a).unwrap().state, ConnectionState::Connected);
    }

    #[test]
    fn test_config_enumeration() {
        let (_, facade) = facade();
        let mut key = Some(facade.first_config_key());
        let mut count = 0;
        while let Some(k) = key {
            count += 1;
            key = facade.config_value_info(k).next;
        }
        assert_eq!(count, ConfigKey::iter().count());
    }

    #[test]
    fn test_get_config_string() {
        let (_, facade) = facade();
        facade
            .set_config_value(
                ConfigKey::RelayForceCluster,
                ScopeTarget::Global,
                ConfigValue::from("iad"),
            )
            .unwrap();
        let mut buf = [0u8; 8];
        let (len, status) = facade
            .get_config_string(ConfigKey::RelayForceCluster, ScopeTarget::Global, &mut buf)
            .unwrap();
        assert_eq!(len, 4);
        assert_eq!(&buf[..len], b"iad\0");
        assert_eq!(status, ConfigStatus::Ok);
        let mut tiny = [0u8; 2];
        assert!(matches!(
            facade.get_config_string(ConfigKey::RelayForceCluster, ScopeTarget::Global, &mut tiny),
            Err(SessionError::Config(ConfigError::BufferTooSmall { .. }))
        ));
    }
}
