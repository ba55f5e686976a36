//! In-process engine.
//!
//! Connects listen sockets and connections created on the same engine
//! instance without touching the network. Delivery is immediate and
//! lossless; a sent message lands in the receiving connection's queue (and,
//! for accepted connections, is announced on the listen socket's queue).
//!
//! ```text
//!   client conn ──send──► server inbox ◄──receive(conn)
//!                              ▲
//!                listen inbox ─┘ ◄──receive(listen socket)
//! ```
//!
//! A message taken through either queue is gone from both.

use super::{ResultCode, TransportEngine};
use crate::{
    clock, end_reason, ConnectionHandle, ConnectionInfo, ConnectionState,
    ConnectionStatusEvent, ListenSocketHandle, MessageRelease, MessageSource, QuickStatus,
    RawMessage, ReleaseHandle, SendFlags,
};
use bytes::Bytes;
use netsockets_config::{ConfigKey, ConfigStore, ScopeChain, ScopeTarget};
use netsockets_wire::{PeerIdentity, WireAddress};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace, warn};

/// Largest message the engine accepts
pub const MAX_MESSAGE_SIZE: usize = 512 * 1024;

const FIRST_EPHEMERAL_PORT: u16 = 50000;
const LOOPBACK_V4: u32 = 0x7f00_0001;

struct QueuedMessage {
    data: Bytes,
    message_number: i64,
    time_received: i64,
    flags: SendFlags,
}

struct ListenSocketEntry {
    address: WireAddress,
    /// (connection, message number) in arrival order
    inbox: VecDeque<(ConnectionHandle, i64)>,
}

impl ListenSocketEntry {
    fn accepts(&self, target: &WireAddress) -> bool {
        if self.address.port != target.port {
            return false;
        }
        self.address.ip == target.ip
            || (target.is_loopback()
                && (self.address.is_unspecified() || self.address.is_loopback()))
    }
}

struct ConnectionEntry {
    peer: Option<ConnectionHandle>,
    listen_socket: Option<ListenSocketHandle>,
    local_address: WireAddress,
    remote_address: WireAddress,
    identity_remote: PeerIdentity,
    state: ConnectionState,
    end_reason: i32,
    end_debug: String,
    name: String,
    user_data: i64,
    inbox: VecDeque<QueuedMessage>,
    queued_bytes: usize,
    next_message_number: i64,
    sent_messages: u64,
    sent_bytes: u64,
    received_messages: u64,
    received_bytes: u64,
    created_at: i64,
}

impl ConnectionEntry {
    fn new(
        listen_socket: Option<ListenSocketHandle>,
        local_address: WireAddress,
        remote_address: WireAddress,
        identity_remote: PeerIdentity,
        user_data: i64,
    ) -> Self {
        Self {
            peer: None,
            listen_socket,
            local_address,
            remote_address,
            identity_remote,
            state: ConnectionState::None,
            end_reason: end_reason::INVALID,
            end_debug: String::new(),
            name: String::new(),
            user_data,
            inbox: VecDeque::new(),
            queued_bytes: 0,
            next_message_number: 1,
            sent_messages: 0,
            sent_bytes: 0,
            received_messages: 0,
            received_bytes: 0,
            created_at: clock::local_timestamp(),
        }
    }

    fn description(&self, handle: ConnectionHandle) -> String {
        if self.name.is_empty() {
            format!("{} {}", handle, self.remote_address)
        } else {
            format!("{} '{}' {}", handle, self.name, self.remote_address)
        }
    }

    fn info(&self, handle: ConnectionHandle) -> ConnectionInfo {
        ConnectionInfo {
            identity_remote: self.identity_remote.clone(),
            user_data: self.user_data,
            listen_socket: self.listen_socket,
            remote_address: self.remote_address,
            pop_remote: 0,
            pop_relay: 0,
            state: self.state,
            end_reason: self.end_reason,
            end_debug: self.end_debug.clone(),
            description: self.description(handle),
        }
    }
}

#[derive(Default)]
struct LoopbackState {
    next_handle: u32,
    next_port: u16,
    next_token: u64,
    listen_sockets: HashMap<ListenSocketHandle, ListenSocketEntry>,
    connections: HashMap<ConnectionHandle, ConnectionEntry>,
    // Handles are never reused, so these stay bounded by the handle space.
    closed_listen_sockets: HashSet<ListenSocketHandle>,
    closed_connections: HashSet<ConnectionHandle>,
    events: VecDeque<ConnectionStatusEvent>,
    /// token -> payload length, for messages handed out and not yet released
    outstanding: HashMap<u64, usize>,
}

impl LoopbackState {
    fn alloc_handle(&mut self) -> Result<u32, ResultCode> {
        match self.next_handle.checked_add(1) {
            Some(handle) => {
                self.next_handle = handle;
                Ok(handle)
            }
            None => {
                warn!("Handle space exhausted: last={}", self.next_handle);
                Err(ResultCode::LimitExceeded)
            }
        }
    }

    fn alloc_port(&mut self) -> u16 {
        if self.next_port < FIRST_EPHEMERAL_PORT {
            self.next_port = FIRST_EPHEMERAL_PORT;
        }
        let port = self.next_port;
        self.next_port = self.next_port.checked_add(1).unwrap_or(FIRST_EPHEMERAL_PORT);
        port
    }

    fn port_in_use(&self, addr: &WireAddress) -> bool {
        self.listen_sockets.values().any(|s| {
            s.address.port == addr.port
                && (s.address.ip == addr.ip || s.address.is_unspecified() || addr.is_unspecified())
        })
    }

    /// Move `handle` to `new_state` and queue a status event
    fn set_state(&mut self, handle: ConnectionHandle, new_state: ConnectionState) {
        let Some(entry) = self.connections.get_mut(&handle) else {
            return;
        };
        let old_state = entry.state;
        if old_state == new_state {
            return;
        }
        entry.state = new_state;
        debug!(
            "Connection state change: conn={} {:?} -> {:?}",
            handle, old_state, new_state
        );
        self.events.push_back(ConnectionStatusEvent {
            connection: handle,
            info: entry.info(handle),
            old_state,
        });
    }

    /// Pop the oldest pending message of `handle`
    fn take_from_connection(
        &mut self,
        handle: ConnectionHandle,
        owner: &Arc<Shared>,
    ) -> Option<RawMessage> {
        let entry = self.connections.get_mut(&handle)?;
        let msg = entry.inbox.pop_front()?;
        entry.queued_bytes -= msg.data.len();
        let identity_peer = entry.identity_remote.clone();
        let connection_user_data = entry.user_data;

        self.next_token += 1;
        let token = self.next_token;
        self.outstanding.insert(token, msg.data.len());

        Some(RawMessage {
            data: msg.data,
            connection: handle,
            identity_peer,
            connection_user_data,
            time_received: msg.time_received,
            message_number: msg.message_number,
            channel: 0,
            flags: msg.flags,
            release: Some(ReleaseHandle::new(owner.clone(), token)),
        })
    }
}

struct Shared {
    state: Mutex<LoopbackState>,
    config: ConfigStore,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageRelease for Shared {
    fn release_message(&self, token: u64) -> bool {
        self.lock().outstanding.remove(&token).is_some()
    }
}

/// Engine that connects sockets within one process
pub struct LoopbackEngine {
    shared: Arc<Shared>,
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackEngine {
    /// Create an engine with no sockets and default configuration
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LoopbackState::default()),
                config: ConfigStore::new(),
            }),
        }
    }

    /// Messages handed to the application and not yet released
    pub fn outstanding_messages(&self) -> usize {
        self.shared.lock().outstanding.len()
    }

    /// The other end of a connection, while both ends are open
    pub fn peer_of(&self, conn: ConnectionHandle) -> Option<ConnectionHandle> {
        self.shared.lock().connections.get(&conn)?.peer
    }

    fn initial_user_data(&self, conn: ConnectionHandle, listen: Option<ListenSocketHandle>) -> i64 {
        let chain = ScopeChain::connection(conn.0, listen.map(|l| l.0));
        self.shared
            .config
            .get_i64(ConfigKey::ConnectionUserData, &chain)
            .map(|(v, _)| v)
            .unwrap_or(-1)
    }

    fn send_buffer_limit(
        &self,
        conn: ConnectionHandle,
        listen: Option<ListenSocketHandle>,
    ) -> usize {
        let chain = ScopeChain::connection(conn.0, listen.map(|l| l.0));
        self.shared
            .config
            .get_i32(ConfigKey::SendBufferSize, &chain)
            .map(|(v, _)| v.max(0) as usize)
            .unwrap_or(MAX_MESSAGE_SIZE)
    }
}

impl TransportEngine for LoopbackEngine {
    fn create_listen_socket(&self, addr: &WireAddress) -> Result<ListenSocketHandle, ResultCode> {
        let mut state = self.shared.lock();
        let mut address = *addr;
        if address.port == 0 {
            address.port = state.alloc_port();
        }
        if state.port_in_use(&address) {
            warn!("Listen address already in use: {}", address);
            return Err(ResultCode::Busy);
        }

        let handle = ListenSocketHandle(state.alloc_handle()?);
        state.listen_sockets.insert(
            handle,
            ListenSocketEntry {
                address,
                inbox: VecDeque::new(),
            },
        );
        info!("Listen socket created: socket={} addr={}", handle, address);
        Ok(handle)
    }

    fn connect(&self, addr: &WireAddress) -> Result<ConnectionHandle, ResultCode> {
        if addr.port == 0 || addr.is_unspecified() {
            return Err(ResultCode::InvalidParam);
        }

        let mut state = self.shared.lock();
        let client = ConnectionHandle(state.alloc_handle()?);
        let port = state.alloc_port();
        let local = if addr.is_ipv4() {
            WireAddress::from_ipv4_u32(LOOPBACK_V4, port)
        } else {
            WireAddress::localhost(port)
        };
        let listener = state
            .listen_sockets
            .iter()
            .find(|(_, s)| s.accepts(addr))
            .map(|(h, _)| *h);

        let user_data = self.initial_user_data(client, None);
        state.connections.insert(
            client,
            ConnectionEntry::new(
                None,
                local,
                *addr,
                PeerIdentity::from_ip_address(*addr),
                user_data,
            ),
        );
        state.set_state(client, ConnectionState::Connecting);

        match listener {
            Some(socket) => {
                let server = ConnectionHandle(state.alloc_handle()?);
                let user_data = self.initial_user_data(server, Some(socket));
                let mut entry = ConnectionEntry::new(
                    Some(socket),
                    *addr,
                    local,
                    PeerIdentity::from_ip_address(local),
                    user_data,
                );
                entry.peer = Some(client);
                state.connections.insert(server, entry);
                if let Some(c) = state.connections.get_mut(&client) {
                    c.peer = Some(server);
                }
                state.set_state(server, ConnectionState::Connecting);
                debug!(
                    "Inbound connection: conn={} socket={} from={}",
                    server, socket, local
                );
            }
            None => {
                if let Some(c) = state.connections.get_mut(&client) {
                    c.end_reason = end_reason::MISC_TIMEOUT;
                    c.end_debug = format!("no listener at {}", addr);
                }
                state.set_state(client, ConnectionState::ProblemDetectedLocally);
                warn!("Connect failed: conn={} no listener at {}", client, addr);
            }
        }
        Ok(client)
    }

    fn accept_connection(&self, conn: ConnectionHandle) -> ResultCode {
        let mut state = self.shared.lock();
        let Some(entry) = state.connections.get(&conn) else {
            return ResultCode::NoConnection;
        };
        if entry.listen_socket.is_none() || entry.state != ConnectionState::Connecting {
            return ResultCode::InvalidState;
        }
        let peer = entry.peer;
        state.set_state(conn, ConnectionState::Connected);
        if let Some(peer) = peer {
            state.set_state(peer, ConnectionState::Connected);
        }
        info!("Connection accepted: conn={}", conn);
        ResultCode::Ok
    }

    fn close_connection(
        &self,
        conn: ConnectionHandle,
        reason: i32,
        debug_text: &str,
        linger: bool,
    ) -> bool {
        let mut state = self.shared.lock();
        if state.closed_connections.contains(&conn) {
            return true;
        }
        let Some(entry) = state.connections.remove(&conn) else {
            return false;
        };
        state.closed_connections.insert(conn);
        if let Some(socket) = entry.listen_socket {
            if let Some(s) = state.listen_sockets.get_mut(&socket) {
                s.inbox.retain(|(c, _)| *c != conn);
            }
        }

        if let Some(peer) = entry.peer {
            if let Some(p) = state.connections.get_mut(&peer) {
                p.peer = None;
                if !p.state.is_terminal() {
                    p.end_reason = reason;
                    p.end_debug = debug_text.to_string();
                }
            }
            let live = state
                .connections
                .get(&peer)
                .map_or(false, |p| !p.state.is_terminal());
            if live {
                state.set_state(peer, ConnectionState::ClosedByPeer);
            }
        }
        drop(state);

        let cleared = self.shared.config.clear_object(ScopeTarget::Connection(conn.0));
        info!(
            "Connection closed: conn={} reason={} debug={:?} linger={} dropped={} cleared_overrides={}",
            conn,
            reason,
            debug_text,
            linger,
            entry.inbox.len(),
            cleared
        );
        true
    }

    fn close_listen_socket(&self, socket: ListenSocketHandle, debug_text: &str) -> bool {
        let mut state = self.shared.lock();
        if state.closed_listen_sockets.contains(&socket) {
            return true;
        }
        if state.listen_sockets.remove(&socket).is_none() {
            return false;
        }
        state.closed_listen_sockets.insert(socket);
        let accepted: Vec<ConnectionHandle> = state
            .connections
            .iter()
            .filter(|(_, e)| e.listen_socket == Some(socket))
            .map(|(h, _)| *h)
            .collect();
        drop(state);

        for conn in &accepted {
            self.close_connection(*conn, end_reason::INVALID, debug_text, false);
        }
        self.shared
            .config
            .clear_object(ScopeTarget::ListenSocket(socket.0));
        info!(
            "Listen socket closed: socket={} connections={}",
            socket,
            accepted.len()
        );
        true
    }

    fn send_message(
        &self,
        conn: ConnectionHandle,
        data: &[u8],
        flags: SendFlags,
    ) -> Result<i64, ResultCode> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(ResultCode::InvalidParam);
        }

        let mut state = self.shared.lock();
        let sender = state.connections.get(&conn).ok_or(ResultCode::NoConnection)?;
        match sender.state {
            ConnectionState::Connected => {}
            ConnectionState::Connecting | ConnectionState::FindingRoute => {
                return Err(ResultCode::InvalidState)
            }
            _ => return Err(ResultCode::NoConnection),
        }
        let peer = sender.peer.ok_or(ResultCode::NoConnection)?;
        let limit = self.send_buffer_limit(conn, sender.listen_socket);
        let queued = state
            .connections
            .get(&peer)
            .ok_or(ResultCode::NoConnection)?
            .queued_bytes;
        if queued > 0 && queued + data.len() > limit {
            debug!(
                "Send buffer full: conn={} queued={} len={} limit={}",
                conn,
                queued,
                data.len(),
                limit
            );
            return Err(ResultCode::LimitExceeded);
        }

        let number = match state.connections.get_mut(&conn) {
            Some(sender) => {
                let number = sender.next_message_number;
                sender.next_message_number += 1;
                sender.sent_messages += 1;
                sender.sent_bytes += data.len() as u64;
                number
            }
            None => return Err(ResultCode::NoConnection),
        };

        let listen = match state.connections.get_mut(&peer) {
            Some(receiver) => {
                receiver.inbox.push_back(QueuedMessage {
                    data: Bytes::copy_from_slice(data),
                    message_number: number,
                    time_received: clock::local_timestamp(),
                    flags,
                });
                receiver.queued_bytes += data.len();
                receiver.received_messages += 1;
                receiver.received_bytes += data.len() as u64;
                receiver.listen_socket
            }
            None => return Err(ResultCode::NoConnection),
        };
        if let Some(socket) = listen {
            if let Some(s) = state.listen_sockets.get_mut(&socket) {
                s.inbox.push_back((peer, number));
            }
        }

        trace!(
            "Message queued: conn={} peer={} number={} len={} flags={:?}",
            conn,
            peer,
            number,
            data.len(),
            flags
        );
        Ok(number)
    }

    fn flush_messages(&self, conn: ConnectionHandle) -> ResultCode {
        match self.shared.lock().connections.get(&conn) {
            Some(e) if e.state == ConnectionState::Connected => ResultCode::Ok,
            Some(e) if !e.state.is_terminal() => ResultCode::InvalidState,
            _ => ResultCode::NoConnection,
        }
    }

    fn receive_batch(
        &self,
        source: MessageSource,
        out: &mut Vec<RawMessage>,
        max_messages: usize,
    ) -> usize {
        let mut state = self.shared.lock();
        let mut taken = 0;
        match source {
            MessageSource::Connection(conn) => {
                let socket = state.connections.get(&conn).and_then(|e| e.listen_socket);
                while taken < max_messages {
                    let Some(raw) = state.take_from_connection(conn, &self.shared) else {
                        break;
                    };
                    if let Some(socket) = socket {
                        if let Some(s) = state.listen_sockets.get_mut(&socket) {
                            let key = (conn, raw.message_number);
                            if let Some(pos) = s.inbox.iter().position(|e| *e == key) {
                                s.inbox.remove(pos);
                            }
                        }
                    }
                    out.push(raw);
                    taken += 1;
                }
            }
            MessageSource::ListenSocket(socket) => {
                while taken < max_messages {
                    let Some((conn, number)) = state
                        .listen_sockets
                        .get_mut(&socket)
                        .and_then(|s| s.inbox.pop_front())
                    else {
                        break;
                    };
                    let pending = state
                        .connections
                        .get(&conn)
                        .and_then(|e| e.inbox.front())
                        .map_or(false, |m| m.message_number == number);
                    if !pending {
                        continue;
                    }
                    if let Some(raw) = state.take_from_connection(conn, &self.shared) {
                        out.push(raw);
                        taken += 1;
                    }
                }
            }
        }
        taken
    }

    fn connection_info(&self, conn: ConnectionHandle) -> Option<ConnectionInfo> {
        let state = self.shared.lock();
        state.connections.get(&conn).map(|e| e.info(conn))
    }

    fn quick_status(&self, conn: ConnectionHandle) -> Option<QuickStatus> {
        let state = self.shared.lock();
        let entry = state.connections.get(&conn)?;
        let pending = entry
            .peer
            .and_then(|p| state.connections.get(&p))
            .map_or(0, |p| p.queued_bytes);
        let elapsed =
            ((clock::local_timestamp() - entry.created_at) as f32 / 1_000_000.0).max(1e-3);
        let send_rate = self
            .shared
            .config
            .get_i32(
                ConfigKey::SendRateMax,
                &ScopeChain::connection(conn.0, entry.listen_socket.map(|l| l.0)),
            )
            .map(|(v, _)| v)
            .unwrap_or(0);

        Some(QuickStatus {
            state: entry.state,
            ping_ms: 0,
            quality_local: 1.0,
            quality_remote: 1.0,
            out_packets_per_sec: entry.sent_messages as f32 / elapsed,
            out_bytes_per_sec: entry.sent_bytes as f32 / elapsed,
            in_packets_per_sec: entry.received_messages as f32 / elapsed,
            in_bytes_per_sec: entry.received_bytes as f32 / elapsed,
            send_rate_bytes_per_sec: send_rate,
            pending_unreliable: 0,
            pending_reliable: pending.min(i32::MAX as usize) as i32,
            sent_unacked_reliable: 0,
            queue_time_us: 0,
        })
    }

    fn detailed_status(&self, conn: ConnectionHandle) -> Option<String> {
        let state = self.shared.lock();
        let e = state.connections.get(&conn)?;
        let mut out = String::new();
        let _ = writeln!(out, "Connection {}", e.description(conn));
        let _ = writeln!(out, "  state:          {:?}", e.state);
        let _ = writeln!(out, "  local address:  {}", e.local_address);
        let _ = writeln!(out, "  remote address: {}", e.remote_address);
        let _ = writeln!(out, "  remote id:      {}", e.identity_remote);
        if let Some(socket) = e.listen_socket {
            let _ = writeln!(out, "  accepted on:    {}", socket);
        }
        let _ = writeln!(out, "  sent:           {} msgs, {} bytes", e.sent_messages, e.sent_bytes);
        let _ = writeln!(
            out,
            "  received:       {} msgs, {} bytes",
            e.received_messages, e.received_bytes
        );
        let _ = writeln!(out, "  pending:        {} msgs, {} bytes", e.inbox.len(), e.queued_bytes);
        if e.state.is_terminal() {
            let _ = writeln!(out, "  end:            {} {}", e.end_reason, e.end_debug);
        }
        Some(out)
    }

    fn listen_socket_address(&self, socket: ListenSocketHandle) -> Option<WireAddress> {
        self.shared.lock().listen_sockets.get(&socket).map(|s| s.address)
    }

    fn set_connection_user_data(&self, conn: ConnectionHandle, user_data: i64) -> bool {
        match self.shared.lock().connections.get_mut(&conn) {
            Some(e) => {
                e.user_data = user_data;
                true
            }
            None => false,
        }
    }

    fn connection_user_data(&self, conn: ConnectionHandle) -> Option<i64> {
        self.shared.lock().connections.get(&conn).map(|e| e.user_data)
    }

    fn set_connection_name(&self, conn: ConnectionHandle, name: &str) -> bool {
        match self.shared.lock().connections.get_mut(&conn) {
            Some(e) => {
                e.name = name.to_string();
                true
            }
            None => false,
        }
    }

    fn connection_name(&self, conn: ConnectionHandle) -> Option<String> {
        self.shared.lock().connections.get(&conn).map(|e| e.name.clone())
    }

    fn create_socket_pair(
        &self,
        use_network_loopback: bool,
        identity1: Option<&PeerIdentity>,
        identity2: Option<&PeerIdentity>,
    ) -> Result<(ConnectionHandle, ConnectionHandle), ResultCode> {
        let mut state = self.shared.lock();
        let first = ConnectionHandle(state.alloc_handle()?);
        let second = ConnectionHandle(state.alloc_handle()?);
        let (addr1, addr2) = if use_network_loopback {
            let p1 = state.alloc_port();
            let p2 = state.alloc_port();
            (
                WireAddress::from_ipv4_u32(LOOPBACK_V4, p1),
                WireAddress::from_ipv4_u32(LOOPBACK_V4, p2),
            )
        } else {
            (WireAddress::unspecified(), WireAddress::unspecified())
        };
        let id1 = identity1.cloned().unwrap_or_else(PeerIdentity::local_host);
        let id2 = identity2.cloned().unwrap_or_else(PeerIdentity::local_host);

        let user_data1 = self.initial_user_data(first, None);
        let user_data2 = self.initial_user_data(second, None);
        let mut a = ConnectionEntry::new(None, addr1, addr2, id2, user_data1);
        let mut b = ConnectionEntry::new(None, addr2, addr1, id1, user_data2);
        a.peer = Some(second);
        b.peer = Some(first);
        state.connections.insert(first, a);
        state.connections.insert(second, b);
        state.set_state(first, ConnectionState::Connected);
        state.set_state(second, ConnectionState::Connected);
        debug!("Socket pair created: {} <-> {}", first, second);
        Ok((first, second))
    }

    fn config(&self) -> &ConfigStore {
        &self.shared.config
    }

    fn run_status_callbacks(&self, dispatch: &mut dyn FnMut(ConnectionStatusEvent)) {
        let events = std::mem::take(&mut self.shared.lock().events);
        for event in events {
            dispatch(event);
        }
    }

    fn local_timestamp(&self) -> i64 {
        clock::local_timestamp()
    }
}
