//! netsockets demo binary.
//!
//! Runs an echo server and a client on one in-process loopback engine and
//! drives both from a single tick loop: pump status callbacks, send, echo,
//! and verify until every message has come back.

use anyhow::{bail, Context, Result};
use clap::Parser;
use netsockets_config::{ConfigScope, ScopeTarget};
use netsockets_session::{
    ConnectionHandle, ConnectionState, ListenSocketHandle, LoopbackEngine, SendFlags,
    SessionError, SessionFacade, MAX_MESSAGES_PER_BATCH,
};
use netsockets_wire::WireAddress;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::DemoConfig;
use logging::NetsocketsLogFormatter;

/// Messages sent per tick at most
const SEND_BURST: u32 = 16;

/// Loopback echo demo for the netsockets session facade
#[derive(Parser, Debug)]
#[command(
    name = "netsockets",
    version,
    about = "Loopback echo demo for the netsockets session facade"
)]
struct Args {
    /// Listen address, e.g. 127.0.0.1:27015 or [::1]:27015
    #[arg(long)]
    listen: Option<String>,

    /// Number of messages to echo
    #[arg(long)]
    messages: Option<u32>,

    /// Payload size in bytes (at least 4)
    #[arg(long)]
    payload_size: Option<usize>,

    /// Pump interval, e.g. 10ms
    #[arg(long)]
    tick: Option<humantime::Duration>,

    /// Give up if the echo is not complete after this long
    #[arg(long, default_value = "30s")]
    timeout: humantime::Duration,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "netsockets.yaml")]
    config: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("netsockets={}", args.log_level).parse()?)
        .add_directive(format!("netsockets_session={}", args.log_level).parse()?)
        .add_directive(format!("netsockets_config={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .event_format(NetsocketsLogFormatter::new("netsockets"))
        .init();

    info!("Starting netsockets demo v{}", env!("CARGO_PKG_VERSION"));

    let mut demo = DemoConfig::load_from_file(&args.config)?;
    if let Some(listen) = args.listen {
        demo.listen = listen;
    }
    if let Some(count) = args.messages {
        demo.message_count = count;
    }
    if let Some(size) = args.payload_size {
        demo.payload_size = size;
    }
    let tick = match args.tick {
        Some(t) => Duration::from(t),
        None => demo.tick_interval()?,
    };
    let listen_addr: WireAddress = demo
        .listen
        .parse()
        .with_context(|| format!("invalid listen address '{}'", demo.listen))?;

    let engine = Arc::new(LoopbackEngine::new());
    let facade = SessionFacade::new(engine.clone());

    let mut listen_overrides = Vec::new();
    for o in &demo.overrides {
        let (key, value) = o.resolve()?;
        match o.scope {
            ConfigScope::Global => facade.set_config_value(key, ScopeTarget::Global, value)?,
            ConfigScope::InterfaceInstance => {
                facade.set_config_value(key, ScopeTarget::InterfaceInstance, value)?
            }
            ConfigScope::ListenSocket => listen_overrides.push((key, value)),
            ConfigScope::Connection => {
                component_warn!("config", "Skipping connection-scoped override for {}", key);
                continue;
            }
        }
        component_debug!("config", "Applied override {} at {:?}", key, o.scope);
    }

    facade.set_status_callback(|f, event| {
        let conn = event.connection;
        component_info!(
            "session",
            "Status change: {} {:?} -> {:?} ({})",
            conn,
            event.old_state,
            event.info.state,
            event.info.description
        );
        match event.info.state {
            ConnectionState::Connecting if event.info.listen_socket.is_some() => {
                if let Err(e) = f.accept_connection(conn) {
                    component_error!("session", "Accept failed for {}: {}", conn, e);
                }
            }
            ConnectionState::ClosedByPeer | ConnectionState::ProblemDetectedLocally
                if event.info.listen_socket.is_some() =>
            {
                if let Err(e) = f.close_connection(conn, 0, "peer gone", false) {
                    component_warn!("session", "Close failed for {}: {}", conn, e);
                }
            }
            _ => {}
        }
    })?;

    let listen = facade.create_listen_socket(&listen_addr)?;
    for (key, value) in listen_overrides {
        facade.set_config_value(key, ScopeTarget::ListenSocket(listen.0), value)?;
    }
    let client = facade.connect(&listen_addr)?;
    facade.set_connection_name(client, "echo-client")?;
    component_info!(
        "demo",
        "Echoing {} messages of {} bytes via {}",
        demo.message_count,
        demo.payload_size,
        listen_addr
    );

    let mut ticker = tokio::time::interval(tick);
    let deadline = tokio::time::sleep(Duration::from(args.timeout));
    tokio::pin!(deadline);

    let mut payload = vec![0xa5u8; demo.payload_size.max(4)];
    let mut sent = 0u32;
    let mut echoed = 0u32;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                facade.pump();

                let state = facade
                    .connection_info(client)
                    .map(|info| info.state)
                    .unwrap_or(ConnectionState::None);
                if state.is_terminal() || state == ConnectionState::None {
                    let reason = facade
                        .connection_info(client)
                        .map(|info| info.end_debug)
                        .unwrap_or_default();
                    bail!("client connection ended in {:?}: {}", state, reason);
                }

                if state == ConnectionState::Connected {
                    sent += send_burst(&facade, client, &mut payload, sent, demo.message_count)?;
                }
                echo(&facade, listen)?;
                echoed += collect_echoes(&facade, client, echoed)?;

                if echoed >= demo.message_count {
                    break;
                }
            }
            _ = &mut deadline => {
                bail!(
                    "timed out after {} with {}/{} echoes",
                    args.timeout,
                    echoed,
                    demo.message_count
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt, stopping early");
                break;
            }
        }
    }

    if let Some(status) = facade.quick_status(client) {
        component_info!(
            "demo",
            "Client status: out={:.0} msg/s in={:.0} msg/s pending={}B",
            status.out_packets_per_sec,
            status.in_packets_per_sec,
            status.pending_reliable
        );
    }
    if let Some(detail) = facade.detailed_status(client) {
        component_debug!("demo", "{}", detail);
    }

    facade.close_connection(client, 0, "demo complete", true)?;
    facade.pump();
    facade.close_listen_socket(listen, "shutdown")?;
    facade.pump();

    info!(
        "Demo complete: sent={} echoed={} unreleased={}",
        sent,
        echoed,
        engine.outstanding_messages()
    );
    Ok(())
}

/// Send up to [`SEND_BURST`] numbered messages; returns how many went out
fn send_burst(
    facade: &SessionFacade,
    client: ConnectionHandle,
    payload: &mut [u8],
    already_sent: u32,
    total: u32,
) -> Result<u32> {
    let mut count = 0;
    while count < SEND_BURST && already_sent + count < total {
        payload[..4].copy_from_slice(&(already_sent + count).to_le_bytes());
        match facade.send_message(client, payload, SendFlags::RELIABLE_NO_NAGLE) {
            Ok(_) => count += 1,
            Err(SessionError::LimitExceeded { .. }) => {
                component_debug!("demo", "Send buffer full after {} messages this tick", count);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(count)
}

/// Send every message waiting on the listen socket back to its sender
fn echo(facade: &SessionFacade, listen: ListenSocketHandle) -> Result<()> {
    for msg in facade.receive_messages_on_listen_socket(listen, MAX_MESSAGES_PER_BATCH)? {
        let sent = facade.send_message(msg.connection(), msg.data(), SendFlags::RELIABLE_NO_NAGLE);
        msg.release()?;
        sent?;
    }
    Ok(())
}

/// Check echoes arrive in order; returns how many arrived
fn collect_echoes(facade: &SessionFacade, client: ConnectionHandle, expected: u32) -> Result<u32> {
    let mut count = 0;
    for msg in facade.receive_messages_on_connection(client, MAX_MESSAGES_PER_BATCH)? {
        let head = msg.data().get(..4).and_then(|h| <[u8; 4]>::try_from(h).ok());
        let len = msg.len();
        msg.release()?;

        let seq = match head {
            Some(head) => u32::from_le_bytes(head),
            None => bail!("short echo of {} bytes", len),
        };
        if seq != expected + count {
            bail!("echo out of order: got {}, expected {}", seq, expected + count);
        }
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    type Demo = (Arc<LoopbackEngine>, SessionFacade, ListenSocketHandle, ConnectionHandle);

    fn connected_demo() -> Demo {
        let engine = Arc::new(LoopbackEngine::new());
        let facade = SessionFacade::new(engine.clone());
        facade
            .set_status_callback(|f, ev| {
                if ev.info.state == ConnectionState::Connecting && ev.info.listen_socket.is_some() {
                    f.accept_connection(ev.connection).unwrap();
                }
            })
            .unwrap();
        let listen = facade.create_listen_socket(&WireAddress::localhost(0)).unwrap();
        let bound = facade.listen_socket_address(listen).unwrap();
        let client = facade.connect(&bound).unwrap();
        facade.pump();
        facade.pump();
        (engine, facade, listen, client)
    }

    #[test]
    fn test_echo_round_trip() {
        let (engine, facade, listen, client) = connected_demo();
        let mut payload = vec![0u8; 8];

        assert_eq!(send_burst(&facade, client, &mut payload, 0, 20).unwrap(), SEND_BURST);
        assert_eq!(send_burst(&facade, client, &mut payload, SEND_BURST, 20).unwrap(), 4);
        echo(&facade, listen).unwrap();
        assert_eq!(collect_echoes(&facade, client, 0).unwrap(), 20);
        assert_eq!(engine.outstanding_messages(), 0);
    }

    #[test]
    fn test_out_of_order_echo_rejected() {
        let (engine, facade, listen, client) = connected_demo();
        let mut payload = vec![0u8; 4];
        send_burst(&facade, client, &mut payload, 3, 5).unwrap();
        echo(&facade, listen).unwrap();
        assert!(collect_echoes(&facade, client, 0).is_err());
        assert_eq!(engine.outstanding_messages(), 0);
    }

    #[test]
    fn test_failed_echo_still_releases() {
        let (engine, facade, listen, client) = connected_demo();
        let mut payload = vec![0u8; 4];
        send_burst(&facade, client, &mut payload, 0, 3).unwrap();
        facade.close_connection(client, 0, "gone", false).unwrap();

        assert!(echo(&facade, listen).is_err());
        assert_eq!(engine.outstanding_messages(), 0);
    }
}
