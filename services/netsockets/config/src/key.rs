//! Enumerated configuration keys and their declared types.

use crate::{ConfigDataType, ConfigError, ConfigScope, ConfigValue};
use std::fmt;

/// Debug output levels used by the `LogLevel*` keys
pub mod log_level {
    /// Nothing
    pub const NONE: i32 = 0;
    /// Assertion failures
    pub const BUG: i32 = 1;
    /// Errors
    pub const ERROR: i32 = 2;
    /// Important events
    pub const IMPORTANT: i32 = 3;
    /// Warnings
    pub const WARNING: i32 = 4;
    /// Messages
    pub const MSG: i32 = 5;
    /// Verbose
    pub const VERBOSE: i32 = 6;
    /// Debug
    pub const DEBUG: i32 = 7;
    /// Everything
    pub const EVERYTHING: i32 = 8;
}

/// Engine tunable
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKey {
    /// Simulated message loss on send, percent
    FakePacketLossSend = 2,
    /// Simulated message loss on receive, percent
    FakePacketLossRecv = 3,
    /// Simulated send lag, ms
    FakePacketLagSend = 4,
    /// Simulated receive lag, ms
    FakePacketLagRecv = 5,
    /// Simulated reorder on send, percent
    FakePacketReorderSend = 6,
    /// Simulated reorder on receive, percent
    FakePacketReorderRecv = 7,
    /// Extra delay applied to reordered packets, ms
    FakePacketReorderTime = 8,
    /// Upper bound on bytes queued for send
    SendBufferSize = 9,
    /// Minimum send rate, bytes/s
    SendRateMin = 10,
    /// Maximum send rate, bytes/s
    SendRateMax = 11,
    /// Nagle delay, µs
    NagleTime = 12,
    /// Ack/RTT log level
    LogLevelAckRtt = 13,
    /// Packet decode log level
    LogLevelPacketDecode = 14,
    /// Message log level
    LogLevelMessage = 15,
    /// Packet gap log level
    LogLevelPacketGaps = 16,
    /// P2P rendezvous log level
    LogLevelP2PRendezvous = 17,
    /// Relay ping log level
    LogLevelRelayPings = 18,
    /// Consecutive relay ping timeouts before giving up, initial connect
    RelayPingTimeoutsFailInitial = 19,
    /// Consecutive relay ping timeouts before giving up, connected
    RelayPingTimeoutsFail = 20,
    /// Relay pings before the estimate is trusted
    RelayMinPingsBeforePingAccurate = 21,
    /// Use one socket for all relays
    RelaySingleSocket = 22,
    /// Accept unauthenticated IP connections
    IpAllowWithoutAuth = 23,
    /// Timeout while connecting, ms
    TimeoutInitial = 24,
    /// Timeout once connected, ms
    TimeoutConnected = 25,
    /// Simulated duplication on send, percent
    FakePacketDupSend = 26,
    /// Simulated duplication on receive, percent
    FakePacketDupRecv = 27,
    /// Maximum delay of a duplicated packet, µs
    FakePacketDupTimeMax = 28,
    /// Force a relay cluster
    RelayForceCluster = 29,
    /// Debug ticket address
    RelayDebugTicketAddress = 30,
    /// Force a proxy address
    RelayForceProxyAddr = 31,
    /// Maximum UDP payload, bytes
    MtuPacketSize = 32,
    /// Allow unencrypted traffic (0..3)
    Unencrypted = 34,
    /// Symmetric connect mode
    SymmetricConnect = 37,
    /// Local virtual port, -1 for none
    LocalVirtualPort = 38,
    /// Initial connection user data
    ConnectionUserData = 40,
    /// Connection status change callback
    ConnectionStatusChanged = 201,
}

/// Compiled-in default for a key
#[derive(Debug, Clone, Copy)]
enum DefaultValue {
    Int32(i32),
    Int64(i64),
    Float(f32),
    Str(&'static str),
    NoCallback,
}

struct KeyMeta {
    name: &'static str,
    scope: ConfigScope,
    default: DefaultValue,
    range: Option<(f64, f64)>,
}

const PERCENT: Option<(f64, f64)> = Some((0.0, 100.0));

fn meta(
    name: &'static str,
    scope: ConfigScope,
    default: DefaultValue,
    range: Option<(f64, f64)>,
) -> KeyMeta {
    KeyMeta {
        name,
        scope,
        default,
        range,
    }
}

impl ConfigKey {
    /// Every key, in id order
    pub const ALL: [ConfigKey; 36] = [
        ConfigKey::FakePacketLossSend,
        ConfigKey::FakePacketLossRecv,
        ConfigKey::FakePacketLagSend,
        ConfigKey::FakePacketLagRecv,
        ConfigKey::FakePacketReorderSend,
        ConfigKey::FakePacketReorderRecv,
        ConfigKey::FakePacketReorderTime,
        ConfigKey::SendBufferSize,
        ConfigKey::SendRateMin,
        ConfigKey::SendRateMax,
        ConfigKey::NagleTime,
        ConfigKey::LogLevelAckRtt,
        ConfigKey::LogLevelPacketDecode,
        ConfigKey::LogLevelMessage,
        ConfigKey::LogLevelPacketGaps,
        ConfigKey::LogLevelP2PRendezvous,
        ConfigKey::LogLevelRelayPings,
        ConfigKey::RelayPingTimeoutsFailInitial,
        ConfigKey::RelayPingTimeoutsFail,
        ConfigKey::RelayMinPingsBeforePingAccurate,
        ConfigKey::RelaySingleSocket,
        ConfigKey::IpAllowWithoutAuth,
        ConfigKey::TimeoutInitial,
        ConfigKey::TimeoutConnected,
        ConfigKey::FakePacketDupSend,
        ConfigKey::FakePacketDupRecv,
        ConfigKey::FakePacketDupTimeMax,
        ConfigKey::RelayForceCluster,
        ConfigKey::RelayDebugTicketAddress,
        ConfigKey::RelayForceProxyAddr,
        ConfigKey::MtuPacketSize,
        ConfigKey::Unencrypted,
        ConfigKey::SymmetricConnect,
        ConfigKey::LocalVirtualPort,
        ConfigKey::ConnectionUserData,
        ConfigKey::ConnectionStatusChanged,
    ];

    fn meta(self) -> KeyMeta {
        use ConfigScope::*;
        use DefaultValue::*;
        let level = Some((log_level::NONE as f64, log_level::EVERYTHING as f64));
        match self {
            ConfigKey::FakePacketLossSend => {
                meta("fake_packet_loss_send", Global, Float(0.0), PERCENT)
            }
            ConfigKey::FakePacketLossRecv => {
                meta("fake_packet_loss_recv", Global, Float(0.0), PERCENT)
            }
            ConfigKey::FakePacketLagSend => {
                meta("fake_packet_lag_send", Global, Int32(0), Some((0.0, 5000.0)))
            }
            ConfigKey::FakePacketLagRecv => {
                meta("fake_packet_lag_recv", Global, Int32(0), Some((0.0, 5000.0)))
            }
            ConfigKey::FakePacketReorderSend => {
                meta("fake_packet_reorder_send", Global, Float(0.0), PERCENT)
            }
            ConfigKey::FakePacketReorderRecv => {
                meta("fake_packet_reorder_recv", Global, Float(0.0), PERCENT)
            }
            ConfigKey::FakePacketReorderTime => {
                meta("fake_packet_reorder_time", Global, Int32(15), Some((0.0, 5000.0)))
            }
            ConfigKey::FakePacketDupSend => {
                meta("fake_packet_dup_send", Global, Float(0.0), PERCENT)
            }
            ConfigKey::FakePacketDupRecv => {
                meta("fake_packet_dup_recv", Global, Float(0.0), PERCENT)
            }
            ConfigKey::FakePacketDupTimeMax => {
                meta("fake_packet_dup_time_max", Global, Int32(10_000), Some((0.0, 5_000_000.0)))
            }
            ConfigKey::SendBufferSize => {
                meta(
                    "send_buffer_size",
                    Connection,
                    Int32(512 * 1024),
                    Some((0.0, 128.0 * 1024.0 * 1024.0)),
                )
            }
            ConfigKey::SendRateMin => {
                meta(
                    "send_rate_min",
                    Connection,
                    Int32(256 * 1024),
                    Some((1024.0, i32::MAX as f64)),
                )
            }
            ConfigKey::SendRateMax => {
                meta(
                    "send_rate_max",
                    Connection,
                    Int32(256 * 1024),
                    Some((1024.0, i32::MAX as f64)),
                )
            }
            ConfigKey::NagleTime => {
                meta("nagle_time", Connection, Int32(5000), Some((0.0, 20_000.0)))
            }
            ConfigKey::LogLevelAckRtt => {
                meta("log_level_ack_rtt", Connection, Int32(log_level::WARNING), level)
            }
            ConfigKey::LogLevelPacketDecode => {
                meta("log_level_packet_decode", Connection, Int32(log_level::WARNING), level)
            }
            ConfigKey::LogLevelMessage => {
                meta("log_level_message", Connection, Int32(log_level::WARNING), level)
            }
            ConfigKey::LogLevelPacketGaps => {
                meta("log_level_packet_gaps", Connection, Int32(log_level::WARNING), level)
            }
            ConfigKey::LogLevelP2PRendezvous => {
                meta("log_level_p2p_rendezvous", Connection, Int32(log_level::WARNING), level)
            }
            ConfigKey::LogLevelRelayPings => {
                meta("log_level_relay_pings", Global, Int32(log_level::WARNING), level)
            }
            ConfigKey::RelayPingTimeoutsFailInitial => {
                meta("relay_ping_timeouts_fail_initial", Global, Int32(0), Some((0.0, 1000.0)))
            }
            ConfigKey::RelayPingTimeoutsFail => {
                meta("relay_ping_timeouts_fail", Global, Int32(0), Some((0.0, 1000.0)))
            }
            ConfigKey::RelayMinPingsBeforePingAccurate => {
                meta("relay_min_pings_before_ping_accurate", Global, Int32(10), Some((0.0, 100.0)))
            }
            ConfigKey::RelaySingleSocket => {
                meta("relay_single_socket", Global, Int32(0), Some((0.0, 1.0)))
            }
            ConfigKey::RelayForceCluster => meta("relay_force_cluster", Global, Str(""), None),
            ConfigKey::RelayDebugTicketAddress => {
                meta("relay_debug_ticket_address", Global, Str(""), None)
            }
            ConfigKey::RelayForceProxyAddr => meta("relay_force_proxy_addr", Global, Str(""), None),
            ConfigKey::IpAllowWithoutAuth => {
                meta("ip_allow_without_auth", ListenSocket, Int32(0), Some((0.0, 2.0)))
            }
            ConfigKey::TimeoutInitial => {
                meta("timeout_initial", Connection, Int32(10_000), Some((0.0, i32::MAX as f64)))
            }
            ConfigKey::TimeoutConnected => {
                meta("timeout_connected", Connection, Int32(10_000), Some((0.0, i32::MAX as f64)))
            }
            ConfigKey::MtuPacketSize => {
                meta("mtu_packet_size", Connection, Int32(1300), Some((200.0, 1500.0)))
            }
            ConfigKey::Unencrypted => meta("unencrypted", Connection, Int32(0), Some((0.0, 3.0))),
            ConfigKey::SymmetricConnect => {
                meta("symmetric_connect", Connection, Int32(0), Some((0.0, 1.0)))
            }
            ConfigKey::LocalVirtualPort => {
                meta("local_virtual_port", Connection, Int32(-1), Some((-1.0, 65535.0)))
            }
            ConfigKey::ConnectionUserData => {
                meta("connection_user_data", Connection, Int64(-1), None)
            }
            ConfigKey::ConnectionStatusChanged => {
                meta("connection_status_changed", Connection, NoCallback, None)
            }
        }
    }

    /// First key, for enumeration without a hardcoded list
    pub fn first() -> ConfigKey {
        Self::ALL[0]
    }

    /// Following key in id order
    pub fn next(self) -> Option<ConfigKey> {
        let idx = Self::ALL.iter().position(|k| *k == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// All keys in id order
    pub fn iter() -> impl Iterator<Item = ConfigKey> {
        Self::ALL.iter().copied()
    }

    /// Stable numeric id
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Stable name, as used in config files
    pub fn name(self) -> &'static str {
        self.meta().name
    }

    /// Declared value type
    pub fn data_type(self) -> ConfigDataType {
        match self.meta().default {
            DefaultValue::Int32(_) => ConfigDataType::Int32,
            DefaultValue::Int64(_) => ConfigDataType::Int64,
            DefaultValue::Float(_) => ConfigDataType::Float,
            DefaultValue::Str(_) => ConfigDataType::String,
            DefaultValue::NoCallback => ConfigDataType::FunctionPtr,
        }
    }

    /// Narrowest scope this key may be set at
    pub fn scope(self) -> ConfigScope {
        self.meta().scope
    }

    /// Inclusive valid range for numeric keys
    pub fn range(self) -> Option<(f64, f64)> {
        self.meta().range
    }

    /// Compiled-in default; `None` for callbacks, which default to unset
    pub fn default_value(self) -> Option<ConfigValue> {
        match self.meta().default {
            DefaultValue::Int32(v) => Some(ConfigValue::Int32(v)),
            DefaultValue::Int64(v) => Some(ConfigValue::Int64(v)),
            DefaultValue::Float(v) => Some(ConfigValue::Float(v)),
            DefaultValue::Str(v) => Some(ConfigValue::String(v.to_string())),
            DefaultValue::NoCallback => None,
        }
    }

    /// Look a key up by name
    pub fn from_name(name: &str) -> Result<ConfigKey, ConfigError> {
        Self::iter()
            .find(|k| k.name() == name)
            .ok_or_else(|| ConfigError::BadValue(format!("unknown config key {:?}", name)))
    }
}

impl TryFrom<i32> for ConfigKey {
    type Error = ConfigError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::iter()
            .find(|k| k.id() == value)
            .ok_or_else(|| ConfigError::BadValue(format!("unknown config key id {}", value)))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_covers_every_key() {
        let mut key = Some(ConfigKey::first());
        let mut seen = Vec::new();
        while let Some(k) = key {
            seen.push(k);
            key = k.next();
        }
        assert_eq!(seen, ConfigKey::ALL.to_vec());
        assert!(seen.windows(2).all(|w| w[0].id() < w[1].id()));
    }

    #[test]
    fn test_names_are_unique_and_resolvable() {
        for key in ConfigKey::iter() {
            assert_eq!(ConfigKey::from_name(key.name()).unwrap(), key);
            assert_eq!(ConfigKey::try_from(key.id()).unwrap(), key);
        }
        assert!(matches!(
            ConfigKey::from_name("no_such_key"),
            Err(ConfigError::BadValue(_))
        ));
        assert!(matches!(ConfigKey::try_from(9999), Err(ConfigError::BadValue(_))));
    }

    #[test]
    fn test_defaults_match_declared_types() {
        for key in ConfigKey::iter() {
            match key.default_value() {
                Some(v) => assert_eq!(v.data_type(), key.data_type(), "{}", key),
                None => assert_eq!(key.data_type(), ConfigDataType::FunctionPtr),
            }
        }
        assert_eq!(ConfigKey::ConnectionUserData.data_type(), ConfigDataType::Int64);
        assert_eq!(ConfigKey::FakePacketLossSend.data_type(), ConfigDataType::Float);
        assert_eq!(ConfigKey::RelayForceCluster.data_type(), ConfigDataType::String);
    }
}
