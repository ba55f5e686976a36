//! Binary IP address codec.
//!
//! Every address is stored in the 16-byte IPv6 layout. IPv4 addresses live in
//! the IPv4-mapped range (`::ffff:a.b.c.d`) and are always rendered back as
//! dotted-quad text, so IPv4-only callers never see colon-hex output.

use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// Encoded size of a [`WireAddress`]: 16 IP bytes plus a 16-bit port
pub const WIRE_ADDRESS_SIZE: usize = 18;

/// Prefix marking an IPv4-mapped IPv6 address
pub const IPV4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

/// IP address and port in canonical 16-byte form
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WireAddress {
    /// IPv6 bytes, network order; IPv4 is stored mapped
    pub ip: [u8; 16],
    /// Port, host order
    pub port: u16,
}

impl WireAddress {
    /// Build an address from any std IP address
    pub fn new(ip: IpAddr, port: u16) -> Self {
        let ip = match ip {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };
        Self { ip, port }
    }

    /// The all-zeros address (`::`, port 0)
    pub fn unspecified() -> Self {
        Self::default()
    }

    /// `::1` on the given port
    pub fn localhost(port: u16) -> Self {
        Self::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port)
    }

    /// Build from a host-order IPv4 value
    pub fn from_ipv4_u32(ip: u32, port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::from(ip)), port)
    }

    /// Parse a bare IPv4 or IPv6 address (no port)
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let ip = IpAddr::from_str(text.trim())
            .map_err(|_| WireError::InvalidFormat(format!("not an IP address: {:?}", text)))?;
        Ok(Self::new(ip, 0))
    }

    /// Parse text that must be an IPv4 address
    pub fn parse_ipv4(text: &str) -> Result<Self, WireError> {
        let addr = Self::parse(text)?;
        if !addr.is_ipv4() {
            return Err(WireError::InvalidFormat(format!(
                "expected an IPv4 address, got {:?}",
                text
            )));
        }
        Ok(addr)
    }

    /// Replace the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// True if the address lies in the IPv4-mapped range
    pub fn is_ipv4(&self) -> bool {
        self.ip[..12] == IPV4_MAPPED_PREFIX
    }

    /// IPv4 view, if mapped
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        if self.is_ipv4() {
            Some(Ipv4Addr::new(self.ip[12], self.ip[13], self.ip[14], self.ip[15]))
        } else {
            None
        }
    }

    /// Host-order IPv4 value, or 0 if not mapped
    pub fn ipv4_u32(&self) -> u32 {
        self.ipv4().map(u32::from).unwrap_or(0)
    }

    /// Canonical std address; mapped addresses come back as V4
    pub fn ip(&self) -> IpAddr {
        match self.ipv4() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(Ipv6Addr::from(self.ip)),
        }
    }

    /// True for `::` (any port)
    pub fn is_unspecified(&self) -> bool {
        self.ip == [0u8; 16]
    }

    /// True for `127.0.0.0/8` and `::1`
    pub fn is_loopback(&self) -> bool {
        match self.ipv4() {
            Some(v4) => v4.is_loopback(),
            None => Ipv6Addr::from(self.ip).is_loopback(),
        }
    }

    /// Reset to the unspecified address
    pub fn clear(&mut self) {
        *self = Self::unspecified();
    }

    /// Canonical text without port
    pub fn format(&self) -> String {
        match self.ipv4() {
            Some(v4) => v4.to_string(),
            None => Ipv6Addr::from(self.ip).to_string(),
        }
    }

    /// Canonical text, optionally with `:port` (`[v6]:port` for IPv6)
    pub fn to_string_with_port(&self, with_port: bool) -> String {
        if !with_port {
            return self.format();
        }
        if self.is_ipv4() {
            format!("{}:{}", self.format(), self.port)
        } else {
            format!("[{}]:{}", self.format(), self.port)
        }
    }

    /// Encode to the 18-byte wire form
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.ip);
        buf.put_u16(self.port);
    }

    /// Decode from the 18-byte wire form
    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        if buf.len() < WIRE_ADDRESS_SIZE {
            return Err(WireError::Incomplete {
                needed: WIRE_ADDRESS_SIZE,
                available: buf.len(),
            });
        }
        let mut ip = [0u8; 16];
        buf.copy_to_slice(&mut ip);
        let port = buf.get_u16();
        Ok(Self { ip, port })
    }
}

impl fmt::Display for WireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl fmt::Debug for WireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireAddress({})", self.to_string_with_port(true))
    }
}

impl FromStr for WireAddress {
    type Err = WireError;

    /// Accepts `ip`, `a.b.c.d:port` or `[v6]:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(sock) = SocketAddr::from_str(s) {
            return Ok(sock.into());
        }
        Self::parse(s)
    }
}

impl From<SocketAddr> for WireAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl From<WireAddress> for SocketAddr {
    fn from(addr: WireAddress) -> Self {
        SocketAddr::new(addr.ip(), addr.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_round_trip() {
        for text in ["1.2.3.4", "127.0.0.1", "0.0.0.0", "255.255.255.255", "10.0.42.7"] {
            let addr = WireAddress::parse(text).unwrap();
            assert!(addr.is_ipv4());
            assert_eq!(addr.format(), text);
        }
    }

    #[test]
    fn test_mapped_formats_as_dotted_quad() {
        let addr = WireAddress::parse("::ffff:192.168.1.20").unwrap();
        assert_eq!(addr.format(), "192.168.1.20");
        assert_eq!(addr.ipv4(), Some(Ipv4Addr::new(192, 168, 1, 20)));

        let mut raw = WireAddress::unspecified();
        raw.ip[..12].copy_from_slice(&IPV4_MAPPED_PREFIX);
        raw.ip[12..].copy_from_slice(&[8, 8, 4, 4]);
        assert!(!raw.format().contains(':'));
        assert_eq!(raw.to_string(), "8.8.4.4");
    }

    #[test]
    fn test_ipv6_format() {
        let addr = WireAddress::parse("2001:db8::1").unwrap();
        assert!(!addr.is_ipv4());
        assert_eq!(addr.format(), "2001:db8::1");
        assert_eq!(addr.with_port(443).to_string_with_port(true), "[2001:db8::1]:443");
    }

    #[test]
    fn test_invalid_format() {
        assert!(matches!(
            WireAddress::parse("not-an-ip"),
            Err(WireError::InvalidFormat(_))
        ));
        assert!(matches!(
            WireAddress::parse("1.2.3"),
            Err(WireError::InvalidFormat(_))
        ));
        assert!(matches!(
            WireAddress::parse_ipv4("::1"),
            Err(WireError::InvalidFormat(_))
        ));
        assert!(WireAddress::parse_ipv4("10.1.1.1").is_ok());
    }

    #[test]
    fn test_loopback() {
        assert!(WireAddress::parse("127.0.0.1").unwrap().is_loopback());
        assert!(WireAddress::parse("127.8.9.10").unwrap().is_loopback());
        assert!(WireAddress::parse("::1").unwrap().is_loopback());
        assert!(!WireAddress::parse("10.0.0.1").unwrap().is_loopback());
        assert!(!WireAddress::parse("::2").unwrap().is_loopback());
    }

    #[test]
    fn test_from_str_with_port() {
        let v4: WireAddress = "127.0.0.1:27015".parse().unwrap();
        assert_eq!(v4.port, 27015);
        assert_eq!(v4.to_string_with_port(true), "127.0.0.1:27015");

        let v6: WireAddress = "[::1]:9000".parse().unwrap();
        assert_eq!(v6.port, 9000);
        assert!(v6.is_loopback());

        let bare: WireAddress = "10.0.0.2".parse().unwrap();
        assert_eq!(bare.port, 0);
    }

    #[test]
    fn test_ipv4_u32() {
        let addr = WireAddress::from_ipv4_u32(0x7f00_0001, 80);
        assert_eq!(addr.format(), "127.0.0.1");
        assert_eq!(addr.ipv4_u32(), 0x7f00_0001);
        assert_eq!(WireAddress::localhost(1).ipv4_u32(), 0);
    }

    #[test]
    fn test_encode_decode() {
        let addr: WireAddress = "172.16.5.4:6000".parse().unwrap();
        let mut buf = BytesMut::new();
        addr.encode(&mut buf);
        assert_eq!(buf.len(), WIRE_ADDRESS_SIZE);
        assert_eq!(&buf[..12], &IPV4_MAPPED_PREFIX);

        let mut bytes = buf.freeze();
        assert_eq!(WireAddress::decode(&mut bytes).unwrap(), addr);

        let mut short = Bytes::from_static(&[0u8; 4]);
        assert!(matches!(
            WireAddress::decode(&mut short),
            Err(WireError::Incomplete { needed: 18, available: 4 })
        ));
    }

    #[test]
    fn test_socket_addr_conversion() {
        let sock: SocketAddr = "192.0.2.1:53".parse().unwrap();
        let addr = WireAddress::from(sock);
        assert_eq!(SocketAddr::from(addr), sock);
    }

    #[test]
    fn test_serde_json() {
        let addr: WireAddress = "[2001:db8::7]:8443".parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        let back: WireAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
