//! Peer identity codec.
//!
//! A [`PeerIdentity`] names the remote side of a connection. In memory it is a
//! plain enum, so equality always covers discriminant and payload together. On
//! the wire it is a fixed 136-byte tagged union:
//!
//! ```text
//! +------------------+---------------------------------+
//! | i32 type         | discriminant (see IdentityType) |
//! +------------------+---------------------------------+
//! | i32 size         | meaningful payload bytes        |
//! +------------------+---------------------------------+
//! | payload (128B)   | zero padded                     |
//! +------------------+---------------------------------+
//! ```

use crate::{WireAddress, WireError, WIRE_ADDRESS_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Encoded size of a [`PeerIdentity`]
pub const IDENTITY_WIRE_SIZE: usize = 136;

/// Payload area of the encoded identity
pub const IDENTITY_PAYLOAD_SIZE: usize = 128;

/// Longest generic string, excluding the NUL terminator
pub const MAX_GENERIC_STRING_LEN: usize = 31;

/// Longest generic byte blob
pub const MAX_GENERIC_BYTES_LEN: usize = 32;

/// Identity discriminant as stored on the wire
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityType {
    /// No identity
    Invalid = 0,
    /// Identified by IP address and port
    IpAddress = 1,
    /// Application-defined string
    GenericString = 2,
    /// Application-defined bytes
    GenericBytes = 3,
    /// Numeric account id
    NumericId = 16,
}

impl TryFrom<i32> for IdentityType {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(IdentityType::Invalid),
            1 => Ok(IdentityType::IpAddress),
            2 => Ok(IdentityType::GenericString),
            3 => Ok(IdentityType::GenericBytes),
            16 => Ok(IdentityType::NumericId),
            _ => Err(WireError::UnknownIdentityType(value)),
        }
    }
}

/// Opaque identity of a peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum PeerIdentity {
    /// No identity
    #[default]
    Invalid,
    /// IP address and port
    IpAddress(WireAddress),
    /// Generic string (at most 31 bytes, no NUL)
    GenericString(String),
    /// Generic bytes (1..=32)
    GenericBytes(SmallVec<[u8; MAX_GENERIC_BYTES_LEN]>),
    /// Numeric account id
    NumericId(u64),
}

impl PeerIdentity {
    /// Identity carrying a numeric account id
    pub fn from_numeric_id(id: u64) -> Self {
        PeerIdentity::NumericId(id)
    }

    /// Identity for an IP address
    pub fn from_ip_address(addr: WireAddress) -> Self {
        PeerIdentity::IpAddress(addr)
    }

    /// Identity for a generic string
    pub fn from_generic_string(s: &str) -> Result<Self, WireError> {
        validate_generic_string(s)?;
        Ok(PeerIdentity::GenericString(s.to_string()))
    }

    /// Identity for a generic byte blob
    pub fn from_generic_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        validate_generic_bytes(bytes)?;
        Ok(PeerIdentity::GenericBytes(SmallVec::from_slice(bytes)))
    }

    /// The `::1` identity used for unauthenticated local peers
    pub fn local_host() -> Self {
        PeerIdentity::IpAddress(WireAddress::localhost(0))
    }

    /// Discriminant
    pub fn kind(&self) -> IdentityType {
        match self {
            PeerIdentity::Invalid => IdentityType::Invalid,
            PeerIdentity::IpAddress(_) => IdentityType::IpAddress,
            PeerIdentity::GenericString(_) => IdentityType::GenericString,
            PeerIdentity::GenericBytes(_) => IdentityType::GenericBytes,
            PeerIdentity::NumericId(_) => IdentityType::NumericId,
        }
    }

    /// True iff the discriminant is `Invalid`
    pub fn is_invalid(&self) -> bool {
        matches!(self, PeerIdentity::Invalid)
    }

    /// Reset to `Invalid`
    pub fn clear(&mut self) {
        *self = PeerIdentity::Invalid;
    }

    /// Numeric id, only for `NumericId` identities
    pub fn numeric_id(&self) -> Option<u64> {
        match self {
            PeerIdentity::NumericId(id) => Some(*id),
            _ => None,
        }
    }

    /// Replace with a numeric id
    pub fn set_numeric_id(&mut self, id: u64) {
        *self = PeerIdentity::NumericId(id);
    }

    /// Address, only for `IpAddress` identities
    pub fn ip_address(&self) -> Option<&WireAddress> {
        match self {
            PeerIdentity::IpAddress(addr) => Some(addr),
            _ => None,
        }
    }

    /// Replace with an IP address
    pub fn set_ip_address(&mut self, addr: WireAddress) {
        *self = PeerIdentity::IpAddress(addr);
    }

    /// Generic string, only for `GenericString` identities
    pub fn generic_string(&self) -> Option<&str> {
        match self {
            PeerIdentity::GenericString(s) => Some(s),
            _ => None,
        }
    }

    /// Replace with a generic string; on error the identity is unchanged
    pub fn set_generic_string(&mut self, s: &str) -> Result<(), WireError> {
        *self = Self::from_generic_string(s)?;
        Ok(())
    }

    /// Generic bytes, only for `GenericBytes` identities
    pub fn generic_bytes(&self) -> Option<&[u8]> {
        match self {
            PeerIdentity::GenericBytes(b) => Some(b),
            _ => None,
        }
    }

    /// Replace with generic bytes; on error the identity is unchanged
    pub fn set_generic_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        *self = Self::from_generic_bytes(bytes)?;
        Ok(())
    }

    /// Replace with the local host identity
    pub fn set_local_host(&mut self) {
        *self = Self::local_host();
    }

    /// True for an IP identity on a loopback address
    pub fn is_local_host(&self) -> bool {
        self.ip_address().map(|a| a.is_loopback()).unwrap_or(false)
    }

    /// Encode to the fixed 136-byte wire form
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        let mut payload = BytesMut::with_capacity(IDENTITY_PAYLOAD_SIZE);
        match self {
            PeerIdentity::Invalid => {}
            PeerIdentity::IpAddress(addr) => addr.encode(&mut payload),
            PeerIdentity::GenericString(s) => {
                validate_generic_string(s)?;
                payload.put_slice(s.as_bytes());
                payload.put_u8(0);
            }
            PeerIdentity::GenericBytes(b) => {
                validate_generic_bytes(b)?;
                payload.put_slice(b);
            }
            PeerIdentity::NumericId(id) => payload.put_u64(*id),
        }

        buf.reserve(IDENTITY_WIRE_SIZE);
        buf.put_i32(self.kind() as i32);
        buf.put_i32(payload.len() as i32);
        buf.put_slice(&payload);
        buf.put_bytes(0, IDENTITY_PAYLOAD_SIZE - payload.len());
        Ok(())
    }

    /// Decode from the fixed 136-byte wire form
    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        if buf.len() < IDENTITY_WIRE_SIZE {
            return Err(WireError::Incomplete {
                needed: IDENTITY_WIRE_SIZE,
                available: buf.len(),
            });
        }

        let kind = IdentityType::try_from(buf.get_i32())?;
        let size = buf.get_i32();
        let mut payload = buf.split_to(IDENTITY_PAYLOAD_SIZE);
        if size < 0 || size as usize > IDENTITY_PAYLOAD_SIZE {
            return Err(WireError::Size(size.max(0) as usize));
        }
        let size = size as usize;

        match kind {
            IdentityType::Invalid => Ok(PeerIdentity::Invalid),
            IdentityType::IpAddress => {
                if size != WIRE_ADDRESS_SIZE {
                    return Err(WireError::Size(size));
                }
                Ok(PeerIdentity::IpAddress(WireAddress::decode(&mut payload)?))
            }
            IdentityType::GenericString => {
                if size == 0 || payload[size - 1] != 0 {
                    return Err(WireError::InvalidFormat(
                        "generic string is not NUL terminated".to_string(),
                    ));
                }
                let s = std::str::from_utf8(&payload[..size - 1]).map_err(|_| {
                    WireError::InvalidFormat("generic string is not UTF-8".to_string())
                })?;
                Self::from_generic_string(s)
            }
            IdentityType::GenericBytes => Self::from_generic_bytes(&payload[..size]),
            IdentityType::NumericId => {
                if size != 8 {
                    return Err(WireError::Size(size));
                }
                Ok(PeerIdentity::NumericId(payload.get_u64()))
            }
        }
    }
}

fn validate_generic_string(s: &str) -> Result<(), WireError> {
    if s.is_empty() || s.len() > MAX_GENERIC_STRING_LEN {
        return Err(WireError::InvalidFormat(format!(
            "generic string must be 1..={} bytes, got {}",
            MAX_GENERIC_STRING_LEN,
            s.len()
        )));
    }
    if s.as_bytes().contains(&0) {
        return Err(WireError::InvalidFormat(
            "generic string contains NUL".to_string(),
        ));
    }
    Ok(())
}

fn validate_generic_bytes(bytes: &[u8]) -> Result<(), WireError> {
    if bytes.is_empty() || bytes.len() > MAX_GENERIC_BYTES_LEN {
        return Err(WireError::Size(bytes.len()));
    }
    Ok(())
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerIdentity::Invalid => f.write_str("invalid"),
            PeerIdentity::IpAddress(addr) => write!(f, "ip:{}", addr.to_string_with_port(true)),
            PeerIdentity::GenericString(s) => write!(f, "str:{}", s),
            PeerIdentity::GenericBytes(b) => {
                f.write_str("gen:")?;
                for byte in b.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            PeerIdentity::NumericId(id) => write!(f, "id:{}", id),
        }
    }
}

impl FromStr for PeerIdentity {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "invalid" {
            return Ok(PeerIdentity::Invalid);
        }
        let (prefix, rest) = s
            .split_once(':')
            .ok_or_else(|| WireError::InvalidFormat(format!("missing identity prefix: {:?}", s)))?;
        match prefix {
            "ip" => Ok(PeerIdentity::IpAddress(rest.parse()?)),
            "str" => Self::from_generic_string(rest),
            "gen" => Self::from_generic_bytes(&decode_hex(rest)?),
            "id" => rest
                .parse::<u64>()
                .map(PeerIdentity::NumericId)
                .map_err(|_| WireError::InvalidFormat(format!("bad numeric id: {:?}", rest))),
            _ => Err(WireError::InvalidFormat(format!(
                "unknown identity prefix: {:?}",
                prefix
            ))),
        }
    }
}

fn decode_hex(text: &str) -> Result<Vec<u8>, WireError> {
    if text.len() % 2 != 0 {
        return Err(WireError::InvalidFormat(format!("odd-length hex: {:?}", text)));
    }
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(WireError::InvalidFormat(format!("bad hex: {:?}", text)));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| WireError::InvalidFormat(format!("bad hex: {:?}", text)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(id: &PeerIdentity) -> PeerIdentity {
        let mut buf = BytesMut::new();
        id.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), IDENTITY_WIRE_SIZE);
        PeerIdentity::decode(&mut buf.freeze()).unwrap()
    }

    #[test]
    fn test_numeric_id() {
        let mut id = PeerIdentity::default();
        assert!(id.is_invalid());
        assert_eq!(id.numeric_id(), None);

        id.set_numeric_id(76561197960265728);
        assert!(!id.is_invalid());
        assert_eq!(id.kind(), IdentityType::NumericId);
        assert_eq!(id.numeric_id(), Some(76561197960265728));
        assert_eq!(id, PeerIdentity::from_numeric_id(76561197960265728));
    }

    #[test]
    fn test_equality_requires_same_discriminant() {
        // Same payload bytes, different discriminants
        let bytes = PeerIdentity::from_generic_bytes(b"abc").unwrap();
        let string = PeerIdentity::from_generic_string("abc").unwrap();
        assert_ne!(bytes, string);

        let a = PeerIdentity::from_numeric_id(7);
        let b = PeerIdentity::from_numeric_id(8);
        assert_ne!(a, b);
        assert_eq!(a, PeerIdentity::from_numeric_id(7));
        assert_ne!(PeerIdentity::Invalid, PeerIdentity::from_numeric_id(0));
    }

    #[test]
    fn test_generic_string_limits() {
        assert!(PeerIdentity::from_generic_string("").is_err());
        assert!(PeerIdentity::from_generic_string(&"x".repeat(31)).is_ok());
        assert!(PeerIdentity::from_generic_string(&"x".repeat(32)).is_err());
        assert!(PeerIdentity::from_generic_string("a\0b").is_err());

        let mut id = PeerIdentity::from_numeric_id(1);
        assert!(id.set_generic_string(&"y".repeat(40)).is_err());
        assert_eq!(id.numeric_id(), Some(1));
    }

    #[test]
    fn test_generic_bytes_limits() {
        assert!(matches!(
            PeerIdentity::from_generic_bytes(&[]),
            Err(WireError::Size(0))
        ));
        assert!(PeerIdentity::from_generic_bytes(&[1u8; 32]).is_ok());
        assert!(matches!(
            PeerIdentity::from_generic_bytes(&[1u8; 33]),
            Err(WireError::Size(33))
        ));
    }

    #[test]
    fn test_wire_form() {
        let ids = [
            PeerIdentity::Invalid,
            PeerIdentity::local_host(),
            PeerIdentity::from_ip_address("10.1.2.3:4000".parse().unwrap()),
            PeerIdentity::from_generic_string("player-one").unwrap(),
            PeerIdentity::from_generic_bytes(&[0xde, 0xad, 0xbe, 0xef]).unwrap(),
            PeerIdentity::from_numeric_id(u64::MAX),
        ];
        for id in &ids {
            assert_eq!(&round_trip(id), id);
        }

        let mut buf = BytesMut::new();
        PeerIdentity::from_numeric_id(5).encode(&mut buf).unwrap();
        assert_eq!(&buf[..4], &16i32.to_be_bytes());
        assert_eq!(&buf[4..8], &8i32.to_be_bytes());
        assert!(buf[16..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let mut buf = BytesMut::new();
        buf.put_i32(42);
        buf.put_i32(0);
        buf.put_bytes(0, IDENTITY_PAYLOAD_SIZE);
        assert!(matches!(
            PeerIdentity::decode(&mut buf.freeze()),
            Err(WireError::UnknownIdentityType(42))
        ));

        let mut short = Bytes::from_static(&[0u8; 10]);
        assert!(matches!(
            PeerIdentity::decode(&mut short),
            Err(WireError::Incomplete { .. })
        ));
    }

    #[test]
    fn test_text_form() {
        let cases = [
            ("invalid", PeerIdentity::Invalid),
            ("id:12345", PeerIdentity::from_numeric_id(12345)),
            ("str:lobby", PeerIdentity::from_generic_string("lobby").unwrap()),
            ("gen:0aff", PeerIdentity::from_generic_bytes(&[0x0a, 0xff]).unwrap()),
            (
                "ip:127.0.0.1:27015",
                PeerIdentity::from_ip_address("127.0.0.1:27015".parse().unwrap()),
            ),
        ];
        for (text, id) in cases {
            assert_eq!(text.parse::<PeerIdentity>().unwrap(), id);
            assert_eq!(id.to_string(), text);
        }
        assert!("bogus".parse::<PeerIdentity>().is_err());
        assert!("gen:abc".parse::<PeerIdentity>().is_err());
        assert!("gen:+f".parse::<PeerIdentity>().is_err());
        assert!("gen:-1".parse::<PeerIdentity>().is_err());
        assert!("id:x".parse::<PeerIdentity>().is_err());
    }

    #[test]
    fn test_local_host() {
        let mut id = PeerIdentity::Invalid;
        id.set_local_host();
        assert!(id.is_local_host());
        assert!(!PeerIdentity::from_numeric_id(1).is_local_host());
    }
}
