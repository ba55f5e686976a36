//! Binary address and peer identity codecs for netsockets.
//!
//! This crate provides the value types the session facade uses to name peers:
//! a fixed-size IP address that round-trips IPv4, IPv6 and IPv4-mapped IPv6
//! without loss, and a fixed-size tagged peer identity.
//!
//! ## Wire Format
//!
//! ```text
//! WireAddress (18B)
//! +----------------------+----------------------------+
//! | ip (16B)             | IPv6 layout, IPv4 mapped   |
//! +----------------------+----------------------------+
//! | u16 port             | big-endian                 |
//! +----------------------+----------------------------+
//!
//! PeerIdentity (136B)
//! +----------------------+----------------------------+
//! | i32 type             | Invalid/Ip/String/Bytes/Id |
//! +----------------------+----------------------------+
//! | i32 size             | meaningful payload length  |
//! +----------------------+----------------------------+
//! | payload (128B)       | zero padded                |
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod error;
pub mod identity;

// Re-export main types
pub use address::{WireAddress, IPV4_MAPPED_PREFIX, WIRE_ADDRESS_SIZE};
pub use error::WireError;
pub use identity::{
    IdentityType, PeerIdentity, IDENTITY_PAYLOAD_SIZE, IDENTITY_WIRE_SIZE, MAX_GENERIC_BYTES_LEN,
    MAX_GENERIC_STRING_LEN,
};
