//! Basic usage example for the netsockets address and identity codecs.

use bytes::BytesMut;
use netsockets_wire::{PeerIdentity, WireAddress, IDENTITY_WIRE_SIZE, WIRE_ADDRESS_SIZE};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== netsockets wire example ===\n");

    // 1. Addresses: IPv4 is stored IPv4-mapped, IPv6 as-is
    let v4: WireAddress = "192.168.1.20:27015".parse()?;
    let v6: WireAddress = "[2001:db8::1]:27015".parse()?;
    println!("1. Parsed {} (ipv4={}) and {}", v4, v4.is_ipv4(), v6);

    let mut buf = BytesMut::with_capacity(2 * WIRE_ADDRESS_SIZE);
    v4.encode(&mut buf);
    v6.encode(&mut buf);
    let mut bytes = buf.freeze();
    println!("   Encoded both in {} bytes", bytes.len());
    let a = WireAddress::decode(&mut bytes)?;
    let b = WireAddress::decode(&mut bytes)?;
    println!("   Decoded {} and {}", a, b);

    // 2. Identities
    let ids = [
        PeerIdentity::from_numeric_id(76561197960287930),
        PeerIdentity::from_ip_address(v4),
        PeerIdentity::from_generic_string("match-server")?,
        PeerIdentity::from_generic_bytes(&[0xde, 0xad, 0xbe, 0xef])?,
        PeerIdentity::local_host(),
    ];
    println!("\n2. Identities:");
    for id in &ids {
        let mut buf = BytesMut::with_capacity(IDENTITY_WIRE_SIZE);
        id.encode(&mut buf)?;
        let parsed: PeerIdentity = id.to_string().parse()?;
        println!(
            "   {:<28} kind={:?} wire={}B text round-trip={}",
            id.to_string(),
            id.kind(),
            buf.len(),
            parsed == *id
        );
    }

    println!("\n=== Example completed ===");
    Ok(())
}
