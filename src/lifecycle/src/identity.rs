//! Discovery of the node's own routable address.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Any routable destination works; connecting a UDP socket sends no packet.
const PROBE_TARGET: (Ipv4Addr, u16) = (Ipv4Addr::new(10, 254, 254, 254), 1);

/// Primary IPv4 address of this host, or loopback when no route exists.
pub fn local_address() -> Ipv4Addr {
    match probe() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::warn!(
                "[NetworkIdentity] Could not determine primary address ({}), using loopback",
                e
            );
            Ipv4Addr::LOCALHOST
        }
    }
}

fn probe() -> std::io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(PROBE_TARGET)?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(v4) if !v4.is_unspecified() => Ok(v4),
        other => Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("unexpected local address {}", other),
        )),
    }
}
