//! Discover the address other machines on the LAN should use.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Best-guess LAN IPv4 of this host.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outbound interface, whose address we then read back.
pub fn lan_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// Address to advertise for a listener bound to `bound`.
///
/// Wildcard binds advertise the LAN address (loopback if none is found);
/// a specific bind is advertised as-is.
pub fn advertised_addr(bound: SocketAddr) -> SocketAddr {
    if bound.ip().is_unspecified() {
        let ip = lan_ipv4().unwrap_or(Ipv4Addr::LOCALHOST);
        SocketAddr::new(IpAddr::V4(ip), bound.port())
    } else {
        bound
    }
}
