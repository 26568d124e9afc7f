// SPDX-License-Identifier: Apache-2.0 OR MIT

//! UDP socket creation for publisher and subscriber connections (spec.md
//! §4.3/§4.4/§6), grounded on `hdds::dds::participant::builder::sockets`
//! (SO_REUSEADDR, multicast join/`IP_MULTICAST_IF`, a short read timeout so
//! a blocking receive worker can still observe a stop flag).

use crate::error::Error;
use crate::transport::address::TransportAddress;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Receive timeout used for the subscriber worker's blocking `recv_from`,
/// so `stop()` is observed promptly (spec.md §5 "suspension points").
pub const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolve a named network interface to its local IPv4 address, via
/// `local-ip-address`'s interface enumeration (falls back to unspecified
/// when unset or unresolved, matching `hdds`'s non-fatal interface
/// resolution in `sockets.rs`).
pub fn resolve_interface(name: Option<&str>) -> Ipv4Addr {
    let Some(name) = name else {
        return Ipv4Addr::UNSPECIFIED;
    };
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces
            .into_iter()
            .find(|(iface_name, addr)| iface_name == name && addr.is_ipv4())
            .and_then(|(_, addr)| match addr {
                std::net::IpAddr::V4(v4) => Some(v4),
                _ => None,
            })
            .unwrap_or(Ipv4Addr::UNSPECIFIED),
        Err(_) => Ipv4Addr::UNSPECIFIED,
    }
}

/// Open the publisher-side sending socket for a connection. Non-multicast
/// destinations use a plain unicast send; multicast destinations set
/// `IP_MULTICAST_IF` to the resolved interface (spec.md §6).
pub fn open_publisher_socket(
    address: &TransportAddress,
    network_interface: Option<&str>,
) -> Result<UdpSocket, Error> {
    let TransportAddress::Udp { host, is_multicast, .. } = address else {
        return Err(Error::Configuration(
            "open_publisher_socket requires a UDP address".into(),
        ));
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into();
    socket.bind(&bind_addr.into())?;

    let udp_socket: UdpSocket = socket.into();

    if *is_multicast {
        let iface = resolve_interface(network_interface);
        udp_socket.set_multicast_ttl_v4(1)?;
        udp_socket.set_multicast_if_v4(&iface)?;
        log::debug!("[publisher] IP_MULTICAST_IF set to {iface} for group {host}");
    }

    Ok(udp_socket)
}

/// Open the subscriber-side receiving socket for a connection, binding to
/// the destination port and joining the multicast group when applicable.
pub fn open_subscriber_socket(
    address: &TransportAddress,
    network_interface: Option<&str>,
) -> Result<UdpSocket, Error> {
    let TransportAddress::Udp { host, port, is_multicast } = address else {
        return Err(Error::Configuration(
            "open_subscriber_socket requires a UDP address".into(),
        ));
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, *port).into();
    socket.bind(&bind_addr.into())?;

    let udp_socket: UdpSocket = socket.into();

    if *is_multicast {
        let iface = resolve_interface(network_interface);
        match udp_socket.join_multicast_v4(host, &iface) {
            Ok(()) => log::debug!("[subscriber] joined multicast {host} on {iface}"),
            Err(e) if e.raw_os_error() == Some(98) => {
                log::debug!("[subscriber] multicast {host} already joined, skipping");
            }
            Err(e) => return Err(Error::from(e)),
        }
    }

    udp_socket.set_read_timeout(Some(RECV_POLL_INTERVAL))?;
    Ok(udp_socket)
}
