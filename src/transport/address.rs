// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Parsing of PubSub connection addresses (spec.md §6): `opc.udp://host:port`
//! and the broker forms `mqtt://`/`mqtts://`. Grounded on the manual
//! `SocketAddr` parsing `hdds`'s `sockets.rs` uses rather than pulling in a
//! URL-parsing crate for two fixed schemes.

use std::net::Ipv4Addr;

/// A parsed `PubSubConnection` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportAddress {
    /// `opc.udp://host:port`. `is_multicast` is true when `host` falls in
    /// 224.0.0.0/4 (spec.md §6).
    Udp {
        host: Ipv4Addr,
        port: u16,
        is_multicast: bool,
    },
    /// `mqtt://` or `mqtts://host:port`; recognized but not implemented
    /// (spec.md §6 "same contract").
    Broker {
        secure: bool,
        host: String,
        port: u16,
    },
}

/// Error parsing a transport address URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParseError(pub String);

impl std::fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid transport address: {}", self.0)
    }
}

impl std::error::Error for AddressParseError {}

impl TransportAddress {
    pub fn parse(url: &str) -> Result<Self, AddressParseError> {
        if let Some(rest) = url.strip_prefix("opc.udp://") {
            let (host, port) = split_host_port(rest)
                .ok_or_else(|| AddressParseError(format!("missing port in '{url}'")))?;
            let host: Ipv4Addr = host
                .parse()
                .map_err(|_| AddressParseError(format!("invalid IPv4 host in '{url}'")))?;
            let is_multicast = (host.octets()[0] & 0xF0) == 0xE0;
            return Ok(TransportAddress::Udp {
                host,
                port,
                is_multicast,
            });
        }
        for (prefix, secure) in [("mqtts://", true), ("mqtt://", false)] {
            if let Some(rest) = url.strip_prefix(prefix) {
                let (host, port) = split_host_port(rest)
                    .ok_or_else(|| AddressParseError(format!("missing port in '{url}'")))?;
                return Ok(TransportAddress::Broker {
                    secure,
                    host: host.to_string(),
                    port,
                });
            }
        }
        Err(AddressParseError(format!("unrecognized scheme in '{url}'")))
    }
}

fn split_host_port(rest: &str) -> Option<(&str, u16)> {
    let (host, port) = rest.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multicast_udp() {
        let addr = TransportAddress::parse("opc.udp://232.1.2.100:4840").unwrap();
        assert_eq!(
            addr,
            TransportAddress::Udp {
                host: Ipv4Addr::new(232, 1, 2, 100),
                port: 4840,
                is_multicast: true,
            }
        );
    }

    #[test]
    fn parses_unicast_udp() {
        let addr = TransportAddress::parse("opc.udp://10.0.0.5:4840").unwrap();
        assert_eq!(
            addr,
            TransportAddress::Udp {
                host: Ipv4Addr::new(10, 0, 0, 5),
                port: 4840,
                is_multicast: false,
            }
        );
    }

    #[test]
    fn parses_broker() {
        let addr = TransportAddress::parse("mqtts://broker.example:8883").unwrap();
        assert_eq!(
            addr,
            TransportAddress::Broker {
                secure: true,
                host: "broker.example".into(),
                port: 8883,
            }
        );
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(TransportAddress::parse("http://example.com").is_err());
    }
}
