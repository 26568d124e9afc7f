// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `PubSubConnection` (spec.md §3): owns writer groups XOR reader groups,
//! never both.

use crate::config::publisher_id::PublisherId;
use crate::config::reader_group::ReaderGroup;
use crate::config::writer_group::WriterGroup;
use crate::transport::address::TransportAddress;

/// Role of a `PubSubConnection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Publisher,
    Subscriber,
}

/// Optional MQTT broker credentials (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerCredentials {
    pub username: String,
    pub password: String,
}

/// The groups owned by a connection, exclusive to its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionGroups {
    Writer(Vec<WriterGroup>),
    Reader(Vec<ReaderGroup>),
}

impl ConnectionGroups {
    pub fn role(&self) -> ConnectionRole {
        match self {
            ConnectionGroups::Writer(_) => ConnectionRole::Publisher,
            ConnectionGroups::Reader(_) => ConnectionRole::Subscriber,
        }
    }

    pub fn writer_groups(&self) -> &[WriterGroup] {
        match self {
            ConnectionGroups::Writer(groups) => groups,
            ConnectionGroups::Reader(_) => &[],
        }
    }

    pub fn reader_groups(&self) -> &[ReaderGroup] {
        match self {
            ConnectionGroups::Reader(groups) => groups,
            ConnectionGroups::Writer(_) => &[],
        }
    }
}

/// A publisher- or subscriber-role connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubConnection {
    pub address: TransportAddress,
    pub network_interface: Option<String>,
    pub broker_credentials: Option<BrokerCredentials>,
    pub acyclic: bool,
    pub publisher_id: Option<PublisherId>,
    pub enabled: bool,
    pub groups: ConnectionGroups,
}

impl PubSubConnection {
    pub fn role(&self) -> ConnectionRole {
        self.groups.role()
    }

    /// Validate the role/PublisherId invariant of spec.md §3: mandatory on
    /// Publisher, forbidden on Subscriber.
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        use crate::error::Error;

        match (self.role(), &self.publisher_id) {
            (ConnectionRole::Publisher, None) => Err(Error::Configuration(
                "Publisher connection requires a PublisherId".into(),
            )),
            (ConnectionRole::Publisher, Some(id)) if !id.is_valid() => Err(Error::Configuration(
                "Publisher connection has an invalid PublisherId".into(),
            )),
            (ConnectionRole::Subscriber, Some(_)) => Err(Error::Configuration(
                "Subscriber connection must not declare a PublisherId".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_connection(groups: ConnectionGroups, publisher_id: Option<PublisherId>) -> PubSubConnection {
        PubSubConnection {
            address: TransportAddress::parse("opc.udp://232.1.2.100:4840").unwrap(),
            network_interface: None,
            broker_credentials: None,
            acyclic: false,
            publisher_id,
            enabled: true,
            groups,
        }
    }

    #[test]
    fn publisher_without_id_is_invalid() {
        let conn = base_connection(ConnectionGroups::Writer(Vec::new()), None);
        assert!(conn.validate().is_err());
    }

    #[test]
    fn subscriber_with_id_is_invalid() {
        let conn = base_connection(
            ConnectionGroups::Reader(Vec::new()),
            PublisherId::uint(1),
        );
        assert!(conn.validate().is_err());
    }

    #[test]
    fn publisher_with_id_is_valid() {
        let conn = base_connection(ConnectionGroups::Writer(Vec::new()), PublisherId::uint(123));
        assert!(conn.validate().is_ok());
    }
}
