// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transport layer: UDP unicast/multicast socket creation (spec.md §6),
//! grounded on `hdds::dds::participant::builder::sockets`.

pub mod address;
pub mod udp;

pub use address::{AddressParseError, TransportAddress};
