// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `NetworkMessage`/`DataSetMessage`/`DataSetField` (spec.md §3, §4.2): the
//! in-memory model the codec encodes to and decodes from.

use crate::config::PublisherId;
use crate::types::{StatusCode, Variant};
use crate::uadp::content_mask::{DataSetMessageContentMask, UadpNetworkMessageContentMask};

/// Security footer carried on the wire when a group's security mode
/// requires it (spec.md §4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityFooter {
    pub token_id: u32,
    pub nonce: Vec<u8>,
    pub signature: Vec<u8>,
}

/// UADP header: version, flags, and the optional fields they enable.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMessageHeader {
    pub content_mask: UadpNetworkMessageContentMask,
    pub publisher_id: PublisherId,
    pub data_set_class_id: Option<[u8; 16]>,
    pub group_id: Option<u16>,
    pub group_version: Option<u32>,
    pub network_message_number: Option<u16>,
    pub sequence_number: Option<u16>,
    pub timestamp: Option<i64>,
    pub pico_seconds: Option<u16>,
    pub security: Option<SecurityFooter>,
}

impl NetworkMessageHeader {
    pub fn new(content_mask: UadpNetworkMessageContentMask, publisher_id: PublisherId) -> Self {
        NetworkMessageHeader {
            content_mask,
            publisher_id,
            data_set_class_id: None,
            group_id: None,
            group_version: None,
            network_message_number: None,
            sequence_number: None,
            timestamp: None,
            pico_seconds: None,
            security: None,
        }
    }
}

/// One field slot within a `DataSetMessage`: a value plus its status
/// (spec.md §3). `None` marks a slot pre-allocated but not yet populated
/// by `nm_set_variant_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSetField {
    pub value: Variant,
    pub status: StatusCode,
}

/// One DataSetMessage within a `NetworkMessage`, addressed by `writer_id`
/// in the payload header.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSetMessage {
    pub writer_id: u16,
    pub content_mask: DataSetMessageContentMask,
    /// Pre-allocated field slots (spec.md §4.2 "pre-allocates field
    /// storage of the length declared by the dataset's metadata").
    /// Empty for KeepAlive messages.
    pub fields: Vec<Option<DataSetField>>,
    pub sequence_number: Option<u16>,
    pub config_version: Option<u32>,
    pub timestamp: Option<i64>,
    pub pico_seconds: Option<u16>,
}

impl DataSetMessage {
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// A complete UADP network message: one header plus an ordered sequence
/// of DataSetMessages.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMessage {
    pub header: NetworkMessageHeader,
    pub dsms: Vec<DataSetMessage>,
}
