// SPDX-License-Identifier: Apache-2.0 OR MIT

//! UADP content mask (spec.md §3/§6), carried as the explicit bit-set named
//! in `sopc_pubsub_conf.h`'s `SOPC_UadpNetworkMessageContentMask` rather
//! than collapsed into a narrative description — this is the wire
//! contract, not an implementation detail.

/// Per-group UADP network message content mask: which optional header
/// fields are present on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UadpNetworkMessageContentMask {
    pub publisher_id: bool,
    pub group_header: bool,
    pub group_id: bool,
    pub group_version: bool,
    pub network_message_number: bool,
    pub sequence_number: bool,
    pub payload_header: bool,
    pub timestamp: bool,
    pub pico_seconds: bool,
    pub data_set_class_id: bool,
    pub security: bool,
    pub promoted_fields: bool,
}

impl UadpNetworkMessageContentMask {
    /// Minimal mask used by S1-style round-trip tests: publisher id,
    /// group header with group id/version, payload header and sequence
    /// number, no timestamp/security.
    pub fn minimal() -> Self {
        UadpNetworkMessageContentMask {
            publisher_id: true,
            group_header: true,
            group_id: true,
            group_version: true,
            sequence_number: true,
            payload_header: true,
            ..Default::default()
        }
    }
}

/// Per-`DataSetMessage` field-encoding selection (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncoding {
    Variant,
    RawData,
    DataValue,
}

/// `DataSetMessage` type (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetMessageType {
    KeyFrame,
    DeltaFrame,
    Event,
    KeepAlive,
}

/// Per-`DataSetMessage` content mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSetMessageContentMask {
    pub field_encoding: FieldEncoding,
    pub sequence_number: bool,
    pub status: bool,
    pub config_version: bool,
    pub timestamp: bool,
    pub pico_seconds: bool,
    pub message_type: DataSetMessageType,
}

impl Default for DataSetMessageContentMask {
    fn default() -> Self {
        DataSetMessageContentMask {
            field_encoding: FieldEncoding::Variant,
            sequence_number: false,
            status: false,
            config_version: false,
            timestamp: false,
            pico_seconds: false,
            message_type: DataSetMessageType::KeyFrame,
        }
    }
}
