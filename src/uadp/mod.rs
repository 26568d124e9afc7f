// SPDX-License-Identifier: Apache-2.0 OR MIT

//! UADP network-message model and codec (spec.md §4.2, §6), grounded on
//! `hdds::core::ser::cursor` for the low-level byte manipulation and on
//! `examples/original_source/install_linux/include/s2opc/pubsub/sopc_pubsub_conf.h`
//! for the content-mask vocabulary.

pub mod codec;
pub mod content_mask;
pub mod cursor;
pub mod header;
pub mod message;
pub mod security_provider;

pub use codec::{network_message_from_writer_group, nm_decode, nm_encode, nm_set_variant_at, MatchedReader};
pub use content_mask::{
    DataSetMessageContentMask, DataSetMessageType, FieldEncoding, UadpNetworkMessageContentMask,
};
pub use message::{DataSetField, DataSetMessage, NetworkMessage, NetworkMessageHeader, SecurityFooter};
pub use security_provider::SecurityProvider;

use std::fmt;

/// Cursor-level error, distinct from [`crate::error::Error`] so the cursor
/// module stays free of the crate's higher-level error taxonomy (mirrors
/// `hdds::core::ser::SerError`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerError {
    WriteFailed { offset: usize, reason: String },
    ReadFailed { offset: usize, reason: String },
    InvalidData { reason: String },
}

impl fmt::Display for SerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerError::WriteFailed { offset, reason } => {
                write!(f, "write failed at offset {offset}: {reason}")
            }
            SerError::ReadFailed { offset, reason } => {
                write!(f, "read failed at offset {offset}: {reason}")
            }
            SerError::InvalidData { reason } => write!(f, "invalid data: {reason}"),
        }
    }
}

impl std::error::Error for SerError {}

impl From<SerError> for crate::error::Error {
    fn from(err: SerError) -> Self {
        crate::error::Error::Decode(err.to_string())
    }
}

pub type SerResult<T> = Result<T, SerError>;

/// UADP protocol version this codec encodes and expects on decode
/// (spec.md §6 "Version and flags per OPC UA Part 14").
pub const UADP_VERSION: u8 = 1;
