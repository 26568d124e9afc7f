// SPDX-License-Identifier: Apache-2.0 OR MIT

//! UADP header flag-byte layout (spec.md §6), encoded/decoded with the
//! bounds-checked cursor of `uadp::cursor`.
//!
//! Byte 0 packs the UADP version (low 4 bits) with
//! PublisherIdEnabled/GroupHeaderEnabled/PayloadHeaderEnabled/
//! ExtendedFlags1Enabled (high 4 bits), matching OPC UA Part 14's
//! version-and-flags byte spec.md §6 describes together. Byte 1
//! (ExtendedFlags1, present only if its enable bit is set) packs
//! PublisherIdType/DataSetClassIdEnabled/SecurityEnabled/TimestampEnabled/
//! PicoSecondsEnabled/ExtendedFlags2Enabled; its top bit is a
//! PublisherIdIsString extension this codec needs since the literal
//! 2-bit PublisherIdType field spec.md names has no slot for the String
//! form spec.md §3/§4.2 also allows (documented in DESIGN.md).

use crate::config::PublisherId;
use crate::uadp::content_mask::UadpNetworkMessageContentMask;
use crate::uadp::cursor::{Cursor, CursorMut};
use crate::uadp::message::NetworkMessageHeader;
use crate::uadp::{SerError, SerResult, UADP_VERSION};

const FLAG1_PUBLISHER_ID: u8 = 1 << 4;
const FLAG1_GROUP_HEADER: u8 = 1 << 5;
const FLAG1_PAYLOAD_HEADER: u8 = 1 << 6;
const FLAG1_EXTENDED: u8 = 1 << 7;

const FLAG2_PUBLISHER_TYPE_MASK: u8 = 0b0000_0011;
const FLAG2_DATA_SET_CLASS_ID: u8 = 1 << 2;
const FLAG2_SECURITY: u8 = 1 << 3;
const FLAG2_TIMESTAMP: u8 = 1 << 4;
const FLAG2_PICO_SECONDS: u8 = 1 << 5;
const FLAG2_PUBLISHER_ID_STRING: u8 = 1 << 7;

const GROUP_FLAG_GROUP_ID: u8 = 1 << 0;
const GROUP_FLAG_GROUP_VERSION: u8 = 1 << 1;
const GROUP_FLAG_NETWORK_MESSAGE_NUMBER: u8 = 1 << 2;
const GROUP_FLAG_SEQUENCE_NUMBER: u8 = 1 << 3;

/// Header plus the WriterIds read from the payload header: the codec
/// needs the latter to know how many DataSetMessages follow and how to
/// match them to readers.
pub struct DecodedHeader {
    pub header: NetworkMessageHeader,
    pub writer_ids: Vec<u16>,
}

pub fn encode_header(
    cursor: &mut CursorMut,
    header: &NetworkMessageHeader,
    writer_ids: &[u16],
) -> SerResult<()> {
    let mask = &header.content_mask;
    let needs_flags2 = mask.data_set_class_id
        || mask.security
        || mask.timestamp
        || mask.pico_seconds
        || header.publisher_id.wire_width() != crate::config::publisher_id::PublisherIdWireWidth::Byte;

    let mut flags1 = UADP_VERSION & 0x0F;
    if mask.publisher_id {
        flags1 |= FLAG1_PUBLISHER_ID;
    }
    if mask.group_header {
        flags1 |= FLAG1_GROUP_HEADER;
    }
    if mask.payload_header {
        flags1 |= FLAG1_PAYLOAD_HEADER;
    }
    if needs_flags2 {
        flags1 |= FLAG1_EXTENDED;
    }
    cursor.write_u8(flags1)?;

    if needs_flags2 {
        use crate::config::publisher_id::PublisherIdWireWidth;
        let mut flags2 = match header.publisher_id.wire_width() {
            PublisherIdWireWidth::Byte => 0,
            PublisherIdWireWidth::U16 => 1,
            PublisherIdWireWidth::U32 => 2,
            PublisherIdWireWidth::U64 => 3,
            PublisherIdWireWidth::String => FLAG2_PUBLISHER_ID_STRING,
        };
        if mask.data_set_class_id {
            flags2 |= FLAG2_DATA_SET_CLASS_ID;
        }
        if mask.security {
            flags2 |= FLAG2_SECURITY;
        }
        if mask.timestamp {
            flags2 |= FLAG2_TIMESTAMP;
        }
        if mask.pico_seconds {
            flags2 |= FLAG2_PICO_SECONDS;
        }
        cursor.write_u8(flags2)?;
    }

    if mask.publisher_id {
        write_publisher_id(cursor, &header.publisher_id)?;
    }

    if mask.data_set_class_id {
        let id = header.data_set_class_id.unwrap_or([0u8; 16]);
        cursor.write_bytes(&id)?;
    }

    if mask.group_header {
        let mut group_flags = 0u8;
        if mask.group_id {
            group_flags |= GROUP_FLAG_GROUP_ID;
        }
        if mask.group_version {
            group_flags |= GROUP_FLAG_GROUP_VERSION;
        }
        if mask.network_message_number {
            group_flags |= GROUP_FLAG_NETWORK_MESSAGE_NUMBER;
        }
        if mask.sequence_number {
            group_flags |= GROUP_FLAG_SEQUENCE_NUMBER;
        }
        cursor.write_u8(group_flags)?;

        if mask.group_id {
            cursor.write_u16_le(header.group_id.unwrap_or(0))?;
        }
        if mask.group_version {
            cursor.write_u32_le(header.group_version.unwrap_or(0))?;
        }
        if mask.network_message_number {
            cursor.write_u16_le(header.network_message_number.unwrap_or(0))?;
        }
        if mask.sequence_number {
            cursor.write_u16_le(header.sequence_number.unwrap_or(0))?;
        }
    }

    if mask.payload_header {
        if writer_ids.len() > u8::MAX as usize {
            return Err(SerError::InvalidData {
                reason: "more than 255 DataSetMessages in one NetworkMessage".into(),
            });
        }
        cursor.write_u8(writer_ids.len() as u8)?;
        for writer_id in writer_ids {
            cursor.write_u16_le(*writer_id)?;
        }
    }

    Ok(())
}

pub fn decode_header(cursor: &mut Cursor) -> SerResult<DecodedHeader> {
    let flags1 = cursor.read_u8()?;
    let version = flags1 & 0x0F;
    if version != UADP_VERSION {
        return Err(SerError::InvalidData {
            reason: format!("unsupported UADP version {version}"),
        });
    }

    let mut mask = UadpNetworkMessageContentMask {
        publisher_id: flags1 & FLAG1_PUBLISHER_ID != 0,
        group_header: flags1 & FLAG1_GROUP_HEADER != 0,
        payload_header: flags1 & FLAG1_PAYLOAD_HEADER != 0,
        ..Default::default()
    };
    let extended = flags1 & FLAG1_EXTENDED != 0;

    let mut publisher_id_type = 0u8;
    let mut publisher_id_is_string = false;
    if extended {
        let flags2 = cursor.read_u8()?;
        publisher_id_type = flags2 & FLAG2_PUBLISHER_TYPE_MASK;
        publisher_id_is_string = flags2 & FLAG2_PUBLISHER_ID_STRING != 0;
        mask.data_set_class_id = flags2 & FLAG2_DATA_SET_CLASS_ID != 0;
        mask.security = flags2 & FLAG2_SECURITY != 0;
        mask.timestamp = flags2 & FLAG2_TIMESTAMP != 0;
        mask.pico_seconds = flags2 & FLAG2_PICO_SECONDS != 0;
    }

    let publisher_id = if mask.publisher_id {
        read_publisher_id(cursor, publisher_id_type, publisher_id_is_string)?
    } else {
        PublisherId::None
    };

    let data_set_class_id = if mask.data_set_class_id {
        let mut id = [0u8; 16];
        id.copy_from_slice(cursor.read_bytes(16)?);
        Some(id)
    } else {
        None
    };

    let mut group_id = None;
    let mut group_version = None;
    let mut network_message_number = None;
    let mut sequence_number = None;
    if mask.group_header {
        let group_flags = cursor.read_u8()?;
        mask.group_id = group_flags & GROUP_FLAG_GROUP_ID != 0;
        mask.group_version = group_flags & GROUP_FLAG_GROUP_VERSION != 0;
        mask.network_message_number = group_flags & GROUP_FLAG_NETWORK_MESSAGE_NUMBER != 0;
        mask.sequence_number = group_flags & GROUP_FLAG_SEQUENCE_NUMBER != 0;

        if mask.group_id {
            group_id = Some(cursor.read_u16_le()?);
        }
        if mask.group_version {
            group_version = Some(cursor.read_u32_le()?);
        }
        if mask.network_message_number {
            network_message_number = Some(cursor.read_u16_le()?);
        }
        if mask.sequence_number {
            sequence_number = Some(cursor.read_u16_le()?);
        }
    }

    let mut writer_ids = Vec::new();
    if mask.payload_header {
        let count = cursor.read_u8()? as usize;
        writer_ids.reserve(count);
        for _ in 0..count {
            writer_ids.push(cursor.read_u16_le()?);
        }
    }

    Ok(DecodedHeader {
        header: NetworkMessageHeader {
            content_mask: mask,
            publisher_id,
            data_set_class_id,
            group_id,
            group_version,
            network_message_number,
            sequence_number,
            timestamp: None,
            pico_seconds: None,
            security: None,
        },
        writer_ids,
    })
}

fn write_publisher_id(cursor: &mut CursorMut, id: &PublisherId) -> SerResult<()> {
    match id {
        PublisherId::None => cursor.write_u8(0),
        PublisherId::UInt(v) => {
            use crate::config::publisher_id::PublisherIdWireWidth;
            match PublisherId::UInt(*v).wire_width() {
                PublisherIdWireWidth::Byte => cursor.write_u8(*v as u8),
                PublisherIdWireWidth::U16 => cursor.write_u16_le(*v as u16),
                PublisherIdWireWidth::U32 => cursor.write_u32_le(*v as u32),
                _ => cursor.write_u64_le(*v),
            }
        }
        PublisherId::String(s) => cursor.write_string(s),
    }
}

fn read_publisher_id(cursor: &mut Cursor, type_bits: u8, is_string: bool) -> SerResult<PublisherId> {
    if is_string {
        return Ok(PublisherId::String(cursor.read_string()?));
    }
    let value = match type_bits {
        0 => cursor.read_u8()? as u64,
        1 => cursor.read_u16_le()? as u64,
        2 => cursor.read_u32_le()? as u64,
        _ => cursor.read_u64_le()?,
    };
    Ok(if value == 0 { PublisherId::None } else { PublisherId::UInt(value) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_minimal_header() {
        let mut header =
            NetworkMessageHeader::new(UadpNetworkMessageContentMask::minimal(), PublisherId::UInt(7));
        header.group_id = Some(14);
        header.group_version = Some(1);
        header.sequence_number = Some(42);

        let mut buffer = [0u8; 64];
        let mut writer = CursorMut::new(&mut buffer);
        encode_header(&mut writer, &header, &[1, 2]).unwrap();
        let written = writer.offset();

        let mut reader = Cursor::new(&buffer[..written]);
        let decoded = decode_header(&mut reader).unwrap();
        assert_eq!(decoded.header.publisher_id, PublisherId::UInt(7));
        assert_eq!(decoded.header.group_id, Some(14));
        assert_eq!(decoded.header.sequence_number, Some(42));
        assert_eq!(decoded.writer_ids, vec![1, 2]);
    }

    #[test]
    fn string_publisher_id_roundtrips() {
        let header = NetworkMessageHeader::new(
            UadpNetworkMessageContentMask {
                publisher_id: true,
                ..Default::default()
            },
            PublisherId::String("seg-a".into()),
        );
        let mut buffer = [0u8; 64];
        let mut writer = CursorMut::new(&mut buffer);
        encode_header(&mut writer, &header, &[]).unwrap();
        let written = writer.offset();

        let mut reader = Cursor::new(&buffer[..written]);
        let decoded = decode_header(&mut reader).unwrap();
        assert_eq!(decoded.header.publisher_id, PublisherId::String("seg-a".into()));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let buffer = [0xF0u8];
        let mut reader = Cursor::new(&buffer);
        assert!(decode_header(&mut reader).is_err());
    }
}
