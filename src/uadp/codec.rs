// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `network_message_from_writer_group`, `nm_set_variant_at`, `nm_encode`
//! and `nm_decode` (spec.md §4.2).

use crate::config::published_dataset::{DataSetSourceType, FieldDirection};
use crate::config::{PubSubConfiguration, PublisherId, SecurityKeyManager, WriterGroup};
use crate::error::Error;
use crate::types::{BuiltInType, StatusCode, Variant};
use crate::uadp::content_mask::{DataSetMessageType, FieldEncoding};
use crate::uadp::cursor::{Cursor, CursorMut};
use crate::uadp::header::{decode_header, encode_header};
use crate::uadp::message::{
    DataSetField, DataSetMessage, NetworkMessage, NetworkMessageHeader, SecurityFooter,
};
use crate::uadp::security_provider::SecurityProvider;

const DSM_FIELD_ENCODING_MASK: u8 = 0b0000_0011;
const DSM_SEQUENCE_NUMBER: u8 = 1 << 2;
const DSM_STATUS: u8 = 1 << 3;
const DSM_CONFIG_VERSION: u8 = 1 << 4;
const DSM_TIMESTAMP: u8 = 1 << 5;
const DSM_PICO_SECONDS: u8 = 1 << 6;
const VARIANT_ARRAY_FLAG: u8 = 0x80;

/// Build a `NetworkMessage` skeleton from a `WriterGroup` and the
/// publisher id of its parent connection (spec.md §4.2).
pub fn network_message_from_writer_group(
    config: &PubSubConfiguration,
    group: &WriterGroup,
    publisher_id: PublisherId,
    keep_alive: bool,
) -> Result<NetworkMessage, Error> {
    let mut header = NetworkMessageHeader::new(group.content_mask, publisher_id);
    header.group_id = Some(group.group_id);
    header.group_version = Some(group.group_version);

    let mut dsms = Vec::with_capacity(group.writers().len());
    for writer in group.writers() {
        let message_type = if keep_alive {
            DataSetMessageType::KeepAlive
        } else {
            let data_set = config.data_set(writer.data_set).ok_or_else(|| {
                Error::Configuration(format!(
                    "DataSetWriter {} references unknown PublishedDataSet",
                    writer.writer_id
                ))
            })?;
            match data_set.source_type {
                DataSetSourceType::DataItems => DataSetMessageType::KeyFrame,
                DataSetSourceType::CustomSource | DataSetSourceType::Events => {
                    DataSetMessageType::Event
                }
            }
        };

        let field_count = if keep_alive {
            0
        } else {
            config
                .data_set(writer.data_set)
                .map(|d| d.field_count())
                .unwrap_or(0)
        };

        let mut content_mask = crate::uadp::content_mask::DataSetMessageContentMask::default();
        content_mask.message_type = message_type;
        content_mask.sequence_number = writer.options.emit_sequence_number;
        content_mask.timestamp = writer.options.emit_timestamp;

        dsms.push(DataSetMessage {
            writer_id: writer.writer_id,
            content_mask,
            fields: vec![None; field_count],
            sequence_number: None,
            config_version: None,
            timestamp: None,
            pico_seconds: None,
        });
    }

    Ok(NetworkMessage { header, dsms })
}

/// Install a value at a specific field position (spec.md §4.2).
pub fn nm_set_variant_at(
    nm: &mut NetworkMessage,
    dsm_index: usize,
    field_index: usize,
    value: Variant,
    status: StatusCode,
) -> Result<(), Error> {
    let dsm = nm
        .dsms
        .get_mut(dsm_index)
        .ok_or_else(|| Error::Allocation(format!("no DataSetMessage at index {dsm_index}")))?;
    let slot = dsm.fields.get_mut(field_index).ok_or_else(|| {
        Error::Allocation(format!("no field slot {field_index} in DataSetMessage {dsm_index}"))
    })?;
    *slot = Some(DataSetField { value, status });
    Ok(())
}

/// Encode a `NetworkMessage`. `security` (key manager + crypto provider)
/// is required only when the header carries a security footer.
pub fn nm_encode(
    nm: &NetworkMessage,
    security: Option<(&SecurityKeyManager, &dyn SecurityProvider)>,
) -> Result<Vec<u8>, Error> {
    let writer_ids: Vec<u16> = nm.dsms.iter().map(|dsm| dsm.writer_id).collect();

    let mut buffer = vec![0u8; 8192];
    let written = {
        let mut cursor = CursorMut::new(&mut buffer);
        encode_header(&mut cursor, &nm.header, &writer_ids)?;
        for dsm in &nm.dsms {
            encode_dsm(&mut cursor, dsm)?;
        }
        cursor.offset()
    };
    buffer.truncate(written);

    if nm.header.content_mask.security {
        let (key_manager, provider) = security.ok_or_else(|| {
            Error::Security("group requires security but no key manager/provider was supplied".into())
        })?;
        let snapshot = key_manager.snapshot();
        let key = snapshot
            .keys
            .iter()
            .find(|k| k.token_id == snapshot.current_token_id)
            .ok_or_else(|| Error::Security("no usable key in the Security Key Manager".into()))?;
        let signature = provider.sign(key, &buffer);
        let footer = SecurityFooter {
            token_id: key.token_id,
            nonce: Vec::new(),
            signature,
        };
        append_security_footer(&mut buffer, &footer)?;
    }

    Ok(buffer)
}

fn append_security_footer(buffer: &mut Vec<u8>, footer: &SecurityFooter) -> Result<(), Error> {
    let mut tail = vec![0u8; 6 + footer.nonce.len() + footer.signature.len()];
    {
        let mut cursor = CursorMut::new(&mut tail);
        cursor.write_u32_le(footer.token_id)?;
        cursor.write_u8(footer.nonce.len() as u8)?;
        cursor.write_bytes(&footer.nonce)?;
        cursor.write_u8(footer.signature.len() as u8)?;
        cursor.write_bytes(&footer.signature)?;
    }
    buffer.extend_from_slice(&tail);
    Ok(())
}

fn encode_dsm(cursor: &mut CursorMut, dsm: &DataSetMessage) -> Result<(), Error> {
    let mask = &dsm.content_mask;
    let encoding_bits = match mask.field_encoding {
        FieldEncoding::Variant => 0,
        FieldEncoding::RawData => 1,
        FieldEncoding::DataValue => 2,
    };
    let mut flags = encoding_bits;
    if mask.sequence_number {
        flags |= DSM_SEQUENCE_NUMBER;
    }
    if mask.status {
        flags |= DSM_STATUS;
    }
    if mask.config_version {
        flags |= DSM_CONFIG_VERSION;
    }
    if mask.timestamp {
        flags |= DSM_TIMESTAMP;
    }
    if mask.pico_seconds {
        flags |= DSM_PICO_SECONDS;
    }
    cursor.write_u8(flags).map_err(Error::from)?;

    let message_type_bits = match mask.message_type {
        DataSetMessageType::KeyFrame => 0u8,
        DataSetMessageType::DeltaFrame => 1,
        DataSetMessageType::Event => 2,
        DataSetMessageType::KeepAlive => 3,
    };
    cursor.write_u8(message_type_bits & 0x0F).map_err(Error::from)?;

    if mask.sequence_number {
        cursor
            .write_u16_le(dsm.sequence_number.unwrap_or(0))
            .map_err(Error::from)?;
    }
    if mask.config_version {
        cursor
            .write_u32_le(dsm.config_version.unwrap_or(0))
            .map_err(Error::from)?;
    }

    if !matches!(mask.message_type, DataSetMessageType::KeepAlive) {
        for slot in &dsm.fields {
            let field = slot.as_ref().ok_or_else(|| {
                Error::Application("NetworkMessage has an unpopulated field slot".into())
            })?;
            encode_field(cursor, mask.field_encoding, field)?;
        }
    }

    if mask.timestamp {
        cursor
            .write_i64_le(dsm.timestamp.unwrap_or(0))
            .map_err(Error::from)?;
    }
    if mask.pico_seconds {
        cursor
            .write_u16_le(dsm.pico_seconds.unwrap_or(0))
            .map_err(Error::from)?;
    }

    Ok(())
}

fn encode_field(
    cursor: &mut CursorMut,
    encoding: FieldEncoding,
    field: &DataSetField,
) -> Result<(), Error> {
    match encoding {
        FieldEncoding::Variant => encode_variant_tagged(cursor, &field.value).map_err(Error::from),
        FieldEncoding::RawData => encode_variant_raw(cursor, &field.value).map_err(Error::from),
        FieldEncoding::DataValue => {
            encode_variant_tagged(cursor, &field.value).map_err(Error::from)?;
            cursor.write_u32_le(field.status.0).map_err(Error::from)
        }
    }
}

fn encode_variant_tagged(cursor: &mut CursorMut, value: &Variant) -> crate::uadp::SerResult<()> {
    match value {
        Variant::Array(ty, items) => {
            cursor.write_u8(*ty as u8 | VARIANT_ARRAY_FLAG)?;
            cursor.write_u32_le(items.len() as u32)?;
            for item in items {
                encode_variant_raw(cursor, item)?;
            }
            Ok(())
        }
        other => {
            cursor.write_u8(other.builtin_type() as u8)?;
            encode_variant_raw(cursor, other)
        }
    }
}

fn encode_variant_raw(cursor: &mut CursorMut, value: &Variant) -> crate::uadp::SerResult<()> {
    match value {
        Variant::Boolean(v) => cursor.write_u8(if *v { 1 } else { 0 }),
        Variant::SByte(v) => cursor.write_i8(*v),
        Variant::Byte(v) => cursor.write_u8(*v),
        Variant::Int16(v) => cursor.write_i16_le(*v),
        Variant::UInt16(v) => cursor.write_u16_le(*v),
        Variant::Int32(v) => cursor.write_i32_le(*v),
        Variant::UInt32(v) => cursor.write_u32_le(*v),
        Variant::Int64(v) => cursor.write_i64_le(*v),
        Variant::UInt64(v) => cursor.write_u64_le(*v),
        Variant::Float(v) => cursor.write_f32_le(*v),
        Variant::Double(v) => cursor.write_f64_le(*v),
        Variant::String(v) => cursor.write_string(v),
        Variant::DateTime(v) => cursor.write_i64_le(*v),
        Variant::ByteString(v) => cursor.write_byte_string(v),
        Variant::Array(ty, items) => {
            cursor.write_u32_le(items.len() as u32)?;
            for item in items {
                encode_variant_raw(cursor, item)?;
            }
            let _ = ty;
            Ok(())
        }
    }
}

fn decode_variant_raw(cursor: &mut Cursor, ty: BuiltInType) -> crate::uadp::SerResult<Variant> {
    Ok(match ty {
        BuiltInType::Boolean => Variant::Boolean(cursor.read_u8()? != 0),
        BuiltInType::SByte => Variant::SByte(cursor.read_i8()?),
        BuiltInType::Byte => Variant::Byte(cursor.read_u8()?),
        BuiltInType::Int16 => Variant::Int16(cursor.read_i16_le()?),
        BuiltInType::UInt16 => Variant::UInt16(cursor.read_u16_le()?),
        BuiltInType::Int32 => Variant::Int32(cursor.read_i32_le()?),
        BuiltInType::UInt32 => Variant::UInt32(cursor.read_u32_le()?),
        BuiltInType::Int64 => Variant::Int64(cursor.read_i64_le()?),
        BuiltInType::UInt64 => Variant::UInt64(cursor.read_u64_le()?),
        BuiltInType::Float => Variant::Float(cursor.read_f32_le()?),
        BuiltInType::Double => Variant::Double(cursor.read_f64_le()?),
        BuiltInType::String => Variant::String(cursor.read_string()?),
        BuiltInType::DateTime => Variant::DateTime(cursor.read_i64_le()?),
        BuiltInType::ByteString => Variant::ByteString(cursor.read_byte_string()?),
        other => {
            return Err(crate::uadp::SerError::InvalidData {
                reason: format!("{other:?} has no raw field encoding"),
            })
        }
    })
}

fn decode_variant_tagged(cursor: &mut Cursor) -> crate::uadp::SerResult<Variant> {
    let tag = cursor.read_u8()?;
    let is_array = tag & VARIANT_ARRAY_FLAG != 0;
    let ty = BuiltInType::from_id(tag & !VARIANT_ARRAY_FLAG).ok_or_else(|| {
        crate::uadp::SerError::InvalidData {
            reason: format!("unknown BuiltInType id {}", tag & !VARIANT_ARRAY_FLAG),
        }
    })?;
    if is_array {
        let count = cursor.read_u32_le()? as usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(decode_variant_raw(cursor, ty)?);
        }
        Ok(Variant::Array(ty, items))
    } else {
        decode_variant_raw(cursor, ty)
    }
}

/// One DataSetReader matched against an incoming DataSetMessage during
/// decode (spec.md §4.2/§4.4 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedReader {
    pub connection_index: usize,
    pub group_index: usize,
    pub reader_index: usize,
    pub dsm_index: usize,
}

/// Decode a `NetworkMessage` from the wire, matching each DataSetMessage
/// against the subscriber-role connections of `config` (spec.md §4.2,
/// §4.4 step 3: publisher-id match, group id, writer id with 0 as
/// wildcard, group version).
pub fn nm_decode(
    bytes: &[u8],
    config: &PubSubConfiguration,
    security: Option<(&SecurityKeyManager, &dyn SecurityProvider)>,
) -> Result<(NetworkMessage, Vec<MatchedReader>), Error> {
    let mut cursor = Cursor::new(bytes);
    let decoded = decode_header(&mut cursor).map_err(Error::from)?;

    let candidate_groups: Vec<(usize, usize)> = config
        .subscriber_connections()
        .iter()
        .enumerate()
        .flat_map(|(conn_idx, conn)| {
            conn.groups
                .reader_groups()
                .iter()
                .enumerate()
                .filter(move |(_, group)| {
                    group.group_id == decoded.header.group_id.unwrap_or(group.group_id)
                        && group.group_version == decoded.header.group_version.unwrap_or(group.group_version)
                        && publisher_id_matches(&group.expected_publisher_id, &decoded.header.publisher_id)
                })
                .map(move |(group_idx, _)| (conn_idx, group_idx))
        })
        .collect();

    let mut dsms = Vec::with_capacity(decoded.writer_ids.len());
    let mut matched_readers = Vec::new();

    for (dsm_index, writer_id) in decoded.writer_ids.iter().enumerate() {
        let matched = candidate_groups.iter().find_map(|&(conn_idx, group_idx)| {
            let group = &config.subscriber_connections()[conn_idx].groups.reader_groups()[group_idx];
            group
                .readers()
                .iter()
                .position(|reader| reader.data_set_writer_id == 0 || reader.data_set_writer_id == *writer_id)
                .map(|reader_idx| (conn_idx, group_idx, reader_idx))
        });

        let field_metadata = matched.map(|(conn_idx, group_idx, reader_idx)| {
            config.subscriber_connections()[conn_idx].groups.reader_groups()[group_idx].readers()
                [reader_idx]
                .fields()
        });

        let dsm = decode_dsm(&mut cursor, *writer_id, field_metadata)?;
        dsms.push(dsm);

        if let Some((conn_idx, group_idx, reader_idx)) = matched {
            matched_readers.push(MatchedReader {
                connection_index: conn_idx,
                group_index: group_idx,
                reader_index: reader_idx,
                dsm_index,
            });
        }
    }

    let mut header = decoded.header;
    if header.content_mask.security {
        let remaining = cursor.remaining();
        let footer_offset = bytes.len() - remaining;
        let footer_bytes = cursor.read_bytes(remaining).map_err(Error::from)?;
        let footer = parse_security_footer(footer_bytes)?;
        if let Some((key_manager, provider)) = security {
            let key = key_manager.key_for_token(footer.token_id).ok_or_else(|| {
                Error::Security(format!("unknown security token id {}", footer.token_id))
            })?;
            let body = &bytes[..footer_offset];
            if !provider.verify(&key, body, &footer.signature) {
                return Err(Error::Security("signature verification failed".into()));
            }
        }
        header.security = Some(footer);
    }

    Ok((NetworkMessage { header, dsms }, matched_readers))
}

/// Whether a group's expected PublisherId accepts a received one
/// (`PublisherId::None` matches anything). Shared with the subscriber
/// scheduler, which needs the same test to pick a reader group's security
/// key manager before the group match `nm_decode` performs internally is
/// available.
pub(crate) fn publisher_id_matches(expected: &PublisherId, received: &PublisherId) -> bool {
    match expected {
        PublisherId::None => true,
        other => other == received,
    }
}

fn parse_security_footer(bytes: &[u8]) -> Result<SecurityFooter, Error> {
    let mut cursor = Cursor::new(bytes);
    let token_id = cursor.read_u32_le().map_err(Error::from)?;
    let nonce_len = cursor.read_u8().map_err(Error::from)? as usize;
    let nonce = cursor.read_bytes(nonce_len).map_err(Error::from)?.to_vec();
    let signature_len = cursor.read_u8().map_err(Error::from)? as usize;
    let signature = cursor.read_bytes(signature_len).map_err(Error::from)?.to_vec();
    Ok(SecurityFooter { token_id, nonce, signature })
}

fn decode_dsm(
    cursor: &mut Cursor,
    writer_id: u16,
    field_metadata: Option<&[crate::config::published_dataset::FieldMetaData]>,
) -> Result<DataSetMessage, Error> {
    let flags = cursor.read_u8().map_err(Error::from)?;
    let encoding = match flags & DSM_FIELD_ENCODING_MASK {
        0 => FieldEncoding::Variant,
        1 => FieldEncoding::RawData,
        _ => FieldEncoding::DataValue,
    };
    let mut mask = crate::uadp::content_mask::DataSetMessageContentMask {
        field_encoding: encoding,
        sequence_number: flags & DSM_SEQUENCE_NUMBER != 0,
        status: flags & DSM_STATUS != 0,
        config_version: flags & DSM_CONFIG_VERSION != 0,
        timestamp: flags & DSM_TIMESTAMP != 0,
        pico_seconds: flags & DSM_PICO_SECONDS != 0,
        message_type: DataSetMessageType::KeyFrame,
    };

    let type_bits = cursor.read_u8().map_err(Error::from)?;
    mask.message_type = match type_bits & 0x0F {
        0 => DataSetMessageType::KeyFrame,
        1 => DataSetMessageType::DeltaFrame,
        2 => DataSetMessageType::Event,
        _ => DataSetMessageType::KeepAlive,
    };

    let sequence_number = if mask.sequence_number {
        Some(cursor.read_u16_le().map_err(Error::from)?)
    } else {
        None
    };
    let config_version = if mask.config_version {
        Some(cursor.read_u32_le().map_err(Error::from)?)
    } else {
        None
    };

    let mut fields = Vec::new();
    if !matches!(mask.message_type, DataSetMessageType::KeepAlive) {
        // No matched DataSetReader means no known field count and, for
        // RawData, no known field type — guessing either desyncs the
        // cursor for every DataSetMessage that follows, so the whole
        // NetworkMessage is aborted instead (spec.md §4.2/§4.4 step 3).
        let expected = field_metadata.ok_or_else(|| {
            Error::Decode(format!(
                "no matching DataSetReader for WriterId {writer_id}; cannot decode its fields"
            ))
        })?;

        for metadata in expected {
            let value = match encoding {
                FieldEncoding::Variant | FieldEncoding::DataValue => {
                    decode_variant_tagged(cursor).map_err(Error::from)?
                }
                FieldEncoding::RawData => {
                    decode_variant_raw(cursor, metadata.built_in_type).map_err(Error::from)?
                }
            };
            let status = if matches!(encoding, FieldEncoding::DataValue) {
                StatusCode(cursor.read_u32_le().map_err(Error::from)?)
            } else {
                StatusCode::GOOD
            };

            if matches!(encoding, FieldEncoding::Variant | FieldEncoding::DataValue)
                && metadata.built_in_type != value.builtin_type()
            {
                fields.push(Some(DataSetField {
                    value,
                    status: StatusCode::BAD_TYPE_MISMATCH,
                }));
                continue;
            }

            fields.push(Some(DataSetField { value, status }));
        }
    }

    let timestamp = if mask.timestamp {
        Some(cursor.read_i64_le().map_err(Error::from)?)
    } else {
        None
    };
    let pico_seconds = if mask.pico_seconds {
        Some(cursor.read_u16_le().map_err(Error::from)?)
    } else {
        None
    };

    Ok(DataSetMessage {
        writer_id,
        content_mask: mask,
        fields,
        sequence_number,
        config_version,
        timestamp,
        pico_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dataset_reader::{DataSetReaderBuilder, ReceptionType};
    use crate::config::dataset_writer::{DataSetIndex, DataSetWriter};
    use crate::config::published_dataset::{FieldMetaData, PublishedDataSetBuilder};
    use crate::config::reader_group::ReaderGroupBuilder;
    use crate::config::writer_group::WriterGroupBuilder;
    use crate::config::{
        dataset_reader::FieldTarget, ConnectionGroups, PubSubConfigurationBuilder, PubSubConnection,
    };
    use crate::transport::address::TransportAddress;
    use crate::types::{NodeId, ValueRank};
    use crate::uadp::content_mask::UadpNetworkMessageContentMask;
    use std::time::Duration;

    fn boolean_dataset() -> crate::config::PublishedDataSet {
        let mut builder = PublishedDataSetBuilder::new(DataSetSourceType::DataItems, 1);
        builder.set_field(
            0,
            FieldMetaData::published(BuiltInType::Boolean, ValueRank::Scalar, NodeId::new("ns=1;s=A")),
        );
        builder.build().unwrap()
    }

    fn boolean_reader_metadata() -> FieldMetaData {
        FieldMetaData {
            built_in_type: BuiltInType::Boolean,
            value_rank: ValueRank::Scalar,
            array_dimensions: None,
            target: FieldDirection::Consumed(FieldTarget::new(NodeId::new("ns=1;s=A"))),
        }
    }

    fn config_with_one_reader() -> PubSubConfiguration {
        let mut cfg = PubSubConfigurationBuilder::new();
        cfg.add_data_set(boolean_dataset());

        let mut reader_builder = DataSetReaderBuilder::new(
            1,
            Duration::from_millis(100),
            ReceptionType::TargetVariables,
            1,
        );
        reader_builder.set_field(0, boolean_reader_metadata());
        let reader = reader_builder.build().unwrap();

        let mut group_builder = ReaderGroupBuilder::new(14, 1, PublisherId::UInt(7), 1);
        group_builder.set_reader(0, reader);
        let group = group_builder.build().unwrap();

        let connection = PubSubConnection {
            address: TransportAddress::parse("opc.udp://232.1.2.100:4840").unwrap(),
            network_interface: None,
            broker_credentials: None,
            acyclic: false,
            publisher_id: None,
            enabled: true,
            groups: ConnectionGroups::Reader(vec![group]),
        };
        cfg.add_subscriber_connection(connection).unwrap();
        cfg.build().unwrap()
    }

    #[test]
    fn roundtrip_boolean_field() {
        let config = config_with_one_reader();
        let mut group_builder = WriterGroupBuilder::new(14, 1, Duration::from_millis(50), 1);
        group_builder.set_writer(0, DataSetWriter::new(1, DataSetIndex(0)).unwrap());
        let group = group_builder
            .content_mask(UadpNetworkMessageContentMask::minimal())
            .build(false)
            .unwrap();

        let mut nm =
            network_message_from_writer_group(&config, &group, PublisherId::UInt(7), false).unwrap();
        nm_set_variant_at(&mut nm, 0, 0, Variant::Boolean(true), StatusCode::GOOD).unwrap();

        let bytes = nm_encode(&nm, None).unwrap();
        let (decoded, matched) = nm_decode(&bytes, &config, None).unwrap();

        assert_eq!(matched.len(), 1);
        assert_eq!(decoded.dsms[0].fields[0].as_ref().unwrap().value, Variant::Boolean(true));
    }

    #[test]
    fn wrong_version_bytes_are_rejected() {
        let config = config_with_one_reader();
        let bytes = [0xF0u8, 0, 0, 0];
        assert!(nm_decode(&bytes, &config, None).is_err());
    }

    #[test]
    fn unpopulated_field_fails_encode() {
        let config = config_with_one_reader();
        let mut group_builder = WriterGroupBuilder::new(14, 1, Duration::from_millis(50), 1);
        group_builder.set_writer(0, DataSetWriter::new(1, DataSetIndex(0)).unwrap());
        let group = group_builder.build(false).unwrap();

        let nm = network_message_from_writer_group(&config, &group, PublisherId::UInt(7), false).unwrap();
        assert!(nm_encode(&nm, None).is_err());
    }
}
