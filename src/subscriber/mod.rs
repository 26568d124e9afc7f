// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subscriber scheduler (spec.md §4.4): one dedicated receive worker per
//! subscriber connection, blocking on `recv_from` with
//! `transport::udp::RECV_POLL_INTERVAL` so `stop()` and the per-reader
//! receive-deadline timer are both observed promptly, grounded on the same
//! `SpdpAnnouncer`-style shutdown-flag thread as the publisher scheduler.

use crate::callbacks::{
    StateChangedCallback, SubSignatureCheckFailedCallback, SubscriberState, TargetVariableSink,
};
use crate::config::published_dataset::FieldDirection;
use crate::config::{PubSubConfiguration, PubSubConnection, ReaderGroup, SecurityKeyManager, SecurityMode};
use crate::error::Error;
use crate::transport::udp;
use crate::types::WriteValue;
use crate::uadp::codec::{nm_decode, publisher_id_matches};
use crate::uadp::cursor::Cursor;
use crate::uadp::header::decode_header;
use crate::uadp::security_provider::SecurityProvider;
use crate::uadp::NetworkMessageHeader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

/// Per-reader receive-deadline tracking and current state (spec.md §5
/// "the subscriber receive-deadline per reader is 2x publishing_interval
/// by default").
struct ReaderRuntime {
    last_received: Mutex<Instant>,
    state: Mutex<SubscriberState>,
}

impl ReaderRuntime {
    fn new() -> Self {
        ReaderRuntime {
            last_received: Mutex::new(Instant::now()),
            state: Mutex::new(SubscriberState::Disabled),
        }
    }
}

/// Handle returned by [`SubscriberScheduler::start`].
pub struct SubscriberScheduler {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl SubscriberScheduler {
    pub fn start(
        config: Arc<PubSubConfiguration>,
        sink: Arc<dyn TargetVariableSink>,
        security_key_managers: Vec<Arc<SecurityKeyManager>>,
        security_provider: Option<Arc<dyn SecurityProvider>>,
        state_changed: Option<StateChangedCallback>,
        sub_signature_check_failed: Option<SubSignatureCheckFailedCallback>,
    ) -> Result<Self, Error> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let state_changed = Arc::new(state_changed);
        let sub_signature_check_failed = Arc::new(sub_signature_check_failed);
        let mut handles = Vec::new();

        for (conn_idx, connection) in config.subscriber_connections().iter().enumerate() {
            if !connection.enabled || connection.groups.reader_groups().is_empty() {
                continue;
            }

            let socket = udp::open_subscriber_socket(
                &connection.address,
                connection.network_interface.as_deref(),
            )?;

            let reader_runtimes: Vec<Vec<Arc<ReaderRuntime>>> = connection
                .groups
                .reader_groups()
                .iter()
                .map(|g| (0..g.readers().len()).map(|_| Arc::new(ReaderRuntime::new())).collect())
                .collect();

            let config = Arc::clone(&config);
            let sink = Arc::clone(&sink);
            let security_key_managers = security_key_managers.clone();
            let security_provider = security_provider.clone();
            let state_changed = Arc::clone(&state_changed);
            let sub_signature_check_failed = Arc::clone(&sub_signature_check_failed);
            let shutdown = Arc::clone(&shutdown);

            let handle = thread::spawn(move || {
                connection_worker(
                    conn_idx,
                    config,
                    socket,
                    sink,
                    security_key_managers,
                    security_provider,
                    state_changed,
                    sub_signature_check_failed,
                    reader_runtimes,
                    shutdown,
                );
            });
            handles.push(handle);
        }

        Ok(SubscriberScheduler { shutdown, handles })
    }

    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for SubscriberScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn connection_worker(
    conn_idx: usize,
    config: Arc<PubSubConfiguration>,
    socket: std::net::UdpSocket,
    sink: Arc<dyn TargetVariableSink>,
    security_key_managers: Vec<Arc<SecurityKeyManager>>,
    security_provider: Option<Arc<dyn SecurityProvider>>,
    state_changed: Arc<Option<StateChangedCallback>>,
    sub_signature_check_failed: Arc<Option<SubSignatureCheckFailedCallback>>,
    reader_runtimes: Vec<Vec<Arc<ReaderRuntime>>>,
    shutdown: Arc<AtomicBool>,
) {
    if let Some(cb) = state_changed.as_ref() {
        cb(SubscriberState::Operational);
    }

    let mut buffer = [0u8; 8192];
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        check_receive_deadlines(&config, conn_idx, &reader_runtimes, state_changed.as_ref());

        let (len, _peer) = match socket.recv_from(&mut buffer) {
            Ok(pair) => pair,
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => {
                log::warn!("[subscriber] connection {conn_idx} recv failed: {err}");
                continue;
            }
        };

        let connection = &config.subscriber_connections()[conn_idx];
        let header = peek_header(&buffer[..len]);
        let key_manager = header
            .as_ref()
            .and_then(|header| matching_reader_groups(connection, header).next())
            .and_then(|group| group.security_key_services.first())
            .and_then(|&idx| security_key_managers.get(idx))
            .map(Arc::as_ref);
        let security = key_manager.zip(security_provider.as_deref());

        let (nm, matched) = match nm_decode(&buffer[..len], &config, security) {
            Ok(result) => result,
            Err(Error::Security(reason)) => {
                log::debug!(
                    "[subscriber] connection {conn_idx} dropped datagram: signature check failed: {reason}"
                );
                if let Some(header) = &header {
                    for group in matching_reader_groups(connection, header)
                        .filter(|g| g.security_mode != SecurityMode::None)
                    {
                        if let Some(cb) = sub_signature_check_failed.as_ref() {
                            cb(group, group.security_group_id.as_deref());
                        }
                    }
                }
                continue;
            }
            Err(err) => {
                log::debug!("[subscriber] connection {conn_idx} dropped datagram: {err}");
                continue;
            }
        };

        for matched_reader in &matched {
            if matched_reader.connection_index != conn_idx {
                continue;
            }
            let group = &config.subscriber_connections()[conn_idx]
                .groups
                .reader_groups()[matched_reader.group_index];
            let reader = &group.readers()[matched_reader.reader_index];
            let dsm = &nm.dsms[matched_reader.dsm_index];

            if group.security_mode != SecurityMode::None && nm.header.security.is_none()
            {
                if let Some(cb) = sub_signature_check_failed.as_ref() {
                    cb(group, group.security_group_id.as_deref());
                }
                continue;
            }

            let write_values: Vec<WriteValue> = dsm
                .fields
                .iter()
                .zip(reader.fields().iter())
                .filter_map(|(field, metadata)| {
                    let field = field.as_ref()?;
                    let FieldDirection::Consumed(target) = &metadata.target else {
                        return None;
                    };
                    Some(WriteValue {
                        node_id: target.node_id.clone(),
                        attribute_id: target.attribute_id,
                        value: crate::types::DataValue {
                            value: field.value.clone(),
                            status: field.status,
                            source_timestamp: dsm.timestamp,
                            server_timestamp: None,
                        },
                    })
                })
                .collect();

            if !write_values.is_empty() && !sink.set(write_values) {
                log::warn!(
                    "[subscriber] connection {conn_idx} target-variable sink rejected DataSetMessage for WriterId {}",
                    dsm.writer_id
                );
            }

            let runtime = &reader_runtimes[matched_reader.group_index][matched_reader.reader_index];
            *runtime.last_received.lock() = Instant::now();
            let mut state = runtime.state.lock();
            if *state != SubscriberState::Operational {
                *state = SubscriberState::Operational;
                if let Some(cb) = state_changed.as_ref() {
                    cb(SubscriberState::Operational);
                }
            }
        }
    }

    if let Some(cb) = state_changed.as_ref() {
        cb(SubscriberState::Disabled);
    }
}

/// Decode just the UADP header, discarding the cursor position, so the
/// caller can pick a reader group (and its security key manager) before
/// `nm_decode` runs its own, independent header decode.
fn peek_header(bytes: &[u8]) -> Option<NetworkMessageHeader> {
    let mut cursor = Cursor::new(bytes);
    decode_header(&mut cursor).ok().map(|decoded| decoded.header)
}

/// Reader groups of `connection` whose group id/version/expected publisher
/// id accept `header`, mirroring the candidate-group filter `nm_decode`
/// applies internally (spec.md §4.4 step 3), scoped to one connection.
fn matching_reader_groups<'a>(
    connection: &'a PubSubConnection,
    header: &'a NetworkMessageHeader,
) -> impl Iterator<Item = &'a ReaderGroup> {
    connection.groups.reader_groups().iter().filter(move |group| {
        group.group_id == header.group_id.unwrap_or(group.group_id)
            && group.group_version == header.group_version.unwrap_or(group.group_version)
            && publisher_id_matches(&group.expected_publisher_id, &header.publisher_id)
    })
}

fn check_receive_deadlines(
    config: &PubSubConfiguration,
    conn_idx: usize,
    reader_runtimes: &[Vec<Arc<ReaderRuntime>>],
    state_changed: &Option<StateChangedCallback>,
) {
    let groups = config.subscriber_connections()[conn_idx].groups.reader_groups();
    for (group_idx, group) in groups.iter().enumerate() {
        for (reader_idx, reader) in group.readers().iter().enumerate() {
            let runtime = &reader_runtimes[group_idx][reader_idx];
            let elapsed = runtime.last_received.lock().elapsed();
            let mut state = runtime.state.lock();
            if *state == SubscriberState::Operational && elapsed >= reader.receive_timeout {
                *state = SubscriberState::Paused;
                if let Some(cb) = state_changed {
                    cb(SubscriberState::Paused);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dataset_reader::{DataSetReaderBuilder, ReceptionType};
    use crate::config::published_dataset::{
        DataSetSourceType, FieldMetaData, PublishedDataSetBuilder,
    };
    use crate::config::reader_group::ReaderGroupBuilder;
    use crate::config::{ConnectionGroups, PubSubConfigurationBuilder, PubSubConnection, PublisherId};
    use crate::transport::address::TransportAddress;
    use crate::types::{BuiltInType, NodeId, ValueRank, WriteValue};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingSink {
        calls: AtomicUsize,
    }

    impl TargetVariableSink for CountingSink {
        fn set(&self, _write_values: Vec<WriteValue>) -> bool {
            self.calls.fetch_add(1, Ordering::Relaxed);
            true
        }
    }

    fn reader_group_config() -> PubSubConfiguration {
        let mut cfg = PubSubConfigurationBuilder::new();
        let mut data_set_builder = PublishedDataSetBuilder::new(DataSetSourceType::DataItems, 1);
        data_set_builder.set_field(
            0,
            FieldMetaData::published(BuiltInType::Boolean, ValueRank::Scalar, NodeId::new("ns=1;s=A")),
        );
        cfg.add_data_set(data_set_builder.build().unwrap());

        let mut reader_builder = DataSetReaderBuilder::new(
            1,
            Duration::from_millis(50),
            ReceptionType::TargetVariables,
            1,
        );
        reader_builder.set_field(
            0,
            FieldMetaData {
                built_in_type: BuiltInType::Boolean,
                value_rank: ValueRank::Scalar,
                array_dimensions: None,
                target: FieldDirection::Consumed(crate::config::dataset_reader::FieldTarget::new(
                    NodeId::new("ns=1;s=A"),
                )),
            },
        );
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
    fn stale_reader_transitions_operational_to_paused() {
        let config = reader_group_config();
        let runtimes = vec![vec![Arc::new(ReaderRuntime::new())]];
        *runtimes[0][0].state.lock() = SubscriberState::Operational;
        *runtimes[0][0].last_received.lock() =
            Instant::now() - Duration::from_millis(200);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let callback: Option<StateChangedCallback> = Some(Box::new(move |state| {
            if state == SubscriberState::Paused {
                fired_clone.fetch_add(1, Ordering::Relaxed);
            }
        }));

        check_receive_deadlines(&config, 0, &runtimes, &callback);

        assert_eq!(*runtimes[0][0].state.lock(), SubscriberState::Paused);
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn fresh_reader_stays_operational() {
        let config = reader_group_config();
        let runtimes = vec![vec![Arc::new(ReaderRuntime::new())]];
        *runtimes[0][0].state.lock() = SubscriberState::Operational;

        check_receive_deadlines(&config, 0, &runtimes, &None);

        assert_eq!(*runtimes[0][0].state.lock(), SubscriberState::Operational);
    }

    #[test]
    fn start_rejects_broker_address() {
        let mut cfg = PubSubConfigurationBuilder::new();
        let mut data_set_builder = PublishedDataSetBuilder::new(DataSetSourceType::DataItems, 1);
        data_set_builder.set_field(
            0,
            FieldMetaData::published(BuiltInType::Boolean, ValueRank::Scalar, NodeId::new("ns=1;s=A")),
        );
        cfg.add_data_set(data_set_builder.build().unwrap());

        let mut reader_builder = DataSetReaderBuilder::new(
            1,
            Duration::from_millis(50),
            ReceptionType::TargetVariables,
            1,
        );
        reader_builder.set_field(
            0,
            FieldMetaData {
                built_in_type: BuiltInType::Boolean,
                value_rank: ValueRank::Scalar,
                array_dimensions: None,
                target: FieldDirection::Consumed(crate::config::dataset_reader::FieldTarget::new(
                    NodeId::new("ns=1;s=A"),
                )),
            },
        );
        let reader = reader_builder.build().unwrap();
        let mut group_builder = ReaderGroupBuilder::new(14, 1, PublisherId::UInt(7), 1);
        group_builder.set_reader(0, reader);
        let group = group_builder.build().unwrap();

        let connection = PubSubConnection {
            address: TransportAddress::parse("mqtt://broker.example:1883").unwrap(),
            network_interface: None,
            broker_credentials: None,
            acyclic: false,
            publisher_id: None,
            enabled: true,
            groups: ConnectionGroups::Reader(vec![group]),
        };
        cfg.add_subscriber_connection(connection).unwrap();
        let config = Arc::new(cfg.build().unwrap());

        let sink = Arc::new(CountingSink { calls: AtomicUsize::new(0) });
        let result = SubscriberScheduler::start(config, sink, Vec::new(), None, None, None);
        assert!(result.is_err());
    }

    /// Reproduces S3 (spec.md §8) at the scheduler level: a NetworkMessage
    /// signed under one key fails `nm_decode`'s signature check against a
    /// reader group holding a different key, and `connection_worker`'s
    /// `Err(Error::Security(_))` arm picks exactly that group (via
    /// `peek_header`/`matching_reader_groups`) to report through
    /// `sub_signature_check_failed`.
    #[test]
    fn mismatched_security_key_selects_group_for_signature_check_failed() {
        use crate::config::dataset_writer::DataSetWriter;
        use crate::config::writer_group::WriterGroupBuilder;
        use crate::config::SymmetricKey;
        use crate::types::{StatusCode, Variant};
        use crate::uadp::{network_message_from_writer_group, nm_encode, nm_set_variant_at};
        use crate::uadp::content_mask::UadpNetworkMessageContentMask;

        struct XorSecurityProvider;
        impl SecurityProvider for XorSecurityProvider {
            fn sign(&self, key: &SymmetricKey, data: &[u8]) -> Vec<u8> {
                data.iter().zip(key.key.iter().cycle()).map(|(d, k)| d ^ k).collect()
            }
            fn verify(&self, key: &SymmetricKey, data: &[u8], signature: &[u8]) -> bool {
                self.sign(key, data) == signature
            }
        }

        let mut cfg = PubSubConfigurationBuilder::new();
        let mut data_set_builder = PublishedDataSetBuilder::new(DataSetSourceType::DataItems, 1);
        data_set_builder.set_field(
            0,
            FieldMetaData::published(BuiltInType::Boolean, ValueRank::Scalar, NodeId::new("ns=1;s=A")),
        );
        let dataset_index = cfg.add_data_set(data_set_builder.build().unwrap());

        let content_mask = UadpNetworkMessageContentMask {
            security: true,
            ..UadpNetworkMessageContentMask::minimal()
        };
        let mut writer_group_builder =
            WriterGroupBuilder::new(14, 1, Duration::from_millis(50), 1).content_mask(content_mask);
        writer_group_builder.set_writer(0, DataSetWriter::new(1, dataset_index).unwrap());
        let writer_group = writer_group_builder.build(false).unwrap();

        let publisher_connection = PubSubConnection {
            address: TransportAddress::parse("opc.udp://232.1.2.100:4840").unwrap(),
            network_interface: None,
            broker_credentials: None,
            acyclic: false,
            publisher_id: PublisherId::uint(123),
            enabled: true,
            groups: ConnectionGroups::Writer(vec![writer_group]),
        };
        cfg.add_publisher_connection(publisher_connection).unwrap();

        let mut reader_builder = DataSetReaderBuilder::new(
            1,
            Duration::from_millis(50),
            ReceptionType::TargetVariables,
            1,
        );
        reader_builder.set_field(
            0,
            FieldMetaData {
                built_in_type: BuiltInType::Boolean,
                value_rank: ValueRank::Scalar,
                array_dimensions: None,
                target: FieldDirection::Consumed(crate::config::dataset_reader::FieldTarget::new(
                    NodeId::new("ns=1;s=A"),
                )),
            },
        );
        let reader = reader_builder.build().unwrap();

        let mut group_builder =
            ReaderGroupBuilder::new(14, 1, PublisherId::uint(123).unwrap(), 1)
                .security_mode(SecurityMode::Sign)
                .security_group_id("sg1");
        group_builder.set_reader(0, reader);
        let reader_group = group_builder.build().unwrap();

        let subscriber_connection = PubSubConnection {
            address: TransportAddress::parse("opc.udp://232.1.2.100:4840").unwrap(),
            network_interface: None,
            broker_credentials: None,
            acyclic: false,
            publisher_id: None,
            enabled: true,
            groups: ConnectionGroups::Reader(vec![reader_group]),
        };
        cfg.add_subscriber_connection(subscriber_connection).unwrap();
        let config = cfg.build().unwrap();

        let writer_group = &config.publisher_connections()[0].groups.writer_groups()[0];
        let mut nm = network_message_from_writer_group(
            &config,
            writer_group,
            PublisherId::uint(123).unwrap(),
            false,
        )
        .unwrap();
        nm_set_variant_at(&mut nm, 0, 0, Variant::Boolean(true), StatusCode::GOOD).unwrap();

        let publisher_keys = SecurityKeyManager::new();
        publisher_keys.rotate(
            1,
            vec![SymmetricKey { token_id: 1, key: vec![0xAA, 0xBB, 0xCC] }],
            Duration::from_secs(10),
            Duration::from_secs(60),
        );
        let subscriber_keys = SecurityKeyManager::new();
        subscriber_keys.rotate(
            1,
            vec![SymmetricKey { token_id: 1, key: vec![0x11, 0x22, 0x33] }],
            Duration::from_secs(10),
            Duration::from_secs(60),
        );

        let provider = XorSecurityProvider;
        let bytes = nm_encode(&nm, Some((&publisher_keys, &provider))).unwrap();

        let decode_result = nm_decode(&bytes, &config, Some((&subscriber_keys, &provider)));
        assert!(matches!(decode_result, Err(Error::Security(_))));

        let connection = &config.subscriber_connections()[0];
        let header = peek_header(&bytes).expect("header decodes even when the signature is wrong");
        let fired = AtomicUsize::new(0);
        for group in
            matching_reader_groups(connection, &header).filter(|g| g.security_mode != SecurityMode::None)
        {
            assert_eq!(group.security_group_id.as_deref(), Some("sg1"));
            fired.fetch_add(1, Ordering::Relaxed);
        }
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }
}
