// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Publisher scheduler (spec.md §4.3): one dedicated worker thread per
//! publisher connection, grounded on `hdds`'s `SpdpAnnouncer` (background
//! thread spawned with a shared `Arc<AtomicBool>` shutdown flag, joined on
//! drop/`stop`) and `transport::udp::open_publisher_socket` for the send
//! socket itself.

use crate::callbacks::{PubSignatureFailedCallback, SourceVariableProvider, ProviderOutcome};
use crate::config::published_dataset::FieldDirection;
use crate::config::writer_group::SecurityMode;
use crate::config::{PubSubConfiguration, PublisherId, SecurityKeyManager, WriterGroup};
use crate::error::Error;
use crate::transport::address::TransportAddress;
use crate::transport::udp;
use crate::types::{now_as_opcua_ticks, DataValue, ReadValueId, StatusCode};
use crate::uadp::codec::{network_message_from_writer_group, nm_encode, nm_set_variant_at};
use crate::uadp::security_provider::SecurityProvider;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Per-writer-group mutable state owned by the worker that publishes it
/// (spec.md §5 "per-writer-group fixed buffers are exclusively owned by
/// the worker that publishes that group" — generalized here to all
/// per-group runtime state, not just fixed buffers).
struct WriterGroupRuntime {
    /// Acyclic "payload queued since last tick" flags, one per writer.
    due_flags: Vec<AtomicBool>,
    /// Group-local sequence number; wraps at 2^16 via `fetch_add`'s
    /// native wrapping arithmetic (spec.md §4.3 step 5).
    sequence: AtomicU16,
    /// Last value successfully read for each writer, reused for writers
    /// not due this tick or whose provider reported `Busy`.
    cache: Mutex<Vec<Option<Vec<DataValue>>>>,
    last_emission: Mutex<Instant>,
    bootstrapped: AtomicBool,
}

impl WriterGroupRuntime {
    fn new(writer_count: usize) -> Self {
        WriterGroupRuntime {
            due_flags: (0..writer_count).map(|_| AtomicBool::new(false)).collect(),
            sequence: AtomicU16::new(0),
            cache: Mutex::new(vec![None; writer_count]),
            last_emission: Mutex::new(Instant::now()),
            bootstrapped: AtomicBool::new(false),
        }
    }
}

/// Handle returned by [`PublisherScheduler::start`]: lets the application
/// queue payloads for acyclic writers and stop the scheduler.
pub struct PublisherScheduler {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    /// `(connection_index, group_index)` -> runtime, in declaration order,
    /// addressed by [`PublisherScheduler::queue_payload`].
    runtimes: Vec<Vec<Arc<WriterGroupRuntime>>>,
}

impl PublisherScheduler {
    /// Start one worker per publisher connection. Returns an error (rather
    /// than spec.md's narrative "returns false") on any socket-open
    /// failure, matching this crate's `Result`-based error convention.
    pub fn start(
        config: Arc<PubSubConfiguration>,
        provider: Arc<dyn SourceVariableProvider>,
        security_key_managers: Vec<Arc<SecurityKeyManager>>,
        security_provider: Option<Arc<dyn SecurityProvider>>,
        pub_signature_failed: Option<PubSignatureFailedCallback>,
    ) -> Result<Self, Error> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let pub_signature_failed = Arc::new(pub_signature_failed);
        let mut handles = Vec::new();
        let mut runtimes = Vec::new();

        for (conn_idx, connection) in config.publisher_connections().iter().enumerate() {
            if !connection.enabled || connection.groups.writer_groups().is_empty() {
                runtimes.push(Vec::new());
                continue;
            }

            let TransportAddress::Udp { host, port, .. } = &connection.address else {
                return Err(Error::Configuration(
                    "Publisher scheduler only supports opc.udp:// addresses".into(),
                ));
            };
            let dest: SocketAddr = SocketAddrV4::new(*host, *port).into();
            let socket = udp::open_publisher_socket(
                &connection.address,
                connection.network_interface.as_deref(),
            )?;

            let group_runtimes: Vec<Arc<WriterGroupRuntime>> = connection
                .groups
                .writer_groups()
                .iter()
                .map(|g| Arc::new(WriterGroupRuntime::new(g.writers().len())))
                .collect();
            runtimes.push(group_runtimes.clone());

            let config = Arc::clone(&config);
            let provider = Arc::clone(&provider);
            let security_key_managers = security_key_managers.clone();
            let security_provider = security_provider.clone();
            let pub_signature_failed = Arc::clone(&pub_signature_failed);
            let shutdown = Arc::clone(&shutdown);
            let publisher_id = connection.publisher_id.clone().unwrap_or(PublisherId::None);
            let acyclic = connection.acyclic;

            let handle = thread::spawn(move || {
                connection_worker(
                    conn_idx,
                    config,
                    socket,
                    dest,
                    acyclic,
                    publisher_id,
                    provider,
                    security_key_managers,
                    security_provider,
                    pub_signature_failed,
                    group_runtimes,
                    shutdown,
                );
            });
            handles.push(handle);
        }

        Ok(PublisherScheduler { shutdown, handles, runtimes })
    }

    /// Queue a payload for an acyclic writer group's writer (spec.md §4.3
    /// step 1): marks it due at the next tick. No-op for cyclic groups,
    /// which are always due on their own timer.
    pub fn queue_payload(&self, connection_index: usize, group_index: usize, writer_index: usize) {
        if let Some(flag) = self
            .runtimes
            .get(connection_index)
            .and_then(|groups| groups.get(group_index))
            .and_then(|rt| rt.due_flags.get(writer_index))
        {
            flag.store(true, Ordering::Release);
        }
    }

    /// Idempotent: signals shutdown and joins every worker.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for PublisherScheduler {
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
    socket: UdpSocket,
    dest: SocketAddr,
    acyclic: bool,
    publisher_id: PublisherId,
    provider: Arc<dyn SourceVariableProvider>,
    security_key_managers: Vec<Arc<SecurityKeyManager>>,
    security_provider: Option<Arc<dyn SecurityProvider>>,
    pub_signature_failed: Arc<Option<PubSignatureFailedCallback>>,
    group_runtimes: Vec<Arc<WriterGroupRuntime>>,
    shutdown: Arc<AtomicBool>,
) {
    let groups = config.publisher_connections()[conn_idx].groups.writer_groups();
    let min_interval = groups
        .iter()
        .map(|g| g.publishing_interval)
        .min()
        .unwrap_or(Duration::from_millis(100));
    let mut next_due: Vec<Instant> = groups.iter().map(|_| Instant::now()).collect();

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        let now = Instant::now();
        for (group_idx, group) in groups.iter().enumerate() {
            if now < next_due[group_idx] {
                continue;
            }
            next_due[group_idx] = now + group.publishing_interval;

            let key_manager = group
                .security_key_services
                .first()
                .and_then(|&idx| security_key_managers.get(idx))
                .map(Arc::as_ref);
            let security = match (key_manager, security_provider.as_deref()) {
                (Some(km), Some(sp)) => Some((km, sp)),
                _ => None,
            };

            if let Err(err) = tick(
                &config,
                group,
                &group_runtimes[group_idx],
                publisher_id.clone(),
                acyclic,
                provider.as_ref(),
                security,
                &socket,
                dest,
                pub_signature_failed.as_ref(),
            ) {
                log::warn!("[publisher] connection {conn_idx} group {} tick failed: {err}", group.group_id);
            }
        }

        let sleep_chunk = min_interval.min(Duration::from_millis(20)).max(Duration::from_millis(1));
        thread::sleep(sleep_chunk);
    }
}

#[allow(clippy::too_many_arguments)]
fn tick(
    config: &PubSubConfiguration,
    group: &WriterGroup,
    runtime: &WriterGroupRuntime,
    publisher_id: PublisherId,
    acyclic: bool,
    provider: &dyn SourceVariableProvider,
    security: Option<(&SecurityKeyManager, &dyn SecurityProvider)>,
    socket: &UdpSocket,
    dest: SocketAddr,
    pub_signature_failed: &Option<PubSignatureFailedCallback>,
) -> Result<(), Error> {
    let writer_count = group.writers().len();
    let first_tick = !runtime.bootstrapped.swap(true, Ordering::AcqRel);

    let due: Vec<usize> = if acyclic && !first_tick {
        (0..writer_count)
            .filter(|&i| runtime.due_flags[i].swap(false, Ordering::AcqRel))
            .collect()
    } else {
        (0..writer_count).collect()
    };

    if due.is_empty() {
        if let Some(keep_alive) = group.keep_alive {
            let mut last = runtime.last_emission.lock();
            if last.elapsed() >= keep_alive {
                let nm = network_message_from_writer_group(config, group, publisher_id, true)?;
                send(&nm, security, socket, dest)?;
                *last = Instant::now();
            }
        }
        return Ok(());
    }

    if group.security_mode != SecurityMode::None {
        let has_key = security
            .map(|(km, _)| !km.snapshot().keys.is_empty())
            .unwrap_or(false);
        if !has_key {
            if let Some(cb) = pub_signature_failed {
                cb(group, &publisher_id, group.security_group_id.as_deref());
            }
            return Ok(());
        }
    }

    let mut nm = network_message_from_writer_group(config, group, publisher_id, false)?;
    {
        let mut cache = runtime.cache.lock();
        for (writer_index, writer) in group.writers().iter().enumerate() {
            let data_set = config.data_set(writer.data_set).ok_or_else(|| {
                Error::Configuration(format!(
                    "DataSetWriter {} references unknown PublishedDataSet",
                    writer.writer_id
                ))
            })?;

            let values = if due.contains(&writer_index) {
                let nodes: Vec<ReadValueId> = data_set
                    .fields()
                    .iter()
                    .filter_map(|field| match &field.target {
                        FieldDirection::Published(pv) => Some(ReadValueId {
                            node_id: pv.node_id.clone(),
                            attribute_id: pv.attribute_id,
                            numeric_range: pv.numeric_range.clone(),
                        }),
                        FieldDirection::Consumed(_) => None,
                    })
                    .collect();
                match provider.poll(writer.writer_id, &nodes) {
                    ProviderOutcome::Ready(values) => {
                        cache[writer_index] = Some(values.clone());
                        values
                    }
                    ProviderOutcome::Busy => cache[writer_index]
                        .clone()
                        .unwrap_or_else(|| bad_quality_values(data_set)),
                }
            } else {
                cache[writer_index]
                    .clone()
                    .unwrap_or_else(|| bad_quality_values(data_set))
            };

            for (field_index, value) in values.into_iter().enumerate() {
                nm_set_variant_at(&mut nm, writer_index, field_index, value.value, value.status)?;
            }
        }
    }

    let sequence = runtime.sequence.fetch_add(1, Ordering::Relaxed);
    nm.header.sequence_number = Some(sequence);
    if nm.header.content_mask.timestamp {
        nm.header.timestamp = Some(now_as_opcua_ticks());
    }

    send(&nm, security, socket, dest)?;
    *runtime.last_emission.lock() = Instant::now();
    Ok(())
}

fn send(
    nm: &crate::uadp::message::NetworkMessage,
    security: Option<(&SecurityKeyManager, &dyn SecurityProvider)>,
    socket: &UdpSocket,
    dest: SocketAddr,
) -> Result<(), Error> {
    let bytes = nm_encode(nm, security)?;
    let sent = socket.send_to(&bytes, dest)?;
    if sent != bytes.len() {
        log::warn!("[publisher] partial send to {dest}: {sent}/{} bytes", bytes.len());
    }
    Ok(())
}

/// Placeholder field values for a writer that has never produced data
/// (first tick, provider BUSY with no prior cache): one type-correct
/// zero value per field tagged with a bad status, so `nm_set_variant_at`'s
/// slot is never left `None`.
fn bad_quality_values(data_set: &crate::config::PublishedDataSet) -> Vec<DataValue> {
    data_set
        .fields()
        .iter()
        .map(|field| DataValue::bad(StatusCode(0x8002_0000), field.built_in_type.default_variant()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::published_dataset::{DataSetSourceType, FieldMetaData, PublishedDataSetBuilder};
    use crate::config::{
        ConnectionGroups, DataSetWriter, PubSubConfigurationBuilder, PubSubConnection,
        WriterGroupBuilder,
    };
    use crate::types::{BuiltInType, NodeId, ReadValueId, ValueRank};

    struct StaticProvider;

    impl SourceVariableProvider for StaticProvider {
        fn get(&self, nodes: &[ReadValueId]) -> Vec<DataValue> {
            nodes
                .iter()
                .map(|_| DataValue::good(crate::types::Variant::Boolean(true)))
                .collect()
        }
    }

    fn boolean_dataset() -> crate::config::PublishedDataSet {
        let mut builder = PublishedDataSetBuilder::new(DataSetSourceType::DataItems, 1);
        builder.set_field(
            0,
            FieldMetaData::published(BuiltInType::Boolean, ValueRank::Scalar, NodeId::new("ns=1;s=A")),
        );
        builder.build().unwrap()
    }

    #[test]
    fn bad_quality_values_match_field_count_and_status() {
        let data_set = boolean_dataset();
        let values = bad_quality_values(&data_set);
        assert_eq!(values.len(), 1);
        assert!(!values[0].status.is_good());
        assert_eq!(values[0].value, crate::types::Variant::Boolean(false));
    }

    #[test]
    fn start_rejects_broker_address() {
        let mut cfg = PubSubConfigurationBuilder::new();
        let dataset_index = cfg.add_data_set(boolean_dataset());

        let mut group_builder = WriterGroupBuilder::new(14, 1, Duration::from_millis(50), 1);
        group_builder.set_writer(0, DataSetWriter::new(1, dataset_index).unwrap());
        let group = group_builder.build(false).unwrap();

        let connection = PubSubConnection {
            address: TransportAddress::parse("mqtt://broker.example:1883").unwrap(),
            network_interface: None,
            broker_credentials: None,
            acyclic: false,
            publisher_id: PublisherId::uint(123),
            enabled: true,
            groups: ConnectionGroups::Writer(vec![group]),
        };
        cfg.add_publisher_connection(connection).unwrap();
        let config = Arc::new(cfg.build().unwrap());

        let result = PublisherScheduler::start(config, Arc::new(StaticProvider), Vec::new(), None, None);
        assert!(result.is_err());
    }

    #[test]
    fn queue_payload_marks_writer_due_on_an_acyclic_group() {
        let mut cfg = PubSubConfigurationBuilder::new();
        let dataset_index = cfg.add_data_set(boolean_dataset());

        let mut group_builder = WriterGroupBuilder::new(14, 1, Duration::from_millis(50), 1)
            .keep_alive(Duration::from_secs(5));
        group_builder.set_writer(0, DataSetWriter::new(1, dataset_index).unwrap());
        let group = group_builder.build(true).unwrap();

        let connection = PubSubConnection {
            address: TransportAddress::parse("opc.udp://127.0.0.1:0").unwrap(),
            network_interface: None,
            broker_credentials: None,
            acyclic: true,
            publisher_id: PublisherId::uint(123),
            enabled: true,
            groups: ConnectionGroups::Writer(vec![group]),
        };
        cfg.add_publisher_connection(connection).unwrap();
        let config = Arc::new(cfg.build().unwrap());

        let scheduler = PublisherScheduler::start(config, Arc::new(StaticProvider), Vec::new(), None, None)
            .expect("scheduler starts");
        scheduler.queue_payload(0, 0, 0);
        assert!(scheduler.runtimes[0][0].due_flags[0].load(Ordering::Acquire));
        scheduler.stop();
    }
}
