// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime-variable write request interface (spec.md §6): the one place the
//! core pushes data into an address space it does not otherwise own. Unlike
//! the Publisher/Subscriber schedulers this is not a worker thread — the
//! embedding application decides when server state changes (on start, on a
//! periodic current-time tick, on shutdown) and asks [`RuntimeVariables`]
//! for the matching batch of [`WriteValue`]s to hand to a
//! [`RuntimeVariableSink`].
//!
//! AttributeId is always [`ATTRIBUTE_ID_VALUE`] (13); every NodeId is in
//! namespace 0.

use crate::types::{DataValue, NodeId, Variant, WriteValue, ATTRIBUTE_ID_VALUE};

/// Consumer-side contract for the runtime-variable write requests (spec.md
/// §6), mirroring [`crate::callbacks::TargetVariableSink`]'s ownership
/// transfer: the sink takes the `WriteValue`s and forwards them to its own
/// local Write-request service.
pub trait RuntimeVariableSink: Send + Sync {
    fn write(&self, write_values: Vec<WriteValue>) -> bool;
}

/// One of the fixed set of namespace-0 targets the core writes to (spec.md
/// §6), named after the node it updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeVariable {
    ServerArray,
    NamespaceArray,
    ServiceLevel,
    Auditing,
    ServerDiagnosticsEnabledFlag,
    ServerRedundancyRedundancySupport,
    ServerCapabilitiesServerProfileArray,
    ServerCapabilitiesLocaleIdArray,
    ServerCapabilitiesMaxBrowseContinuationPoints,
    ServerCapabilitiesMaxArrayLength,
    ServerCapabilitiesMaxStringLength,
    ServerCapabilitiesMaxByteStringLength,
    ServerCapabilitiesMinSupportedSampleRate,
    OperationLimitsMaxNodesPerRead,
    OperationLimitsMaxNodesPerWrite,
    OperationLimitsMaxNodesPerBrowse,
    OperationLimitsMaxNodesPerRegisterNodes,
    OperationLimitsMaxNodesPerTranslateBrowsePathsToNodeIds,
    OperationLimitsMaxMonitoredItemsPerCall,
    OperationLimitsMaxNodesPerMethodCall,
    ServerStatus,
    ServerStatusStartTime,
    ServerStatusCurrentTime,
    ServerStatusState,
    ServerStatusSecondsTillShutdown,
    ServerStatusShutdownReason,
    ServerStatusBuildInfo,
}

impl RuntimeVariable {
    /// Well-known namespace-0 NodeId for this variable, as its opaque
    /// string form (spec.md §1/§3: the core does not resolve NodeIds, it
    /// only carries them).
    pub fn node_id(self) -> NodeId {
        use RuntimeVariable::*;
        let id: u32 = match self {
            ServerArray => 2254,
            NamespaceArray => 2255,
            ServerStatus => 2256,
            ServerStatusStartTime => 2257,
            ServerStatusCurrentTime => 2258,
            ServerStatusState => 2259,
            ServerStatusBuildInfo => 2260,
            ServerCapabilitiesServerProfileArray => 2269,
            ServerCapabilitiesLocaleIdArray => 2271,
            ServerCapabilitiesMinSupportedSampleRate => 2272,
            ServerCapabilitiesMaxBrowseContinuationPoints => 2277,
            ServiceLevel => 2267,
            ServerStatusSecondsTillShutdown => 2992,
            ServerStatusShutdownReason => 2993,
            Auditing => 2994,
            ServerDiagnosticsEnabledFlag => 2278,
            ServerRedundancyRedundancySupport => 2296,
            ServerCapabilitiesMaxArrayLength => 11549,
            ServerCapabilitiesMaxStringLength => 11550,
            ServerCapabilitiesMaxByteStringLength => 12911,
            OperationLimitsMaxNodesPerRead => 11705,
            OperationLimitsMaxNodesPerWrite => 11707,
            OperationLimitsMaxNodesPerBrowse => 11709,
            OperationLimitsMaxNodesPerRegisterNodes => 11712,
            OperationLimitsMaxNodesPerTranslateBrowsePathsToNodeIds => 11713,
            OperationLimitsMaxMonitoredItemsPerCall => 11714,
            OperationLimitsMaxNodesPerMethodCall => 11715,
        };
        NodeId::new(format!("ns=0;i={id}"))
    }
}

/// `Server.ServerStatus.BuildInfo` (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct BuildInfo {
    pub product_uri: String,
    pub manufacturer_name: String,
    pub product_name: String,
    pub software_version: String,
    pub build_number: String,
    /// OPC UA ticks (100ns units since 1601-01-01).
    pub build_date: i64,
}

/// `Server.ServerStatus.State` (`OpcUa_ServerState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Failed,
    NoConfiguration,
    Suspended,
    Shutdown,
    Test,
    CommunicationFault,
    Unknown,
}

impl ServerState {
    fn as_i32(self) -> i32 {
        match self {
            ServerState::Running => 0,
            ServerState::Failed => 1,
            ServerState::NoConfiguration => 2,
            ServerState::Suspended => 3,
            ServerState::Shutdown => 4,
            ServerState::Test => 5,
            ServerState::CommunicationFault => 6,
            ServerState::Unknown => 7,
        }
    }
}

/// `Server.ServerCapabilities.OperationLimits.MaxNodesPerX` (spec.md §6).
/// Only the services this crate's source/target variable contracts
/// actually cover get a non-zero limit; the rest stay at the OPC UA
/// "no limit" default of 0.
#[derive(Debug, Clone, Default)]
pub struct OperationLimits {
    pub max_nodes_per_read: u32,
    pub max_nodes_per_write: u32,
    pub max_nodes_per_browse: u32,
    pub max_nodes_per_register_nodes: u32,
    pub max_nodes_per_translate_browse_paths_to_node_ids: u32,
    pub max_monitored_items_per_call: u32,
    pub max_nodes_per_method_call: u32,
}

/// Snapshot of every runtime variable the core is responsible for (spec.md
/// §6), analogous to `SOPC_Server_RuntimeVariables`.
#[derive(Debug, Clone)]
pub struct RuntimeVariables {
    pub server_uri: String,
    pub namespace_uris: Vec<String>,
    pub service_level: u8,
    pub auditing: bool,
    pub server_diagnostics_enabled: bool,
    pub server_profile_uris: Vec<String>,
    pub locale_ids: Vec<String>,
    pub max_browse_continuation_points: u16,
    pub max_array_length: u32,
    pub max_string_length: u32,
    pub max_byte_string_length: u32,
    pub min_supported_sample_rate: f64,
    pub operation_limits: OperationLimits,
    pub server_state: ServerState,
    pub start_time: i64,
    pub seconds_till_shutdown: u32,
    pub shutdown_reason: String,
    pub build_info: BuildInfo,
}

impl RuntimeVariables {
    fn write_value(&self, variable: RuntimeVariable, value: Variant) -> WriteValue {
        WriteValue {
            node_id: variable.node_id(),
            attribute_id: ATTRIBUTE_ID_VALUE,
            value: DataValue::good(value),
        }
    }

    /// Every runtime variable this crate knows about (spec.md §6's full
    /// namespace-0 target list), equivalent to
    /// `SOPC_RuntimeVariables_BuildWriteRequest`.
    pub fn write_values(&self, now: i64) -> Vec<WriteValue> {
        let mut values = vec![
            self.write_value(
                RuntimeVariable::ServerArray,
                Variant::Array(
                    crate::types::BuiltInType::String,
                    vec![Variant::String(self.server_uri.clone())],
                ),
            ),
            self.write_value(
                RuntimeVariable::NamespaceArray,
                Variant::Array(
                    crate::types::BuiltInType::String,
                    std::iter::once("http://opcfoundation.org/UA/".to_string())
                        .chain(self.namespace_uris.iter().cloned())
                        .map(Variant::String)
                        .collect(),
                ),
            ),
            self.write_value(RuntimeVariable::ServiceLevel, Variant::Byte(self.service_level)),
            self.write_value(RuntimeVariable::Auditing, Variant::Boolean(self.auditing)),
            self.write_value(
                RuntimeVariable::ServerDiagnosticsEnabledFlag,
                Variant::Boolean(self.server_diagnostics_enabled),
            ),
            // RedundancySupport: None (0), this crate has no redundant-server story.
            self.write_value(RuntimeVariable::ServerRedundancyRedundancySupport, Variant::Int32(0)),
            self.write_value(
                RuntimeVariable::ServerCapabilitiesServerProfileArray,
                Variant::Array(
                    crate::types::BuiltInType::String,
                    self.server_profile_uris.iter().cloned().map(Variant::String).collect(),
                ),
            ),
            self.write_value(
                RuntimeVariable::ServerCapabilitiesLocaleIdArray,
                Variant::Array(
                    crate::types::BuiltInType::String,
                    self.locale_ids.iter().cloned().map(Variant::String).collect(),
                ),
            ),
            self.write_value(
                RuntimeVariable::ServerCapabilitiesMaxBrowseContinuationPoints,
                Variant::UInt16(self.max_browse_continuation_points),
            ),
            self.write_value(
                RuntimeVariable::ServerCapabilitiesMaxArrayLength,
                Variant::UInt32(self.max_array_length),
            ),
            self.write_value(
                RuntimeVariable::ServerCapabilitiesMaxStringLength,
                Variant::UInt32(self.max_string_length),
            ),
            self.write_value(
                RuntimeVariable::ServerCapabilitiesMaxByteStringLength,
                Variant::UInt32(self.max_byte_string_length),
            ),
            self.write_value(
                RuntimeVariable::ServerCapabilitiesMinSupportedSampleRate,
                Variant::Double(self.min_supported_sample_rate),
            ),
            self.write_value(
                RuntimeVariable::OperationLimitsMaxNodesPerRead,
                Variant::UInt32(self.operation_limits.max_nodes_per_read),
            ),
            self.write_value(
                RuntimeVariable::OperationLimitsMaxNodesPerWrite,
                Variant::UInt32(self.operation_limits.max_nodes_per_write),
            ),
            self.write_value(
                RuntimeVariable::OperationLimitsMaxNodesPerBrowse,
                Variant::UInt32(self.operation_limits.max_nodes_per_browse),
            ),
            self.write_value(
                RuntimeVariable::OperationLimitsMaxNodesPerRegisterNodes,
                Variant::UInt32(self.operation_limits.max_nodes_per_register_nodes),
            ),
            self.write_value(
                RuntimeVariable::OperationLimitsMaxNodesPerTranslateBrowsePathsToNodeIds,
                Variant::UInt32(self.operation_limits.max_nodes_per_translate_browse_paths_to_node_ids),
            ),
            self.write_value(
                RuntimeVariable::OperationLimitsMaxMonitoredItemsPerCall,
                Variant::UInt32(self.operation_limits.max_monitored_items_per_call),
            ),
            self.write_value(
                RuntimeVariable::OperationLimitsMaxNodesPerMethodCall,
                Variant::UInt32(self.operation_limits.max_nodes_per_method_call),
            ),
        ];
        values.extend(self.server_status_write_values(now));
        values
    }

    /// Just the `Server.ServerStatus.*` subset (spec.md §6), equivalent to
    /// `SOPC_RuntimeVariables_BuildUpdateServerStatusWriteRequest`.
    pub fn server_status_write_values(&self, now: i64) -> Vec<WriteValue> {
        vec![
            self.write_value(RuntimeVariable::ServerStatusStartTime, Variant::DateTime(self.start_time)),
            self.write_value(RuntimeVariable::ServerStatusCurrentTime, Variant::DateTime(now)),
            self.write_value(
                RuntimeVariable::ServerStatusState,
                Variant::Int32(self.server_state.as_i32()),
            ),
            self.write_value(
                RuntimeVariable::ServerStatusSecondsTillShutdown,
                Variant::UInt32(self.seconds_till_shutdown),
            ),
            self.write_value(
                RuntimeVariable::ServerStatusShutdownReason,
                Variant::String(self.shutdown_reason.clone()),
            ),
            self.write_value(
                RuntimeVariable::ServerStatusBuildInfo,
                Variant::String(format!(
                    "{}/{}/{}",
                    self.build_info.manufacturer_name, self.build_info.product_name, self.build_info.software_version
                )),
            ),
        ]
    }

    /// Just `Server.ServerStatus.CurrentTime` (spec.md §6), equivalent to
    /// `SOPC_RuntimeVariables_UpdateCurrentTimeWriteRequest`: the cheap,
    /// frequent tick an embedding application issues on its own timer
    /// without rebuilding the whole `ServerStatus` structure.
    pub fn current_time_write_value(&self, now: i64) -> WriteValue {
        self.write_value(RuntimeVariable::ServerStatusCurrentTime, Variant::DateTime(now))
    }
}
