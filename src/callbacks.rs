// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Application-facing callback contracts (spec.md §6): the source-variable
//! provider and target-variable sink the schedulers call into, plus the
//! state-changed and signature-failure notifications. Kept in one module
//! since both the Publisher and Subscriber scheduler depend on it.

use crate::config::{PublisherId, ReaderGroup, WriterGroup};
use crate::types::{DataValue, ReadValueId, WriteValue};

/// Outcome of one `SourceVariableProvider::poll` call (spec.md §4.3 step 3).
#[derive(Debug)]
pub enum ProviderOutcome {
    Ready(Vec<DataValue>),
    Busy,
}

/// Consumer-side contract of the Publisher (spec.md §6).
///
/// `get` is the synchronous baseline: total, one `DataValue` per input, in
/// order. Asynchronous providers override `poll` to track an in-flight
/// request per writer and report `Busy` instead of blocking the worker
/// thread; the default `poll` just calls `get` inline.
pub trait SourceVariableProvider: Send + Sync {
    fn get(&self, nodes: &[ReadValueId]) -> Vec<DataValue>;

    fn poll(&self, writer_id: u16, nodes: &[ReadValueId]) -> ProviderOutcome {
        let _ = writer_id;
        ProviderOutcome::Ready(self.get(nodes))
    }
}

/// Consumer-side contract of the Subscriber (spec.md §6). Ownership of the
/// `WriteValue`s transfers to the sink; `true` means the values were
/// applied successfully.
pub trait TargetVariableSink: Send + Sync {
    fn set(&self, write_values: Vec<WriteValue>) -> bool;
}

/// Subscriber connection/reader state (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Disabled,
    Paused,
    Operational,
    Error,
}

/// `pub_signature_failed(group, publisher_id, security_group_id)`
/// (spec.md §4.3).
pub type PubSignatureFailedCallback =
    Box<dyn Fn(&WriterGroup, &PublisherId, Option<&str>) + Send + Sync>;

/// `sub_signature_check_failed(reader_group, security_group_id)`
/// (spec.md §4.4).
pub type SubSignatureCheckFailedCallback = Box<dyn Fn(&ReaderGroup, Option<&str>) + Send + Sync>;

/// `state_changed(new_state)` (spec.md §4.4/§6).
pub type StateChangedCallback = Box<dyn Fn(SubscriberState) + Send + Sync>;
