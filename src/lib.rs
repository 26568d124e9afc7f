// SPDX-License-Identifier: Apache-2.0 OR MIT

//! OPC UA PubSub scheduling engine.
//!
//! Four independent layers, each addressable on its own:
//!
//!   - [`config`] — the immutable configuration/dataset model connections,
//!     writer/reader groups and published datasets are built from.
//!   - [`uadp`] — the UADP network-message model and wire codec.
//!   - [`publisher`] / [`subscriber`] — the periodic-timer and
//!     blocking-receive schedulers that drive the codec against a
//!     `SourceVariableProvider` / `TargetVariableSink`.
//!   - [`safety`] — the UAM safety mapper: a single-threaded cyclic
//!     Provider/Consumer multiplexer, independent of the other three.
//!   - [`runtime_vars`] — the runtime-variable write request interface: no
//!     worker thread of its own, just a snapshot-to-`WriteValue` builder
//!     the embedding application drives on its own schedule.
//!
//! See `SPEC_FULL.md` for the system this crate implements and
//! `DESIGN.md` for where each part is grounded.

pub mod callbacks;
pub mod config;
pub mod error;
pub mod logging;
pub mod publisher;
pub mod runtime_vars;
pub mod safety;
pub mod subscriber;
pub mod transport;
pub mod types;
pub mod uadp;

pub use callbacks::{
    ProviderOutcome, PubSignatureFailedCallback, SourceVariableProvider, StateChangedCallback,
    SubSignatureCheckFailedCallback, SubscriberState, TargetVariableSink,
};
pub use config::{PubSubConfiguration, PubSubConfigurationBuilder};
pub use error::{Error, Result};
pub use publisher::PublisherScheduler;
pub use runtime_vars::{RuntimeVariable, RuntimeVariableSink, RuntimeVariables};
pub use subscriber::SubscriberScheduler;
