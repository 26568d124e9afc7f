// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Safety mapper (UAM) — a single-threaded cyclic scheduler multiplexing
//! Providers and Consumers through a Request/Response SPDU exchange
//! (spec.md §4.5), grounded on
//! `examples/original_source/samples/safety_demo/src/uam_s.c` (the
//! `UAM_S_Initialize`/`InitSafetyProvider`/`InitSafetyConsumer`/
//! `StartSafety`/`Cycle`/`Clear`/`GetProvider`/`GetConsumer` lifecycle and
//! the `bNextProviderFreeHandle`/`bNextConsumerFreeHandle` dense handle
//! allocation) and `uam_s2ns_itf.h` (the non-safe duplex channel,
//! `UAM_S2NS_SendSpduImpl`/`UAM_S2NS_ReceiveAllSpdusFromNonSafe`).
//!
//! Handles are re-architected per spec.md §9 as typed indices into an
//! owned [`slab::Slab`] rather than raw offsets into a module-global
//! array, and the `apfProviderCycle`/`apfConsumerCycle` function-pointer
//! arrays become boxed closures stored alongside each slot. The non-safe
//! duplex channel is a bounded `crossbeam::channel` pair per instance
//! instead of the sample's raw UDP sockets.

mod slab;
pub mod spdu;

pub use spdu::{
    ConsumerApplicationCycle, CycleOutput, PassthroughSafetyLayer, ProviderApplicationCycle,
    RequestSpdu, ResponseSpdu, SafetyConfiguration, SafetyLayer, SpduId,
};

use crate::error::Error;
use crossbeam::channel::{self, Receiver, Sender};
use slab::Slab;

/// Default compile-time bound mirroring `UASDEF_MAX_SAFETYPROVIDERS`.
pub const MAX_SAFETY_PROVIDERS: usize = 8;
/// Default compile-time bound mirroring `UASDEF_MAX_SAFETYCONSUMERS`.
pub const MAX_SAFETY_CONSUMERS: usize = 8;

const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Narrowed stand-in for the opaque `pzSPI` argument of
/// `UAM_S_InitSafetyProvider`: the one knob this port needs, the depth of
/// the non-safe duplex channel created for this instance.
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpi {
    pub non_safe_channel_capacity: usize,
}

impl Default for ProviderSpi {
    fn default() -> Self {
        ProviderSpi {
            non_safe_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Narrowed stand-in for `UAM_S_InitSafetyConsumer`'s `pzSPI` argument.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerSpi {
    pub non_safe_channel_capacity: usize,
}

impl Default for ConsumerSpi {
    fn default() -> Self {
        ConsumerSpi {
            non_safe_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Dense, monotonic handle returned by `init_provider` (spec.md: "Handles
/// are monotonic and immutable after `start`; they directly index the
/// Safety Layer instance arrays").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderHandle(usize);

/// Dense, monotonic handle returned by `init_consumer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerHandle(usize);

/// Non-safe-side endpoint returned alongside a Provider's handle: push
/// inbound Request SPDUs, drain outbound Response SPDUs.
pub struct ProviderNonSafeEndpoint {
    pub request_tx: Sender<RequestSpdu>,
    pub response_rx: Receiver<ResponseSpdu>,
}

/// Non-safe-side endpoint returned alongside a Consumer's handle.
pub struct ConsumerNonSafeEndpoint {
    pub response_tx: Sender<ResponseSpdu>,
    pub request_rx: Receiver<RequestSpdu>,
}

struct ProviderSlot {
    config: SafetyConfiguration,
    cycle_cb: ProviderApplicationCycle,
    safety_data: Vec<u8>,
    non_safety_data: Vec<u8>,
    last_request: Option<RequestSpdu>,
    last_response: Option<ResponseSpdu>,
    request_rx: Receiver<RequestSpdu>,
    response_tx: Sender<ResponseSpdu>,
}

struct ConsumerSlot {
    config: SafetyConfiguration,
    cycle_cb: ConsumerApplicationCycle,
    safety_data: Vec<u8>,
    non_safety_data: Vec<u8>,
    last_request: Option<RequestSpdu>,
    last_response: Option<ResponseSpdu>,
    response_rx: Receiver<ResponseSpdu>,
    request_tx: Sender<RequestSpdu>,
}

/// The safety mapper itself. `cycle()` is driven by the caller; there are
/// no internal timers or threads (spec.md §5: "single-threaded
/// cooperative").
pub struct SafetyMapper {
    providers: Slab<ProviderSlot>,
    consumers: Slab<ConsumerSlot>,
    locked: bool,
    safety_layer: Box<dyn SafetyLayer>,
}

impl SafetyMapper {
    /// `initialize()` sized at the default compile-time limits.
    pub fn new(safety_layer: Box<dyn SafetyLayer>) -> Self {
        Self::with_capacity(MAX_SAFETY_PROVIDERS, MAX_SAFETY_CONSUMERS, safety_layer)
    }

    /// `initialize()` with an explicit arena capacity (spec.md §9: expose
    /// the fixed arena's size as a constructor parameter).
    pub fn with_capacity(
        max_providers: usize,
        max_consumers: usize,
        safety_layer: Box<dyn SafetyLayer>,
    ) -> Self {
        SafetyMapper {
            providers: Slab::with_capacity(max_providers),
            consumers: Slab::with_capacity(max_consumers),
            locked: false,
            safety_layer,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// `init_provider(config, spi, app_cycle_cb) -> handle`.
    pub fn init_provider(
        &mut self,
        config: SafetyConfiguration,
        spi: ProviderSpi,
        cycle_cb: ProviderApplicationCycle,
    ) -> Result<(ProviderHandle, ProviderNonSafeEndpoint), Error> {
        if self.locked {
            return Err(Error::Configuration(
                "init_provider called after start(): registration table is locked".into(),
            ));
        }
        let (request_tx, request_rx) = channel::bounded(spi.non_safe_channel_capacity.max(1));
        let (response_tx, response_rx) = channel::bounded(spi.non_safe_channel_capacity.max(1));
        let slot = ProviderSlot {
            safety_data: vec![0u8; config.safety_data_length as usize],
            non_safety_data: vec![0u8; config.non_safety_data_length as usize],
            config,
            cycle_cb,
            last_request: None,
            last_response: None,
            request_rx,
            response_tx,
        };
        let index = self
            .providers
            .insert(slot)
            .ok_or_else(|| Error::Allocation("MAX_SAFETY_PROVIDERS exceeded".into()))?;
        Ok((
            ProviderHandle(index),
            ProviderNonSafeEndpoint {
                request_tx,
                response_rx,
            },
        ))
    }

    /// `init_consumer(config, spi, app_cycle_cb) -> handle`.
    pub fn init_consumer(
        &mut self,
        config: SafetyConfiguration,
        spi: ConsumerSpi,
        cycle_cb: ConsumerApplicationCycle,
    ) -> Result<(ConsumerHandle, ConsumerNonSafeEndpoint), Error> {
        if self.locked {
            return Err(Error::Configuration(
                "init_consumer called after start(): registration table is locked".into(),
            ));
        }
        let (request_tx, request_rx) = channel::bounded(spi.non_safe_channel_capacity.max(1));
        let (response_tx, response_rx) = channel::bounded(spi.non_safe_channel_capacity.max(1));
        let slot = ConsumerSlot {
            safety_data: vec![0u8; config.safety_data_length as usize],
            non_safety_data: vec![0u8; config.non_safety_data_length as usize],
            config,
            cycle_cb,
            last_request: None,
            last_response: None,
            response_rx,
            request_tx,
        };
        let index = self
            .consumers
            .insert(slot)
            .ok_or_else(|| Error::Allocation("MAX_SAFETY_CONSUMERS exceeded".into()))?;
        Ok((
            ConsumerHandle(index),
            ConsumerNonSafeEndpoint {
                response_tx,
                request_rx,
            },
        ))
    }

    /// `start()`: locks the registration table; further `init_*` calls
    /// are rejected.
    pub fn start(&mut self) {
        self.locked = true;
    }

    /// `cycle()`: one tick across every Provider, then every Consumer
    /// (spec.md §4.5 per-tick algorithms).
    pub fn cycle(&mut self) -> Result<(), Error> {
        if !self.locked {
            return Err(Error::Configuration("cycle() called before start()".into()));
        }
        for (_, provider) in self.providers.iter_mut() {
            cycle_provider(provider, self.safety_layer.as_mut())?;
        }
        for (_, consumer) in self.consumers.iter_mut() {
            cycle_consumer(consumer, self.safety_layer.as_mut())?;
        }
        Ok(())
    }

    /// `clear()`: unlocks the registration table and releases the arena.
    pub fn clear(&mut self) {
        self.providers.clear();
        self.consumers.clear();
        self.locked = false;
    }

    /// `UAM_S_GetProvider`, narrowed to the configuration this port
    /// tracks per instance.
    pub fn provider_config(&self, handle: ProviderHandle) -> Option<&SafetyConfiguration> {
        self.providers.get(handle.0).map(|slot| &slot.config)
    }

    /// `UAM_S_GetConsumer`, narrowed likewise.
    pub fn consumer_config(&self, handle: ConsumerHandle) -> Option<&SafetyConfiguration> {
        self.consumers.get(handle.0).map(|slot| &slot.config)
    }

    pub fn last_response(&self, handle: ProviderHandle) -> Option<&ResponseSpdu> {
        self.providers
            .get(handle.0)
            .and_then(|slot| slot.last_response.as_ref())
    }

    pub fn last_request(&self, handle: ConsumerHandle) -> Option<&RequestSpdu> {
        self.consumers
            .get(handle.0)
            .and_then(|slot| slot.last_request.as_ref())
    }
}

fn cycle_provider(provider: &mut ProviderSlot, safety_layer: &mut dyn SafetyLayer) -> Result<(), Error> {
    // 1. invoke the application cycle callback with the previous Request
    //    SPDU as input.
    let output = (provider.cycle_cb)(&provider.config, provider.last_request.as_ref());
    if !output.done {
        log::debug!("[safety] provider application cycle reported not done");
    }
    if output.safety_data.len() == provider.config.safety_data_length as usize {
        provider.safety_data = output.safety_data;
    } else {
        log::warn!(
            "[safety] provider application cycle returned {} safety bytes, expected {}",
            output.safety_data.len(),
            provider.config.safety_data_length
        );
    }
    if output.non_safety_data.len() == provider.config.non_safety_data_length as usize {
        provider.non_safety_data = output.non_safety_data;
    }

    // 2. fetch the latest Request SPDU arrived from the non-safe side.
    while let Ok(request) = provider.request_rx.try_recv() {
        provider.last_request = Some(request);
    }

    // 3. run the Safety Layer's execute_provider primitive.
    let response = safety_layer
        .execute_provider(
            &provider.config,
            provider.last_request.as_ref(),
            &provider.safety_data,
            &provider.non_safety_data,
        )
        .map_err(Error::Safety)?;

    // 4. hand the Response SPDU bytes to the non-safe side.
    if provider.response_tx.try_send(response.clone()).is_err() {
        log::warn!("[safety] provider non-safe response channel full, dropping SPDU");
    }
    provider.last_response = Some(response);
    Ok(())
}

fn cycle_consumer(consumer: &mut ConsumerSlot, safety_layer: &mut dyn SafetyLayer) -> Result<(), Error> {
    // ingest the latest Response SPDU arrived from the non-safe side.
    while let Ok(response) = consumer.response_rx.try_recv() {
        consumer.last_response = Some(response);
    }

    let request = safety_layer
        .execute_consumer(
            &consumer.config,
            consumer.last_response.as_ref(),
            &consumer.safety_data,
            &consumer.non_safety_data,
        )
        .map_err(Error::Safety)?;

    if consumer.request_tx.try_send(request.clone()).is_err() {
        log::warn!("[safety] consumer non-safe request channel full, dropping SPDU");
    }
    consumer.last_request = Some(request);

    let output = (consumer.cycle_cb)(&consumer.config, consumer.last_response.as_ref());
    if output.safety_data.len() == consumer.config.safety_data_length as usize {
        consumer.safety_data = output.safety_data;
    }
    if output.non_safety_data.len() == consumer.config.non_safety_data_length as usize {
        consumer.non_safety_data = output.non_safety_data;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_config() -> SafetyConfiguration {
        SafetyConfiguration {
            session_id: 0x010203,
            safety_data_length: 28,
            non_safety_data_length: 30,
        }
    }

    fn done_cycle() -> ProviderApplicationCycle {
        Box::new(|_config, _request| CycleOutput {
            safety_data: vec![0u8; 28],
            non_safety_data: vec![0u8; 30],
            done: true,
        })
    }

    #[test]
    fn init_provider_assigns_dense_handle_zero() {
        let mut mapper = SafetyMapper::new(Box::new(PassthroughSafetyLayer::new()));
        let (handle, _endpoint) = mapper
            .init_provider(test_config(), ProviderSpi::default(), done_cycle())
            .expect("provider registers");
        assert_eq!(handle, ProviderHandle(0));
        assert_eq!(
            mapper.provider_config(handle).unwrap().session_id,
            0x010203
        );
    }

    #[test]
    fn single_cycle_invokes_callback_once_with_session_id_and_increments_mnr() {
        let mut mapper = SafetyMapper::new(Box::new(PassthroughSafetyLayer::new()));
        let call_count = Arc::new(AtomicU32::new(0));
        let seen_session = Arc::new(AtomicU32::new(0));
        let seen_length = Arc::new(AtomicU32::new(0));
        let call_count_cb = Arc::clone(&call_count);
        let seen_session_cb = Arc::clone(&seen_session);
        let seen_length_cb = Arc::clone(&seen_length);

        let (handle, _endpoint) = mapper
            .init_provider(
                test_config(),
                ProviderSpi::default(),
                Box::new(move |config, _request| {
                    call_count_cb.fetch_add(1, Ordering::SeqCst);
                    seen_session_cb.store(config.session_id, Ordering::SeqCst);
                    seen_length_cb.store(config.safety_data_length as u32, Ordering::SeqCst);
                    CycleOutput {
                        safety_data: vec![0u8; 28],
                        non_safety_data: vec![0u8; 30],
                        done: true,
                    }
                }),
            )
            .unwrap();
        mapper.start();

        mapper.cycle().expect("first cycle succeeds");
        let first_mnr = mapper.last_response(handle).unwrap().monitoring_number;

        mapper.cycle().expect("second cycle succeeds");
        let second_mnr = mapper.last_response(handle).unwrap().monitoring_number;

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
        assert_eq!(seen_session.load(Ordering::SeqCst), 0x010203);
        assert_eq!(seen_length.load(Ordering::SeqCst), 28);
        assert_eq!(second_mnr, first_mnr + 1);
    }

    #[test]
    fn init_after_start_is_rejected() {
        let mut mapper = SafetyMapper::new(Box::new(PassthroughSafetyLayer::new()));
        mapper.start();
        let result = mapper.init_provider(test_config(), ProviderSpi::default(), done_cycle());
        assert!(result.is_err());
    }

    #[test]
    fn cycle_before_start_is_rejected() {
        let mut mapper = SafetyMapper::new(Box::new(PassthroughSafetyLayer::new()));
        mapper
            .init_provider(test_config(), ProviderSpi::default(), done_cycle())
            .unwrap();
        assert!(mapper.cycle().is_err());
    }

    #[test]
    fn exceeding_provider_capacity_is_rejected() {
        let mut mapper =
            SafetyMapper::with_capacity(1, 1, Box::new(PassthroughSafetyLayer::new()));
        mapper
            .init_provider(test_config(), ProviderSpi::default(), done_cycle())
            .unwrap();
        let second = mapper.init_provider(test_config(), ProviderSpi::default(), done_cycle());
        assert!(second.is_err());
    }

    #[test]
    fn clear_unlocks_and_frees_handles_for_reuse() {
        let mut mapper =
            SafetyMapper::with_capacity(1, 1, Box::new(PassthroughSafetyLayer::new()));
        mapper
            .init_provider(test_config(), ProviderSpi::default(), done_cycle())
            .unwrap();
        mapper.start();
        mapper.clear();
        assert!(!mapper.is_locked());
        let (handle, _endpoint) = mapper
            .init_provider(test_config(), ProviderSpi::default(), done_cycle())
            .expect("registration table reopened after clear");
        assert_eq!(handle, ProviderHandle(0));
    }

    #[test]
    fn non_safe_endpoint_receives_response_after_cycle() {
        let mut mapper = SafetyMapper::new(Box::new(PassthroughSafetyLayer::new()));
        let (_handle, endpoint) = mapper
            .init_provider(test_config(), ProviderSpi::default(), done_cycle())
            .unwrap();
        mapper.start();
        mapper.cycle().unwrap();
        let response = endpoint
            .response_rx
            .try_recv()
            .expect("response forwarded to the non-safe side");
        assert_eq!(response.monitoring_number, 1);
    }
}
