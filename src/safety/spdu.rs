// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SPDU wire model and the opaque Safety Layer primitive (spec.md §4.5).
//!
//! Field layout mirrors `UAS_RequestSpdu_type`/`UAS_ResponseSpdu_type` as
//! logged by `examples/original_source/samples/safety_demo/src/uam_s.c`
//! (`zSpduId.{dwPart1,dwPart2,dwPart3}`, `dwSafetyConsumerId`,
//! `dwMonitoringNumber`, `byFlags`, `dwCrc`, plus the serialized safety
//! and non-safety payload buffers).

/// Three-part identifier carried by every SPDU (spec.md §4.5: "SPDU id
/// (3 × u32)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpduId {
    pub part1: u32,
    pub part2: u32,
    pub part3: u32,
}

/// Frozen per-instance parameters (spec.md: "SafetyDataLength and
/// NonSafetyDataLength are frozen at init time").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyConfiguration {
    pub session_id: u32,
    pub safety_data_length: u16,
    pub non_safety_data_length: u16,
}

/// Request SPDU: Consumer -> Provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpdu {
    pub spdu_id: SpduId,
    pub safety_consumer_id: u32,
    pub monitoring_number: u32,
    pub flags: u8,
    pub crc: u32,
    pub safety_data: Vec<u8>,
    pub non_safety_data: Vec<u8>,
}

/// Response SPDU: Provider -> Consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSpdu {
    pub spdu_id: SpduId,
    pub safety_consumer_id: u32,
    pub monitoring_number: u32,
    pub flags: u8,
    pub crc: u32,
    pub safety_data: Vec<u8>,
    pub non_safety_data: Vec<u8>,
}

/// The Safety Layer's `execute_provider`/`execute_consumer` primitive
/// (spec.md §4.5 step 3): opaque to this crate, normally supplied by a
/// certified safety stack. A non-OK byte status is fatal to the calling
/// `cycle()` (spec.md "Failure modes").
pub trait SafetyLayer: Send {
    fn execute_provider(
        &mut self,
        config: &SafetyConfiguration,
        request: Option<&RequestSpdu>,
        safety_data: &[u8],
        non_safety_data: &[u8],
    ) -> Result<ResponseSpdu, u8>;

    fn execute_consumer(
        &mut self,
        config: &SafetyConfiguration,
        response: Option<&ResponseSpdu>,
        safety_data: &[u8],
        non_safety_data: &[u8],
    ) -> Result<RequestSpdu, u8>;
}

/// Deterministic stand-in for a certified Safety Layer. Not safety-rated:
/// the checksum is a plain FNV-1a fold rather than a certified CRC, and
/// MonitoringNumber simply increments by one per call (spec.md §8 S4).
/// Applications integrating a real safety stack supply their own
/// `SafetyLayer` instead.
#[derive(Debug, Default)]
pub struct PassthroughSafetyLayer {
    provider_mnr: u32,
    consumer_mnr: u32,
}

impl PassthroughSafetyLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

impl SafetyLayer for PassthroughSafetyLayer {
    fn execute_provider(
        &mut self,
        config: &SafetyConfiguration,
        request: Option<&RequestSpdu>,
        safety_data: &[u8],
        non_safety_data: &[u8],
    ) -> Result<ResponseSpdu, u8> {
        self.provider_mnr = self.provider_mnr.wrapping_add(1);
        let safety_consumer_id = request.map(|r| r.safety_consumer_id).unwrap_or(0);
        let mut crc_input = Vec::with_capacity(safety_data.len() + non_safety_data.len());
        crc_input.extend_from_slice(safety_data);
        crc_input.extend_from_slice(non_safety_data);
        Ok(ResponseSpdu {
            spdu_id: SpduId {
                part1: config.session_id,
                part2: self.provider_mnr,
                part3: 0,
            },
            safety_consumer_id,
            monitoring_number: self.provider_mnr,
            flags: 0,
            crc: fnv1a(&crc_input),
            safety_data: safety_data.to_vec(),
            non_safety_data: non_safety_data.to_vec(),
        })
    }

    fn execute_consumer(
        &mut self,
        config: &SafetyConfiguration,
        response: Option<&ResponseSpdu>,
        safety_data: &[u8],
        non_safety_data: &[u8],
    ) -> Result<RequestSpdu, u8> {
        self.consumer_mnr = self.consumer_mnr.wrapping_add(1);
        let safety_consumer_id = response.map(|r| r.safety_consumer_id).unwrap_or(0);
        let mut crc_input = Vec::with_capacity(safety_data.len() + non_safety_data.len());
        crc_input.extend_from_slice(safety_data);
        crc_input.extend_from_slice(non_safety_data);
        Ok(RequestSpdu {
            spdu_id: SpduId {
                part1: config.session_id,
                part2: self.consumer_mnr,
                part3: 0,
            },
            safety_consumer_id,
            monitoring_number: self.consumer_mnr,
            flags: 0,
            crc: fnv1a(&crc_input),
            safety_data: safety_data.to_vec(),
            non_safety_data: non_safety_data.to_vec(),
        })
    }
}

/// Per-cycle output of an application cycle callback (spec.md: "receive a
/// filled safe payload + non-safe payload as output").
pub struct CycleOutput {
    pub safety_data: Vec<u8>,
    pub non_safety_data: Vec<u8>,
    pub done: bool,
}

/// `UAM_S_pfProviderApplicationCycle(config, appInputs, appOutputs)`:
/// invoked with the previous Request SPDU (`None` on the first cycle).
pub type ProviderApplicationCycle =
    Box<dyn FnMut(&SafetyConfiguration, Option<&RequestSpdu>) -> CycleOutput + Send>;

/// `UAM_S_pfConsumerApplicationCycle(config, appInputs, appOutputs)`.
pub type ConsumerApplicationCycle =
    Box<dyn FnMut(&SafetyConfiguration, Option<&ResponseSpdu>) -> CycleOutput + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SafetyConfiguration {
        SafetyConfiguration {
            session_id: 0x010203,
            safety_data_length: 4,
            non_safety_data_length: 2,
        }
    }

    #[test]
    fn provider_monitoring_number_increments_each_call() {
        let mut layer = PassthroughSafetyLayer::new();
        let cfg = config();
        let first = layer
            .execute_provider(&cfg, None, &[0, 0, 0, 0], &[0, 0])
            .unwrap();
        let second = layer
            .execute_provider(&cfg, None, &[0, 0, 0, 0], &[0, 0])
            .unwrap();
        assert_eq!(first.monitoring_number, 1);
        assert_eq!(second.monitoring_number, 2);
        assert_eq!(second.spdu_id.part1, cfg.session_id);
    }

    #[test]
    fn provider_carries_consumer_id_from_request() {
        let mut layer = PassthroughSafetyLayer::new();
        let cfg = config();
        let request = RequestSpdu {
            spdu_id: SpduId::default(),
            safety_consumer_id: 42,
            monitoring_number: 0,
            flags: 0,
            crc: 0,
            safety_data: vec![0; 4],
            non_safety_data: vec![0; 2],
        };
        let response = layer
            .execute_provider(&cfg, Some(&request), &[1, 2, 3, 4], &[5, 6])
            .unwrap();
        assert_eq!(response.safety_consumer_id, 42);
        assert_eq!(response.safety_data, vec![1, 2, 3, 4]);
    }
}
