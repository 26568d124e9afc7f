// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `SecurityKeyServices` and `SecurityKeyManager` (spec.md §3, §5).
//!
//! The manager exposes a lock-free snapshot read grounded on
//! `hdds::config::RuntimeConfig`'s use of `arc_swap::ArcSwap` for its
//! hot-path port mapping: callers retrieve `(current_token_id, keys,
//! time_to_next_key, key_lifetime)` under a single atomic load, and an
//! external SKS client publishes new snapshots between worker iterations
//! without taking a lock on the read path.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;

/// Endpoint + trusted certificate of a Security Key Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityKeyServices {
    pub endpoint_url: String,
    /// Serialized trusted server certificate (opaque to this crate; the
    /// certificate chain itself is validated by the crypto provider).
    pub trusted_certificate: Vec<u8>,
}

/// One symmetric key, tagged with the token id it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetricKey {
    pub token_id: u32,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone)]
struct KeySnapshot {
    current_token_id: u32,
    keys: Vec<SymmetricKey>,
    time_to_next_key: Duration,
    key_lifetime: Duration,
}

impl Default for KeySnapshot {
    fn default() -> Self {
        KeySnapshot {
            current_token_id: 0,
            keys: Vec::new(),
            time_to_next_key: Duration::ZERO,
            key_lifetime: Duration::ZERO,
        }
    }
}

/// A single security group's rotating key state, with an atomic
/// snapshot-read API used by the publisher/subscriber schedulers.
#[derive(Debug, Default)]
pub struct SecurityKeyManager {
    snapshot: ArcSwap<KeySnapshot>,
}

/// The four fields read together under one atomic load (spec.md §5).
#[derive(Debug, Clone)]
pub struct KeySnapshotView {
    pub current_token_id: u32,
    pub keys: Arc<[SymmetricKey]>,
    pub time_to_next_key: Duration,
    pub key_lifetime: Duration,
}

impl SecurityKeyManager {
    pub fn new() -> Self {
        SecurityKeyManager {
            snapshot: ArcSwap::from_pointee(KeySnapshot::default()),
        }
    }

    /// Single atomic read of the current key state.
    pub fn snapshot(&self) -> KeySnapshotView {
        let guard = self.snapshot.load();
        KeySnapshotView {
            current_token_id: guard.current_token_id,
            keys: guard.keys.clone().into(),
            time_to_next_key: guard.time_to_next_key,
            key_lifetime: guard.key_lifetime,
        }
    }

    /// Look up a key by token id, as the codec does when verifying or
    /// applying a security footer (spec.md §4.2).
    pub fn key_for_token(&self, token_id: u32) -> Option<SymmetricKey> {
        self.snapshot
            .load()
            .keys
            .iter()
            .find(|k| k.token_id == token_id)
            .cloned()
    }

    /// Publish a new key state. Called by an external SKS client between
    /// worker iterations; never called from inside a publish/receive tick.
    pub fn rotate(
        &self,
        current_token_id: u32,
        keys: Vec<SymmetricKey>,
        time_to_next_key: Duration,
        key_lifetime: Duration,
    ) {
        self.snapshot.store(Arc::new(KeySnapshot {
            current_token_id,
            keys,
            time_to_next_key,
            key_lifetime,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_defaults_to_empty() {
        let mgr = SecurityKeyManager::new();
        let view = mgr.snapshot();
        assert_eq!(view.current_token_id, 0);
        assert!(view.keys.is_empty());
    }

    #[test]
    fn rotate_then_lookup() {
        let mgr = SecurityKeyManager::new();
        mgr.rotate(
            7,
            vec![SymmetricKey {
                token_id: 7,
                key: vec![1, 2, 3],
            }],
            Duration::from_secs(10),
            Duration::from_secs(60),
        );
        let key = mgr.key_for_token(7).expect("token 7 present");
        assert_eq!(key.key, vec![1, 2, 3]);
        assert!(mgr.key_for_token(99).is_none());
    }
}
