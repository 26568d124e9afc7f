// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opaque crypto-provider seam (spec.md §1: "the core consumes an opaque
//! 'crypto provider' capability"). No implementation ships here; the
//! signature/verification algorithm itself is an external collaborator,
//! mirroring how `ConfigurationLoader` marks the XML-adapter seam.

use crate::config::SymmetricKey;

/// Signs and verifies the UADP security footer. Injected into
/// [`crate::uadp::codec::nm_encode`]/[`crate::uadp::codec::nm_decode`] by
/// the caller; this crate never computes a signature itself.
pub trait SecurityProvider {
    /// Produce the signature bytes appended to the security footer.
    fn sign(&self, key: &SymmetricKey, data: &[u8]) -> Vec<u8>;

    /// Verify `signature` over `data` under `key`.
    fn verify(&self, key: &SymmetricKey, data: &[u8], signature: &[u8]) -> bool;
}
