// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AEAD encryption under 256-bit symmetric keys (ring).

use std::fmt;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey};

use super::algorithms::SymmetricAlgorithm;
use super::random_bytes;
use crate::error::{CwsError, CwsResult};

/// Length of every symmetric key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of a per-encryption nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// A symmetric key together with the cipher it belongs to.
///
/// Circle keys are of this type; they are request-scoped and never persisted
/// unwrapped. The key bytes are cleared on drop.
pub struct SymmetricKey {
    algorithm: SymmetricAlgorithm,
    bytes: [u8; KEY_LEN],
}

impl SymmetricKey {
    /// Generate a fresh random key.
    pub fn generate(algorithm: SymmetricAlgorithm) -> CwsResult<Self> {
        Ok(Self {
            algorithm,
            bytes: random_bytes::<KEY_LEN>()?,
        })
    }

    /// Rebuild a key from raw bytes, e.g. after unwrapping.
    ///
    /// A wrong length is reported as `DecryptionFailure` since the bytes
    /// always come out of an unwrap.
    pub fn from_bytes(algorithm: SymmetricAlgorithm, bytes: &[u8]) -> CwsResult<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CwsError::DecryptionFailure)?;
        Ok(Self { algorithm, bytes })
    }

    pub(crate) fn from_array(algorithm: SymmetricAlgorithm, bytes: [u8; KEY_LEN]) -> Self {
        Self { algorithm, bytes }
    }

    pub fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    fn aead_key(&self) -> CwsResult<LessSafeKey> {
        let unbound = UnboundKey::new(self.algorithm.aead(), &self.bytes)
            .map_err(|_| CwsError::internal("building AEAD key", "rejected key length"))?;
        Ok(LessSafeKey::new(unbound))
    }

    /// Encrypt under a freshly generated nonce.
    pub fn seal(&self, aad: &[u8], plaintext: &[u8]) -> CwsResult<Sealed> {
        let nonce = random_bytes::<NONCE_LEN>()?;
        let key = self.aead_key()?;
        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::from(aad),
            &mut in_out,
        )
        .map_err(|_| CwsError::internal("sealing payload", "AEAD seal failed"))?;
        Ok(Sealed {
            nonce,
            ciphertext: in_out,
        })
    }

    /// Decrypt and authenticate. Any failure is a `DecryptionFailure`.
    pub fn open(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> CwsResult<Vec<u8>> {
        let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| CwsError::DecryptionFailure)?;
        let key = self.aead_key()?;
        let mut in_out = ciphertext.to_vec();
        let plaintext_len = key
            .open_in_place(nonce, Aad::from(aad), &mut in_out)
            .map_err(|_| CwsError::DecryptionFailure)?
            .len();
        in_out.truncate(plaintext_len);
        Ok(in_out)
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.fill(0);
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("algorithm", &self.algorithm)
            .field("bytes", &"[redacted]")
            .finish()
    }
}

/// Output of [`SymmetricKey::seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    /// `nonce || ciphertext`, the layout used inside armored blobs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> CwsResult<Self> {
        if bytes.len() <= NONCE_LEN {
            return Err(CwsError::DecryptionFailure);
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| CwsError::DecryptionFailure)?;
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}
