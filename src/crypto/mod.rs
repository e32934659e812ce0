// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Crypto Primitives Adapter
//!
//! Algorithm-agnostic wrappers over `ring`, `k256` and `sha2`. Nothing in
//! this module implements a primitive; it only composes library calls.
//!
//! | Concern | Library |
//! |---------|---------|
//! | AEAD (AES-256-GCM / ChaCha20-Poly1305) | `ring::aead` |
//! | PBKDF2 / HKDF | `ring::pbkdf2`, `ring::hkdf` |
//! | Randomness | `ring::rand::SystemRandom` |
//! | Key pairs, ECDH, ECDSA | `k256` |
//! | Checksums | `sha2` |

pub mod algorithms;
pub mod asymmetric;
pub mod digest;
pub mod kdf;
pub mod signing;
pub mod symmetric;

use std::num::NonZeroU32;

use ring::rand::{SecureRandom, SystemRandom};

pub use algorithms::{AsymmetricAlgorithm, DigestAlgorithm, SignatureAlgorithm, SymmetricAlgorithm};
pub use asymmetric::{MemberPrivateKey, MemberPublicKey};
pub use symmetric::{Sealed, SymmetricKey};

use crate::error::{CwsError, CwsResult};

/// Fill a fixed-size array from the system RNG.
pub fn random_bytes<const N: usize>() -> CwsResult<[u8; N]> {
    let mut out = [0u8; N];
    SystemRandom::new()
        .fill(&mut out)
        .map_err(|_| CwsError::internal("reading system randomness", "RNG unavailable"))?;
    Ok(out)
}

/// The active algorithm selection, built once from [`crate::config::Settings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoSuite {
    pub symmetric: SymmetricAlgorithm,
    pub asymmetric: AsymmetricAlgorithm,
    pub digest: DigestAlgorithm,
    pub signature: SignatureAlgorithm,
    pub pbkdf_iterations: NonZeroU32,
}

impl CryptoSuite {
    pub fn checksum(&self, bytes: &[u8]) -> String {
        digest::checksum(self.digest, bytes)
    }

    pub fn generate_symmetric_key(&self) -> CwsResult<SymmetricKey> {
        SymmetricKey::generate(self.symmetric)
    }

    pub fn generate_salt(&self) -> CwsResult<[u8; 16]> {
        random_bytes::<16>()
    }

    pub fn derive_from_secret(&self, secret: &[u8], salt: &[u8]) -> [u8; symmetric::KEY_LEN] {
        kdf::derive_from_secret(secret, salt, self.pbkdf_iterations)
    }

    pub fn credential_verifier(&self, credential: &str, salt: &[u8]) -> String {
        kdf::credential_verifier(credential, salt, self.pbkdf_iterations)
    }

    pub fn verify_credential(&self, credential: &str, salt: &[u8], verifier: &str) -> bool {
        kdf::verify_credential(credential, salt, self.pbkdf_iterations, verifier)
    }

    /// Asymmetric encryption to a member public key.
    pub fn seal_for(
        &self,
        recipient: &MemberPublicKey,
        aad: &[u8],
        plaintext: &[u8],
    ) -> CwsResult<Vec<u8>> {
        match self.asymmetric {
            AsymmetricAlgorithm::Secp256k1Ecies => {
                asymmetric::ecies_seal(recipient, self.symmetric, aad, plaintext)
            }
        }
    }

    pub fn open_with(
        &self,
        private: &MemberPrivateKey,
        aad: &[u8],
        blob: &[u8],
    ) -> CwsResult<Vec<u8>> {
        match self.asymmetric {
            AsymmetricAlgorithm::Secp256k1Ecies => {
                asymmetric::ecies_open(private, self.symmetric, aad, blob)
            }
        }
    }

    pub fn sign(&self, private: &MemberPrivateKey, payload: &[u8]) -> String {
        match self.signature {
            SignatureAlgorithm::EcdsaSecp256k1Sha256 => signing::sign(private, payload),
        }
    }

    pub fn verify(&self, public: &MemberPublicKey, payload: &[u8], signature: &str) -> bool {
        match self.signature {
            SignatureAlgorithm::EcdsaSecp256k1Sha256 => signing::verify(public, payload, signature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite() -> CryptoSuite {
        CryptoSuite {
            symmetric: SymmetricAlgorithm::Aes256Gcm,
            asymmetric: AsymmetricAlgorithm::Secp256k1Ecies,
            digest: DigestAlgorithm::Sha256,
            signature: SignatureAlgorithm::EcdsaSecp256k1Sha256,
            pbkdf_iterations: NonZeroU32::new(1_000).unwrap(),
        }
    }

    #[test]
    fn random_bytes_are_not_constant() {
        let a = random_bytes::<32>().unwrap();
        let b = random_bytes::<32>().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn suite_dispatches_to_the_configured_primitives() {
        let suite = suite();
        let key = MemberPrivateKey::generate().unwrap();
        let blob = suite.seal_for(&key.public_key(), b"aad", b"data").unwrap();
        assert_eq!(suite.open_with(&key, b"aad", &blob).unwrap(), b"data");

        let signature = suite.sign(&key, b"doc");
        assert!(suite.verify(&key.public_key(), b"doc", &signature));
        assert_eq!(suite.checksum(b"x"), digest::checksum(DigestAlgorithm::Sha256, b"x"));
    }
}
