// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! secp256k1 member key pairs and ECIES key wrapping.
//!
//! ## Wrapped blob layout
//!
//! ```text
//! ephemeral public key (33 bytes, SEC1 compressed) | nonce (12) | AEAD ciphertext
//! ```
//!
//! The AEAD key is HKDF-SHA256 over the ECDH shared secret, salted with both
//! public keys.

use std::fmt;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use k256::{PublicKey, SecretKey};

use super::algorithms::SymmetricAlgorithm;
use super::kdf;
use super::random_bytes;
use super::symmetric::{Sealed, SymmetricKey};
use crate::error::{CwsError, CwsResult};

const COMPRESSED_POINT_LEN: usize = 33;
const ECIES_INFO: &[u8] = b"circle-vault/ecies/v1";

/// A member's private key. Only ever held unwrapped for one request.
pub struct MemberPrivateKey {
    secret: SecretKey,
}

impl MemberPrivateKey {
    pub fn generate() -> CwsResult<Self> {
        // A uniformly random 32-byte string is a valid scalar with
        // overwhelming probability; retry the rare zero/overflow case.
        for _ in 0..8 {
            let bytes = random_bytes::<32>()?;
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return Ok(Self { secret });
            }
        }
        Err(CwsError::internal(
            "generating member key",
            "no valid secp256k1 scalar produced",
        ))
    }

    /// Parse raw scalar bytes coming out of an unwrap.
    pub fn from_bytes(bytes: &[u8]) -> CwsResult<Self> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| CwsError::DecryptionFailure)?;
        Ok(Self { secret })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.secret.to_bytes().to_vec()
    }

    pub fn public_key(&self) -> MemberPublicKey {
        MemberPublicKey {
            key: self.secret.public_key(),
        }
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl fmt::Debug for MemberPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MemberPrivateKey([redacted])")
    }
}

/// A member's public key, armored as SPKI PEM when stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPublicKey {
    key: PublicKey,
}

impl MemberPublicKey {
    pub fn to_armored(&self) -> CwsResult<String> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CwsError::internal("armoring public key", e.to_string()))
    }

    pub fn from_armored(armored: &str) -> CwsResult<Self> {
        let key = PublicKey::from_public_key_pem(armored)
            .map_err(|_| CwsError::IntegrityError("The stored public key is invalid.".into()))?;
        Ok(Self { key })
    }

    pub(crate) fn inner(&self) -> &PublicKey {
        &self.key
    }

    fn compressed(&self) -> Vec<u8> {
        self.key.to_encoded_point(true).as_bytes().to_vec()
    }
}

fn ecies_key(
    algorithm: SymmetricAlgorithm,
    shared_secret: &[u8],
    ephemeral: &[u8],
    recipient: &[u8],
) -> CwsResult<SymmetricKey> {
    let mut salt = Vec::with_capacity(ephemeral.len() + recipient.len());
    salt.extend_from_slice(ephemeral);
    salt.extend_from_slice(recipient);
    let bytes = kdf::expand(shared_secret, &salt, ECIES_INFO)?;
    Ok(SymmetricKey::from_array(algorithm, bytes))
}

/// Encrypt `plaintext` so that only the holder of `recipient`'s private key
/// can read it.
pub fn ecies_seal(
    recipient: &MemberPublicKey,
    algorithm: SymmetricAlgorithm,
    aad: &[u8],
    plaintext: &[u8],
) -> CwsResult<Vec<u8>> {
    let ephemeral = MemberPrivateKey::generate()?;
    let ephemeral_public = ephemeral.public_key().compressed();
    let shared = k256::ecdh::diffie_hellman(
        ephemeral.secret().to_nonzero_scalar(),
        recipient.inner().as_affine(),
    );
    let key = ecies_key(
        algorithm,
        shared.raw_secret_bytes().as_slice(),
        &ephemeral_public,
        &recipient.compressed(),
    )?;
    let sealed = key.seal(aad, plaintext)?;

    let mut blob = ephemeral_public;
    blob.extend_from_slice(&sealed.to_bytes());
    Ok(blob)
}

/// Reverse of [`ecies_seal`]. Malformed blobs and wrong keys both yield
/// `DecryptionFailure`.
pub fn ecies_open(
    private: &MemberPrivateKey,
    algorithm: SymmetricAlgorithm,
    aad: &[u8],
    blob: &[u8],
) -> CwsResult<Vec<u8>> {
    if blob.len() <= COMPRESSED_POINT_LEN {
        return Err(CwsError::DecryptionFailure);
    }
    let (ephemeral_bytes, rest) = blob.split_at(COMPRESSED_POINT_LEN);
    let ephemeral =
        PublicKey::from_sec1_bytes(ephemeral_bytes).map_err(|_| CwsError::DecryptionFailure)?;
    let shared =
        k256::ecdh::diffie_hellman(private.secret().to_nonzero_scalar(), ephemeral.as_affine());
    let key = ecies_key(
        algorithm,
        shared.raw_secret_bytes().as_slice(),
        ephemeral_bytes,
        &private.public_key().compressed(),
    )?;
    let sealed = Sealed::from_bytes(rest)?;
    key.open(&sealed.nonce, aad, &sealed.ciphertext)
}
