// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Member and circle key wrapping.
//!
//! ```text
//! master key ──HKDF(member salt)──▶ member wrapping key ──AEAD──▶ member private key
//! member public key ──ECIES──▶ circle key (one wrapped copy per trustee)
//! circle key ──AEAD──▶ object payloads
//! ```
//!
//! Wrapped material is armored as PEM. Every unwrap failure, whatever its
//! cause, is reported as `DecryptionFailure`.

use base64ct::{Base64, Encoding};

use super::master::MasterKey;
use crate::crypto::symmetric::Sealed;
use crate::crypto::{kdf, CryptoSuite, MemberPrivateKey, MemberPublicKey, SymmetricAlgorithm, SymmetricKey};
use crate::error::{CwsError, CwsResult};
use crate::storage::{CircleRecord, MemberRecord, TrusteeRecord};

const WRAPPED_PRIVATE_KEY_TAG: &str = "WRAPPED PRIVATE KEY";
const WRAPPED_CIRCLE_KEY_TAG: &str = "WRAPPED CIRCLE KEY";
const MEMBER_KEY_INFO: &[u8] = b"circle-vault/member-key/v1";

fn armor(tag: &str, contents: Vec<u8>) -> String {
    pem::encode(&pem::Pem::new(tag, contents))
}

fn dearmor(tag: &str, armored: &str) -> CwsResult<Vec<u8>> {
    let parsed = pem::parse(armored).map_err(|_| CwsError::DecryptionFailure)?;
    if parsed.tag() != tag {
        return Err(CwsError::DecryptionFailure);
    }
    Ok(parsed.contents().to_vec())
}

/// Decode a base64 member salt.
pub fn decode_salt(salt: &str) -> CwsResult<Vec<u8>> {
    Base64::decode_vec(salt)
        .map_err(|_| CwsError::IntegrityError("The stored member salt is invalid.".into()))
}

/// Stateless wrapping operations over the active [`CryptoSuite`].
#[derive(Debug, Clone, Copy)]
pub struct KeyHierarchy {
    crypto: CryptoSuite,
}

impl KeyHierarchy {
    pub fn new(crypto: CryptoSuite) -> Self {
        Self { crypto }
    }

    fn member_wrapping_key(&self, master: &MasterKey, salt: &[u8]) -> CwsResult<SymmetricKey> {
        let bytes = kdf::expand(master.key().as_bytes(), salt, MEMBER_KEY_INFO)?;
        Ok(SymmetricKey::from_array(master.key().algorithm(), bytes))
    }

    /// Wrap a member private key under the master key and the member salt.
    pub fn wrap_member_private_key(
        &self,
        master: &MasterKey,
        member_id: &str,
        salt: &[u8],
        private_key: &MemberPrivateKey,
    ) -> CwsResult<String> {
        let key = self.member_wrapping_key(master, salt)?;
        let sealed = key.seal(member_id.as_bytes(), &private_key.to_bytes())?;
        Ok(armor(WRAPPED_PRIVATE_KEY_TAG, sealed.to_bytes()))
    }

    pub fn unwrap_member_private_key(
        &self,
        master: &MasterKey,
        member_id: &str,
        salt: &[u8],
        armored: &str,
    ) -> CwsResult<MemberPrivateKey> {
        let sealed = Sealed::from_bytes(&dearmor(WRAPPED_PRIVATE_KEY_TAG, armored)?)?;
        let key = self.member_wrapping_key(master, salt)?;
        let bytes = key.open(&sealed.nonce, member_id.as_bytes(), &sealed.ciphertext)?;
        MemberPrivateKey::from_bytes(&bytes)
    }

    /// Unwrap the private key stored in a member record.
    pub fn member_private_key(
        &self,
        master: &MasterKey,
        member: &MemberRecord,
    ) -> CwsResult<MemberPrivateKey> {
        let salt = decode_salt(&member.salt)?;
        self.unwrap_member_private_key(master, &member.id, &salt, &member.private_key)
    }

    /// A fresh key for a new circle; never shared with another circle.
    pub fn issue_circle_key(&self) -> CwsResult<SymmetricKey> {
        self.crypto.generate_symmetric_key()
    }

    pub fn wrap_circle_key_for_trustee(
        &self,
        circle_key: &SymmetricKey,
        trustee_public_key: &MemberPublicKey,
    ) -> CwsResult<String> {
        let aad = circle_key.algorithm().name().as_bytes();
        let blob = self
            .crypto
            .seal_for(trustee_public_key, aad, circle_key.as_bytes())?;
        Ok(armor(WRAPPED_CIRCLE_KEY_TAG, blob))
    }

    pub fn unwrap_circle_key_for_trustee(
        &self,
        armored: &str,
        trustee_private_key: &MemberPrivateKey,
        algorithm_hint: SymmetricAlgorithm,
    ) -> CwsResult<SymmetricKey> {
        let blob = dearmor(WRAPPED_CIRCLE_KEY_TAG, armored)?;
        let aad = algorithm_hint.name().as_bytes();
        let bytes = self.crypto.open_with(trustee_private_key, aad, &blob)?;
        SymmetricKey::from_bytes(algorithm_hint, &bytes)
    }

    /// Full path from the master key to a circle key for one trustee.
    pub fn circle_key(
        &self,
        master: &MasterKey,
        member: &MemberRecord,
        trustee: &TrusteeRecord,
        circle: &CircleRecord,
    ) -> CwsResult<SymmetricKey> {
        let private_key = self.member_private_key(master, member)?;
        self.unwrap_circle_key_for_trustee(&trustee.circle_key, &private_key, circle.key_algorithm)
    }
}
