// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ECDSA over secp256k1. Signing is deterministic (RFC 6979), so the same key
//! and payload always produce the same signature blob.

use base64ct::{Base64, Encoding};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};

use super::asymmetric::{MemberPrivateKey, MemberPublicKey};

/// Sign `payload`, returning the base64 DER signature.
pub fn sign(private: &MemberPrivateKey, payload: &[u8]) -> String {
    let signing_key = SigningKey::from(private.secret());
    let signature: Signature = signing_key.sign(payload);
    Base64::encode_string(signature.to_der().as_bytes())
}

/// `true` iff `armored_signature` is a valid signature of `payload`.
pub fn verify(public: &MemberPublicKey, payload: &[u8], armored_signature: &str) -> bool {
    let Ok(der) = Base64::decode_vec(armored_signature.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(&der) else {
        return false;
    };
    VerifyingKey::from(public.inner())
        .verify(payload, &signature)
        .is_ok()
}
