// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key derivation: PBKDF2 for human secrets, HKDF for high-entropy inputs.

use std::num::NonZeroU32;

use base64ct::{Base64, Encoding};
use ring::{hkdf, pbkdf2};

use super::symmetric::KEY_LEN;
use crate::error::{CwsError, CwsResult};

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Stretch a secret phrase into a 256-bit key.
pub fn derive_from_secret(secret: &[u8], salt: &[u8], iterations: NonZeroU32) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    pbkdf2::derive(PBKDF2_ALG, iterations, salt, secret, &mut out);
    out
}

/// Base64 PBKDF2 verifier stored for a member credential.
pub fn credential_verifier(credential: &str, salt: &[u8], iterations: NonZeroU32) -> String {
    Base64::encode_string(&derive_from_secret(credential.as_bytes(), salt, iterations))
}

/// Constant-time check of a credential against a stored verifier.
pub fn verify_credential(
    credential: &str,
    salt: &[u8],
    iterations: NonZeroU32,
    verifier: &str,
) -> bool {
    let Ok(expected) = Base64::decode_vec(verifier) else {
        return false;
    };
    pbkdf2::verify(PBKDF2_ALG, iterations, salt, credential.as_bytes(), &expected).is_ok()
}

/// HKDF-SHA256 expansion to a 256-bit key.
pub fn expand(ikm: &[u8], salt: &[u8], info: &[u8]) -> CwsResult<[u8; KEY_LEN]> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(ikm);
    let info = [info];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| CwsError::internal("expanding key", "HKDF output too long"))?;
    let mut out = [0u8; KEY_LEN];
    okm.fill(&mut out)
        .map_err(|_| CwsError::internal("expanding key", "HKDF fill failed"))?;
    Ok(out)
}
