// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Checksums over ciphertext, payloads and signature blobs.

use base64ct::{Base64, Encoding};
use sha2::{Digest, Sha256, Sha512};

use super::algorithms::DigestAlgorithm;

/// Armored (base64) digest of `bytes`.
pub fn checksum(algorithm: DigestAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        DigestAlgorithm::Sha256 => Base64::encode_string(&Sha256::digest(bytes)),
        DigestAlgorithm::Sha512 => Base64::encode_string(&Sha512::digest(bytes)),
    }
}
