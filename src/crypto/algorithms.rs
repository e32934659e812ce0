// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Algorithm identifiers accepted by the configuration surface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CwsError;

/// AEAD cipher used for circle keys, member key wrapping and payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymmetricAlgorithm {
    #[serde(rename = "AES_GCM_256")]
    Aes256Gcm,
    #[serde(rename = "CHACHA20_POLY1305")]
    ChaCha20Poly1305,
}

impl SymmetricAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            SymmetricAlgorithm::Aes256Gcm => "AES_GCM_256",
            SymmetricAlgorithm::ChaCha20Poly1305 => "CHACHA20_POLY1305",
        }
    }

    pub(crate) fn aead(&self) -> &'static ring::aead::Algorithm {
        match self {
            SymmetricAlgorithm::Aes256Gcm => &ring::aead::AES_256_GCM,
            SymmetricAlgorithm::ChaCha20Poly1305 => &ring::aead::CHACHA20_POLY1305,
        }
    }
}

impl FromStr for SymmetricAlgorithm {
    type Err = CwsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AES_GCM_256" | "AES256GCM" => Ok(SymmetricAlgorithm::Aes256Gcm),
            "CHACHA20_POLY1305" | "CHACHA20POLY1305" => Ok(SymmetricAlgorithm::ChaCha20Poly1305),
            other => Err(CwsError::setting(format!(
                "Unsupported symmetric algorithm '{other}'."
            ))),
        }
    }
}

/// Asymmetric scheme used to wrap circle keys for trustees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AsymmetricAlgorithm {
    /// ECIES over secp256k1: ephemeral ECDH, HKDF-SHA256, AEAD.
    #[serde(rename = "SECP256K1_ECIES")]
    Secp256k1Ecies,
}

impl AsymmetricAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            AsymmetricAlgorithm::Secp256k1Ecies => "SECP256K1_ECIES",
        }
    }
}

impl FromStr for AsymmetricAlgorithm {
    type Err = CwsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SECP256K1_ECIES" | "SECP256K1" => Ok(AsymmetricAlgorithm::Secp256k1Ecies),
            other => Err(CwsError::setting(format!(
                "Unsupported asymmetric algorithm '{other}'."
            ))),
        }
    }
}

/// Digest used for checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    #[serde(rename = "SHA256")]
    Sha256,
    #[serde(rename = "SHA512")]
    Sha512,
}

impl DigestAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA256",
            DigestAlgorithm::Sha512 => "SHA512",
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = CwsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "").as_str() {
            "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA512" => Ok(DigestAlgorithm::Sha512),
            other => Err(CwsError::setting(format!(
                "Unsupported digest algorithm '{other}'."
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "ECDSA_SECP256K1_SHA256")]
    EcdsaSecp256k1Sha256,
}

impl SignatureAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::EcdsaSecp256k1Sha256 => "ECDSA_SECP256K1_SHA256",
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = CwsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ECDSA_SECP256K1_SHA256" | "SHA256WITHECDSA" => {
                Ok(SignatureAlgorithm::EcdsaSecp256k1Sha256)
            }
            other => Err(CwsError::setting(format!(
                "Unsupported signature algorithm '{other}'."
            ))),
        }
    }
}

macro_rules! display_by_name {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.name())
                }
            }
        )*
    };
}

display_by_name!(
    SymmetricAlgorithm,
    AsymmetricAlgorithm,
    DigestAlgorithm,
    SignatureAlgorithm
);
