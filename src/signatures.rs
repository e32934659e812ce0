// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Signature Subsystem
//!
//! Members sign arbitrary payloads with their private key. Only checksums are
//! stored: the payload checksum deduplicates signing per member, and the
//! checksum of the armored signature is the lookup key for verification.
//! Signatures are deterministic, so signing the same payload twice yields the
//! same blob and the same record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit_log;
use crate::crypto::MemberPublicKey;
use crate::error::{CwsError, CwsResult};
use crate::state::EngineState;
use crate::storage::{AuditEventType, Records, SignatureRecord};
use crate::trust::caller::Caller;
use crate::trust::caller_record;

/// Result of [`SignatureService::sign`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOutcome {
    /// Armored signature to hand to verifiers.
    pub signature: String,
    pub record: SignatureRecord,
    /// The payload was already signed by this member and not expired.
    pub duplicate: bool,
}

impl SignOutcome {
    pub fn message(&self) -> &'static str {
        if self.duplicate {
            "This document has already been signed."
        } else {
            "Ok"
        }
    }
}

pub struct SignatureService<'a> {
    state: &'a EngineState,
}

impl<'a> SignatureService<'a> {
    pub fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Sign `payload` with the caller's private key.
    ///
    /// An unexpired record for the same payload and signer is returned as is;
    /// an expired one is replaced.
    pub fn sign(
        &self,
        caller: &Caller,
        payload: &[u8],
        expires: Option<DateTime<Utc>>,
    ) -> CwsResult<SignOutcome> {
        let master = self.state.ensure_ready()?;
        let keys = self.state.keys();
        let crypto = self.state.crypto();

        let outcome = self.state.db.write(|txn| {
            let member = caller_record(txn, caller)?;
            let document_checksum = crypto.checksum(payload);
            let private_key = keys.member_private_key(&master, &member)?;
            let signature = crypto.sign(&private_key, payload);
            let now = Utc::now();

            if let Some(existing) = txn.signed_document(&member.id, &document_checksum)? {
                if !existing.is_expired(now) {
                    return Ok::<_, CwsError>(SignOutcome {
                        signature,
                        record: existing,
                        duplicate: true,
                    });
                }
            }

            let record = SignatureRecord {
                checksum: crypto.checksum(signature.as_bytes()),
                document_checksum,
                member_id: member.id.clone(),
                public_key: member.public_key.clone(),
                created: now,
                expires,
                verifications: 0,
            };
            txn.put_signature(&record)?;
            audit_log!(
                txn,
                AuditEventType::SignatureCreated,
                member = member.id.as_str(),
                resource = ("signature", record.checksum.as_str()),
                details = serde_json::json!({ "expires": expires })
            )?;
            Ok(SignOutcome {
                signature,
                record,
                duplicate: false,
            })
        })?;

        if !outcome.duplicate {
            info!(member_id = %caller.member_id(), "Document signed");
        }
        Ok(outcome)
    }

    /// Verify `payload` against an armored signature.
    ///
    /// Unknown signatures are an `IdentificationWarning` and expired ones a
    /// `SignatureExpired`, regardless of the payload. A successful check
    /// increments the record's verification counter.
    pub fn verify(&self, caller: &Caller, payload: &[u8], signature: &str) -> CwsResult<bool> {
        let _master = self.state.ensure_ready()?;
        let crypto = self.state.crypto();

        let verified = self.state.db.write(|txn| {
            caller_record(txn, caller)?;
            let checksum = crypto.checksum(signature.as_bytes());
            let Some(mut record) = txn.signature(&checksum)? else {
                return Err(CwsError::not_found(
                    "It was not possible to find the Signature.",
                ));
            };
            if record.is_expired(Utc::now()) {
                warn!(signature = %record.checksum, "Expired signature presented");
                return Err(CwsError::SignatureExpired);
            }

            let public_key = MemberPublicKey::from_armored(&record.public_key)?;
            let verified = crypto.verify(&public_key, payload, signature);
            if verified {
                record.verifications += 1;
                txn.put_signature(&record)?;
            }
            Ok(verified)
        })?;

        info!(verified, "Signature verified");
        Ok(verified)
    }

    /// The caller's own signature records, oldest first.
    pub fn list_signatures(&self, caller: &Caller) -> CwsResult<Vec<SignatureRecord>> {
        let _master = self.state.ensure_ready()?;
        self.state.db.read(|txn| {
            caller_record(txn, caller)?;
            Ok(txn.member_signatures(caller.member_id())?)
        })
    }
}
