// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transactional Store
//!
//! Persistent engine state in an embedded redb database. The engine only
//! relies on the contracts exposed here: typed records, prefix scans, and
//! all-or-nothing write transactions.
//!
//! ## What is stored where
//!
//! ```text
//! members / member_names        member identity, salt, armored keys
//! circles / circle_names        circle identity and key reference
//! trustees                      member x circle, level, wrapped circle key
//! metadata / metadata_names     folder tree, unique names per parent
//! data                          ciphertext, nonce, checksum, sanity status
//! signatures / signed_documents signature records and the dedup index
//! data_types                    registered object types
//! settings                      master key location
//! audit                         security events
//! ```
//!
//! Plaintext payloads, unwrapped keys and credentials are never stored.

pub mod audit;
pub mod database;
pub mod records;

pub use audit::{audit_events, AuditEvent, AuditEventType};
pub use database::{CwsDatabase, ReadTxn, StoreError, StoreRead, StoreResult, Table, WriteTxn};
pub use records::{
    normalize_name, CircleRecord, DataKind, DataRecord, DataTypeRecord, MemberRecord,
    MetadataRecord, Records, SanityStatus, SignatureRecord, TrusteeRecord,
    MASTERKEY_LOCATION_SETTING,
};
