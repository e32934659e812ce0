// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Circle Vault - Key-hierarchy and trust-enforcement engine
//!
//! Members are organised into circles. A master key protects every member's
//! private key, each private key protects that member's copy of a circle key,
//! and circle keys protect the stored data.
//!
//! ## Modules
//!
//! - `crypto` - Algorithm-agnostic primitives (ring, k256)
//! - `keys` - Master key lifecycle and key wrapping
//! - `trust` - Members, circles, trustees and authorization
//! - `data` - Folder/object tree and encrypted payloads
//! - `sanity` - Checksum verification and the background sweeper
//! - `signatures` - Document signing and verification
//! - `admin` - Audit trail queries
//! - `storage` - Transactional store (redb) and audit log

pub mod admin;
pub mod config;
pub mod crypto;
pub mod data;
pub mod error;
pub mod keys;
pub mod sanity;
pub mod signatures;
pub mod state;
pub mod storage;
pub mod trust;

#[cfg(test)]
pub(crate) mod testing;
