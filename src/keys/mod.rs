// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Hierarchy Manager
//!
//! - `master` - master key derivation, bootstrap unlock and rotation
//! - `hierarchy` - member private key and circle key wrapping

pub mod hierarchy;
pub mod master;

pub use hierarchy::KeyHierarchy;
pub use master::{MasterKey, MasterKeyOutcome, MasterKeyService, SecretSource};
