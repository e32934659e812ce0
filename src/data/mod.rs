// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Data & Metadata Store
//!
//! Each circle owns an arena of metadata nodes keyed by id, with parent-id
//! back references and one implicit root folder. Non-folder nodes may carry
//! one encrypted payload.
//!
//! - `objects` - add, update, delete, read and list
//! - `types` - registered data types

pub mod objects;
pub mod types;

pub use objects::{ObjectContent, ObjectStore, ObjectUpdate};
pub use types::{DataTypeService, DATA_TYPE, FOLDER_TYPE};
