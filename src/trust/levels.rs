// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Trust levels for circle authorization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Trust level of a trustee within one circle.
///
/// ## Hierarchy
///
/// - `Admin` - manage trustees, delete the circle, plus everything below
/// - `Write` - add, update and delete objects, plus everything below
/// - `Read` - read objects and list the folder tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrustLevel {
    Read,
    Write,
    Admin,
}

impl TrustLevel {
    /// Check if this level grants at least the privileges of `required`.
    pub fn has_privilege(&self, required: TrustLevel) -> bool {
        *self >= required
    }

    /// Parse a trust level (case-insensitive).
    pub fn parse(s: &str) -> Option<TrustLevel> {
        match s.trim().to_lowercase().as_str() {
            "read" => Some(TrustLevel::Read),
            "write" => Some(TrustLevel::Write),
            "admin" => Some(TrustLevel::Admin),
            _ => None,
        }
    }
}

impl Default for TrustLevel {
    /// Least privilege.
    fn default() -> Self {
        TrustLevel::Read
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustLevel::Read => write!(f, "READ"),
            TrustLevel::Write => write!(f, "WRITE"),
            TrustLevel::Admin => write!(f, "ADMIN"),
        }
    }
}
