// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated caller representation.

use serde::{Deserialize, Serialize};

use crate::storage::MemberRecord;

/// A member resolved by [`super::MemberService::authenticate`].
///
/// Every engine operation takes one of these. The engine re-reads the member
/// record inside each operation, so a caller whose account was deleted
/// afterwards is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    member_id: String,
    account_name: String,
    system_admin: bool,
}

impl Caller {
    pub(crate) fn from_member(member: &MemberRecord) -> Self {
        Self {
            member_id: member.id.clone(),
            account_name: member.name.clone(),
            system_admin: member.is_admin,
        }
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// The distinguished system administrator account.
    pub fn is_system_admin(&self) -> bool {
        self.system_admin
    }
}
