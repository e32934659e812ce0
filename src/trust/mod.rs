// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Trust & Membership Model
//!
//! Members, circles and the trustee relation between them.
//!
//! ## Authorization
//!
//! Circle operations go through [`authorize`], which compares the trustee's
//! level against the required one (`ADMIN > WRITE > READ`). The system
//! administrator is not exempt from it: without a trustee row there is no
//! wrapped circle key to decrypt with anyway. Administrator-only actions are
//! member management, circle creation, data types, master key rotation and
//! the global sanity scope; circle deletion is open to the administrator or
//! a circle ADMIN.

pub mod caller;
pub mod circles;
pub mod levels;
pub mod members;

pub use caller::Caller;
pub use circles::{CircleView, TrustModel, TrusteeView};
pub use levels::TrustLevel;
pub use members::{MemberService, MemberView};

use tracing::warn;

use crate::error::{CwsError, CwsResult};
use crate::storage::{MemberRecord, Records, StoreRead, TrusteeRecord};

/// The trustee row for `(member, circle)`, or `NotATrustee`.
pub fn resolve_trustee(
    txn: &impl StoreRead,
    member_id: &str,
    circle_id: &str,
) -> CwsResult<TrusteeRecord> {
    txn.trustee(circle_id, member_id)?
        .ok_or_else(|| CwsError::NotATrustee {
            member_id: member_id.to_string(),
            circle_id: circle_id.to_string(),
        })
}

/// The trustee row if its level is at least `required`, else
/// `AuthorizationDenied`. Non-trustees are denied the same way.
pub fn authorize(
    txn: &impl StoreRead,
    member_id: &str,
    circle_id: &str,
    required: TrustLevel,
) -> CwsResult<TrusteeRecord> {
    match txn.trustee(circle_id, member_id)? {
        Some(trustee) if trustee.trust_level.has_privilege(required) => Ok(trustee),
        found => {
            warn!(
                member_id,
                circle_id,
                required = %required,
                held = ?found.map(|t| t.trust_level),
                "Circle access denied"
            );
            Err(CwsError::denied(format!(
                "The Member is not permitted to perform this action; {required} trust is required."
            )))
        }
    }
}

/// The caller's current member record.
pub(crate) fn caller_record(txn: &impl StoreRead, caller: &Caller) -> CwsResult<MemberRecord> {
    txn.member(caller.member_id())?.ok_or_else(|| {
        CwsError::AuthenticationFailure("The Account no longer exists.".into())
    })
}

pub(crate) fn require_system_admin(caller: &Caller, action: &str) -> CwsResult<()> {
    if caller.is_system_admin() {
        Ok(())
    } else {
        warn!(member_id = %caller.member_id(), action, "Administrator action denied");
        Err(CwsError::denied(format!(
            "Only the System Administrator may {action}."
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::TestEngine;

    #[tokio::test]
    async fn resolve_and_authorize_follow_the_trust_ordering() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let bob = engine.member("bob");
        let circle = engine.circle("Alpha", &alice);
        engine.add_trustee(&alice, &circle, &bob, TrustLevel::Write);

        engine
            .state
            .db
            .read(|txn| {
                let trustee = resolve_trustee(txn, bob.member_id(), &circle)?;
                assert_eq!(trustee.trust_level, TrustLevel::Write);

                assert!(authorize(txn, bob.member_id(), &circle, TrustLevel::Read).is_ok());
                assert!(authorize(txn, bob.member_id(), &circle, TrustLevel::Write).is_ok());
                let denied = authorize(txn, bob.member_id(), &circle, TrustLevel::Admin).unwrap_err();
                assert_eq!(denied.kind(), ErrorKind::AuthorizationDenied);

                let missing = resolve_trustee(txn, engine.admin.member_id(), &circle).unwrap_err();
                assert_eq!(missing.kind(), ErrorKind::IdentificationWarning);
                let outsider =
                    authorize(txn, engine.admin.member_id(), &circle, TrustLevel::Read).unwrap_err();
                assert_eq!(outsider.kind(), ErrorKind::AuthorizationDenied);
                Ok::<_, CwsError>(())
            })
            .unwrap();
    }
}
