// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Member accounts: bootstrap, authentication, creation and deletion.

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::caller::Caller;
use super::circles::ensure_admin_remains;
use super::{caller_record, require_system_admin};
use crate::audit_log;
use crate::crypto::symmetric::KEY_LEN;
use crate::crypto::{CryptoSuite, MemberPrivateKey};
use crate::error::{CwsError, CwsResult};
use crate::keys::MasterKey;
use crate::state::EngineState;
use crate::storage::{normalize_name, AuditEventType, MemberRecord, Records, WriteTxn};

/// Public view of a member; never carries key material besides the public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberView {
    pub id: String,
    pub name: String,
    pub public_key: String,
    pub is_admin: bool,
    pub created: DateTime<Utc>,
}

impl From<&MemberRecord> for MemberView {
    fn from(record: &MemberRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            public_key: record.public_key.clone(),
            is_admin: record.is_admin,
            created: record.created,
        }
    }
}

const UNKNOWN_ACCOUNT_SALT: &[u8] = b"circle-vault/unknown-account";

/// A well-formed verifier no credential derives to.
fn decoy_verifier() -> String {
    Base64::encode_string(&[0u8; KEY_LEN])
}

/// Unknown accounts pay the same PBKDF2 cost as known ones.
fn check_credential(crypto: &CryptoSuite, member: Option<&MemberRecord>, credential: &str) -> bool {
    match member {
        Some(m) => Base64::decode_vec(&m.salt)
            .map(|salt| crypto.verify_credential(credential, &salt, &m.credential_verifier))
            .unwrap_or(false),
        None => {
            let _ = crypto.verify_credential(credential, UNKNOWN_ACCOUNT_SALT, &decoy_verifier());
            false
        }
    }
}

pub struct MemberService<'a> {
    state: &'a EngineState,
}

impl<'a> MemberService<'a> {
    pub fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Create the system administrator account if it does not exist yet,
    /// then authenticate it.
    pub fn bootstrap(&self, admin_credential: &str) -> CwsResult<Caller> {
        let admin_account = self.state.settings.admin_account.clone();
        let master = self.state.master()?;
        let created = self.state.db.write(|txn| {
            if txn.member_by_name(&admin_account)?.is_some() {
                return Ok(false);
            }
            let record = self.new_member(txn, &master, &admin_account, admin_credential, true)?;
            audit_log!(
                txn,
                AuditEventType::MemberCreated,
                member = record.id.as_str(),
                resource = ("member", record.id.as_str())
            )?;
            Ok::<_, CwsError>(true)
        })?;
        drop(master);

        if created {
            info!(account = %admin_account, "System administrator account created");
        }
        self.authenticate(&admin_account, admin_credential)
    }

    /// Check an account name and credential.
    ///
    /// Unknown accounts and wrong credentials fail identically.
    pub fn authenticate(&self, account_name: &str, credential: &str) -> CwsResult<Caller> {
        let member = self.state.db.read(|txn| txn.member_by_name(account_name))?;
        let verified = check_credential(&self.state.crypto(), member.as_ref(), credential);

        match member {
            Some(member) if verified => Ok(Caller::from_member(&member)),
            _ => {
                warn!(account = %account_name, "Authentication failed");
                Err(CwsError::AuthenticationFailure("Invalid credentials.".into()))
            }
        }
    }

    /// Build, wrap and store a new member inside `txn`.
    fn new_member(
        &self,
        txn: &mut WriteTxn,
        master: &MasterKey,
        name: &str,
        credential: &str,
        is_admin: bool,
    ) -> CwsResult<MemberRecord> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(CwsError::integrity("An Account name is required."));
        }
        if credential.is_empty() {
            return Err(CwsError::integrity("A credential is required."));
        }
        if txn.member_by_name(&name)?.is_some() {
            return Err(CwsError::integrity(format!(
                "An Account with the name '{name}' already exists."
            )));
        }

        let crypto = self.state.crypto();
        let id = uuid::Uuid::new_v4().to_string();
        let salt = crypto.generate_salt()?;
        let private_key = MemberPrivateKey::generate()?;
        let record = MemberRecord {
            public_key: private_key.public_key().to_armored()?,
            private_key: self
                .state
                .keys()
                .wrap_member_private_key(master, &id, &salt, &private_key)?,
            credential_verifier: crypto.credential_verifier(credential, &salt),
            salt: Base64::encode_string(&salt),
            id,
            name,
            is_admin,
            created: Utc::now(),
        };
        txn.put_member(&record)?;
        Ok(record)
    }

    /// Create an ordinary member account. System administrator only.
    pub fn create_member(
        &self,
        caller: &Caller,
        name: &str,
        credential: &str,
    ) -> CwsResult<MemberView> {
        require_system_admin(caller, "create Accounts")?;
        let master = self.state.ensure_ready()?;
        let record = self.state.db.write(|txn| {
            caller_record(txn, caller)?;
            let record = self.new_member(txn, &master, name, credential, false)?;
            audit_log!(
                txn,
                AuditEventType::MemberCreated,
                member = caller.member_id(),
                resource = ("member", record.id.as_str())
            )?;
            Ok::<_, CwsError>(record)
        })?;

        info!(member_id = %record.id, "Member created");
        Ok(MemberView::from(&record))
    }

    /// Delete a member and every trustee relation it holds.
    ///
    /// Allowed for the system administrator or the member itself. Refused if
    /// the member is the last ADMIN of a circle that still holds data.
    pub fn delete_member(&self, caller: &Caller, member_id: &str) -> CwsResult<()> {
        if !caller.is_system_admin() && caller.member_id() != member_id {
            return Err(CwsError::denied("The Member may only delete its own Account."));
        }
        let _master = self.state.ensure_ready()?;

        let removed_trustees = self.state.db.write(|txn| {
            caller_record(txn, caller)?;
            let member = txn
                .member(member_id)?
                .ok_or_else(|| CwsError::not_found("No such Account could be found."))?;
            if member.is_admin {
                return Err(CwsError::illegal(
                    "The System Administrator Account cannot be deleted.",
                ));
            }

            let trustees = txn.member_trustees(member_id)?;
            for trustee in &trustees {
                ensure_admin_remains(txn, &trustee.circle_id, member_id)?;
                txn.remove_trustee(&trustee.circle_id, member_id)?;
            }
            txn.remove_signed_documents(member_id)?;
            txn.remove_member(&member)?;
            audit_log!(
                txn,
                AuditEventType::MemberDeleted,
                member = caller.member_id(),
                resource = ("member", member_id),
                details = serde_json::json!({ "trustees_removed": trustees.len() })
            )?;
            Ok::<_, CwsError>(trustees.len())
        })?;

        info!(member_id, removed_trustees, "Member deleted");
        Ok(())
    }

    pub fn list_members(&self, caller: &Caller) -> CwsResult<Vec<MemberView>> {
        let _master = self.state.ensure_ready()?;
        self.state.db.read(|txn| {
            caller_record(txn, caller)?;
            let mut members: Vec<MemberView> =
                txn.members()?.iter().map(MemberView::from).collect();
            members.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(members)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::TestEngine;
    use crate::trust::TrustLevel;

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let engine = TestEngine::new().await;
        let service = MemberService::new(&engine.state);
        let again = service.bootstrap(TestEngine::ADMIN_CREDENTIAL).unwrap();
        assert_eq!(again, engine.admin);

        let err = service.bootstrap("wrong").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    }

    #[tokio::test]
    async fn authentication_checks_name_and_credential() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let service = MemberService::new(&engine.state);

        let caller = service.authenticate("alice", "alice-credential").unwrap();
        assert_eq!(caller, alice);
        assert!(!caller.is_system_admin());

        for (name, credential) in [("alice", "nope"), ("nobody", "alice-credential")] {
            let err = service.authenticate(name, credential).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
            assert_eq!(err.message(), "Invalid credentials.");
        }
    }

    #[tokio::test]
    async fn unknown_accounts_are_checked_against_a_real_verifier() {
        let engine = TestEngine::new().await;
        let crypto = engine.state.crypto();

        // The decoy must decode, or verification would return before PBKDF2.
        let decoy = decoy_verifier();
        let real = crypto.credential_verifier("anything", UNKNOWN_ACCOUNT_SALT);
        assert_eq!(decoy.len(), real.len());
        assert_eq!(Base64::decode_vec(&decoy).unwrap().len(), KEY_LEN);

        assert!(!check_credential(&crypto, None, "anything"));
        assert!(!check_credential(&crypto, None, ""));
    }

    #[tokio::test]
    async fn members_get_an_unwrappable_key_pair() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let record = engine
            .state
            .db
            .read(|txn| txn.member(alice.member_id()))
            .unwrap()
            .unwrap();

        let master = engine.state.master().unwrap();
        let private_key = engine.state.keys().member_private_key(&master, &record).unwrap();
        assert_eq!(private_key.public_key().to_armored().unwrap(), record.public_key);
        assert!(!record.private_key.contains(&record.public_key));
    }

    #[tokio::test]
    async fn only_the_administrator_creates_members_and_names_are_unique() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let service = MemberService::new(&engine.state);

        let denied = service.create_member(&alice, "bob", "x").unwrap_err();
        assert_eq!(denied.kind(), ErrorKind::AuthorizationDenied);

        let duplicate = service.create_member(&engine.admin, " alice ", "x").unwrap_err();
        assert_eq!(duplicate.kind(), ErrorKind::IntegrityWarning);

        let empty = service.create_member(&engine.admin, "   ", "x").unwrap_err();
        assert_eq!(empty.kind(), ErrorKind::IntegrityWarning);
    }

    #[tokio::test]
    async fn deleting_a_member_cascades_to_its_trustee_rows() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let bob = engine.member("bob");
        let circle = engine.circle("Alpha", &alice);
        engine.add_trustee(&alice, &circle, &bob, TrustLevel::Read);

        MemberService::new(&engine.state)
            .delete_member(&engine.admin, bob.member_id())
            .unwrap();

        let (member, trustees) = engine
            .state
            .db
            .read(|txn| {
                Ok::<_, CwsError>((txn.member(bob.member_id())?, txn.member_trustees(bob.member_id())?))
            })
            .unwrap();
        assert!(member.is_none());
        assert!(trustees.is_empty());

        let err = MemberService::new(&engine.state)
            .authenticate("bob", "bob-credential")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    }

    #[tokio::test]
    async fn the_last_admin_of_a_circle_with_data_cannot_be_deleted() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        engine.add_note(&alice, &circle, "note.txt", b"data");

        let err = MemberService::new(&engine.state)
            .delete_member(&alice, alice.member_id())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);
    }

    #[tokio::test]
    async fn the_administrator_account_is_protected() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let service = MemberService::new(&engine.state);

        let err = service
            .delete_member(&engine.admin, engine.admin.member_id())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);

        let err = service
            .delete_member(&alice, engine.admin.member_id())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
    }

    #[tokio::test]
    async fn list_members_is_sorted_and_deleted_callers_are_rejected() {
        let engine = TestEngine::new().await;
        let bob = engine.member("bob");
        engine.member("alice");
        let service = MemberService::new(&engine.state);

        let names: Vec<String> = service
            .list_members(&bob)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["admin", "alice", "bob"]);

        service.delete_member(&bob, bob.member_id()).unwrap();
        let err = service.list_members(&bob).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    }
}
