// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test fixture: an unlocked engine on a temporary database with the
//! administrator bootstrapped.

use std::num::NonZeroU32;

use base64ct::{Base64, Encoding};
use tempfile::TempDir;

use crate::config::{Settings, MIN_PBKDF_ITERATIONS};
use crate::data::{ObjectStore, DATA_TYPE};
use crate::error::CwsError;
use crate::keys::MasterKeyService;
use crate::state::EngineState;
use crate::storage::Records;
use crate::trust::{Caller, MemberService, TrustLevel, TrustModel};

pub(crate) struct TestEngine {
    pub state: EngineState,
    pub admin: Caller,
    _dir: TempDir,
}

impl TestEngine {
    pub const ADMIN_CREDENTIAL: &'static str = "admin-credential";

    /// Settings for a fresh temporary data directory, with cheap PBKDF2.
    pub fn settings(dir: &TempDir) -> Settings {
        let mut settings = Settings::default().with_data_dir(dir.path());
        settings.crypto.pbkdf_iterations =
            NonZeroU32::new(MIN_PBKDF_ITERATIONS).unwrap_or(NonZeroU32::MIN);
        settings
    }

    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = EngineState::open(Self::settings(&dir)).unwrap();

        let master = MasterKeyService::new(&state);
        master.unlock(&master.default_source()).await.unwrap();
        let admin = MemberService::new(&state)
            .bootstrap(Self::ADMIN_CREDENTIAL)
            .unwrap();

        Self {
            state,
            admin,
            _dir: dir,
        }
    }

    /// Create and authenticate a member whose credential is `{name}-credential`.
    pub fn member(&self, name: &str) -> Caller {
        let credential = format!("{name}-credential");
        let service = MemberService::new(&self.state);
        service.create_member(&self.admin, name, &credential).unwrap();
        service.authenticate(name, &credential).unwrap()
    }

    /// A circle created by the administrator with `circle_admin` as ADMIN.
    pub fn circle(&self, name: &str, circle_admin: &Caller) -> String {
        TrustModel::new(&self.state)
            .create_circle(&self.admin, name, Some(circle_admin.member_id()))
            .unwrap()
            .id
    }

    pub fn add_trustee(
        &self,
        requester: &Caller,
        circle_id: &str,
        member: &Caller,
        level: TrustLevel,
    ) {
        TrustModel::new(&self.state)
            .add_trustee(requester, circle_id, member.member_id(), level)
            .unwrap();
    }

    /// A data object under the circle root.
    pub fn add_note(&self, caller: &Caller, circle_id: &str, name: &str, bytes: &[u8]) -> String {
        ObjectStore::new(&self.state)
            .add_object(caller, circle_id, None, name, DATA_TYPE, Some(bytes))
            .unwrap()
    }

    pub fn read_note(&self, caller: &Caller, object_id: &str) -> Vec<u8> {
        ObjectStore::new(&self.state)
            .read_object(caller, object_id)
            .unwrap()
            .bytes
            .unwrap()
    }

    pub fn delete_object(&self, caller: &Caller, object_id: &str) {
        ObjectStore::new(&self.state)
            .delete_object(caller, object_id)
            .unwrap();
    }

    /// Flip one byte of the stored ciphertext, leaving the checksum alone.
    pub fn corrupt(&self, object_id: &str) {
        self.state
            .db
            .write(|txn| {
                let mut record = txn.data(object_id)?.unwrap();
                let mut ciphertext = Base64::decode_vec(&record.ciphertext).unwrap();
                ciphertext[0] ^= 0x01;
                record.ciphertext = Base64::encode_string(&ciphertext);
                txn.put_data(&record)?;
                Ok::<_, CwsError>(())
            })
            .unwrap();
    }
}
