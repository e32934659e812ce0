// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Master key bootstrap and rotation.
//!
//! The master key is derived with PBKDF2 from a secret phrase, taken either
//! literally or fetched from a `file://` or `http(s)://` locator. The unlocked
//! key lives in [`EngineState`] behind a read-write lock: every operation
//! that wraps or unwraps member keys holds the read side for its whole
//! duration, and rotation holds the write side for its whole re-wrap pass.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use super::hierarchy::{decode_salt, KeyHierarchy};
use crate::audit_log;
use crate::config::{parse_locator, Settings};
use crate::crypto::{CryptoSuite, SymmetricKey};
use crate::error::{CwsError, CwsResult};
use crate::state::EngineState;
use crate::storage::{
    AuditEventType, MemberRecord, Records, WriteTxn, MASTERKEY_LOCATION_SETTING,
};
use crate::trust::Caller;

/// An unlocked master key.
pub struct MasterKey {
    key: SymmetricKey,
}

impl MasterKey {
    /// Derive the master key from a secret phrase.
    pub fn derive(crypto: &CryptoSuite, secret: &[u8], system_salt: &str) -> Self {
        let bytes = crypto.derive_from_secret(secret, system_salt.as_bytes());
        Self {
            key: SymmetricKey::from_array(crypto.symmetric, bytes),
        }
    }

    pub(crate) fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Whether both keys came from the same secret.
    pub fn same_as(&self, other: &MasterKey) -> bool {
        ring::constant_time::verify_slices_are_equal(self.key.as_bytes(), other.key.as_bytes())
            .is_ok()
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([redacted])")
    }
}

/// Where the master secret comes from.
#[derive(Clone)]
pub enum SecretSource {
    Phrase(Vec<u8>),
    Locator(Url),
}

impl fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::Phrase(_) => f.write_str("Phrase([redacted])"),
            SecretSource::Locator(url) => write!(f, "Locator({url})"),
        }
    }
}

impl SecretSource {
    pub fn phrase(secret: impl AsRef<[u8]>) -> Self {
        SecretSource::Phrase(secret.as_ref().to_vec())
    }

    pub fn locator(url: &str) -> CwsResult<Self> {
        Ok(SecretSource::Locator(parse_locator(url)?))
    }

    /// Produce the secret bytes, fetching within `timeout` if needed.
    ///
    /// Fetch problems (unreachable, timed out, bad status) are `NetworkError`.
    pub async fn resolve(&self, timeout: Duration) -> CwsResult<Vec<u8>> {
        let secret = match self {
            SecretSource::Phrase(bytes) => bytes.clone(),
            SecretSource::Locator(url) => fetch_secret(url, timeout).await?,
        };
        let trimmed = secret.trim_ascii();
        if trimmed.is_empty() {
            return Err(CwsError::AuthenticationFailure(
                "The MasterKey secret is empty.".into(),
            ));
        }
        Ok(trimmed.to_vec())
    }

    fn location(&self) -> Option<String> {
        match self {
            SecretSource::Phrase(_) => None,
            SecretSource::Locator(url) => Some(url.to_string()),
        }
    }
}

async fn fetch_secret(url: &Url, timeout: Duration) -> CwsResult<Vec<u8>> {
    let unreachable = |reason: String| {
        CwsError::NetworkError(format!("The MasterKey could not be fetched from '{url}': {reason}"))
    };

    match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| unreachable("not a local path".into()))?;
            tokio::time::timeout(timeout, tokio::fs::read(path))
                .await
                .map_err(|_| unreachable("timed out".into()))?
                .map_err(|e| unreachable(e.to_string()))
        }
        "http" | "https" => {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| CwsError::internal("building HTTP client", e))?;
            let response = client
                .get(url.clone())
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| unreachable(e.to_string()))?;
            let body = response
                .bytes()
                .await
                .map_err(|e| unreachable(e.to_string()))?;
            Ok(body.to_vec())
        }
        other => Err(unreachable(format!("unsupported scheme '{other}'"))),
    }
}

/// Record the pinned settings, or refuse settings that differ from the
/// recorded ones while member keys made with them exist.
fn reconcile_pinned_settings(
    txn: &mut WriteTxn,
    settings: &Settings,
    members_exist: bool,
) -> CwsResult<()> {
    for pinned in settings.pinned() {
        match txn.setting(pinned.key)? {
            Some(stored) if stored == pinned.value => {}
            Some(_) if members_exist => {
                warn!(variable = pinned.variable, "Pinned setting differs from the store");
                return Err(CwsError::setting(format!(
                    "{} differs from the value the stored keys were created with; \
                     it cannot be altered once Member Accounts exist.",
                    pinned.variable
                )));
            }
            _ => txn.put_setting(pinned.key, &pinned.value)?,
        }
    }
    Ok(())
}

/// Result of an unlock or rotation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterKeyOutcome {
    /// The presented secret is the active one.
    Unlocked,
    /// Member keys were re-wrapped under a new master key.
    Updated,
}

impl MasterKeyOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            MasterKeyOutcome::Unlocked => "MasterKey unlocked.",
            MasterKeyOutcome::Updated => "MasterKey updated.",
        }
    }
}

/// Unlock and rotate operations on the process-wide master key.
pub struct MasterKeyService<'a> {
    state: &'a EngineState,
}

impl<'a> MasterKeyService<'a> {
    pub fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    fn keys(&self) -> KeyHierarchy {
        self.state.keys()
    }

    /// The configured source: the locator if one is set, otherwise the
    /// administrator account name as phrase.
    pub fn default_source(&self) -> SecretSource {
        match &self.state.settings.masterkey_url {
            Some(url) => SecretSource::Locator(url.clone()),
            None => SecretSource::phrase(self.state.settings.admin_account.as_bytes()),
        }
    }

    async fn derive(&self, source: &SecretSource) -> CwsResult<MasterKey> {
        let secret = source.resolve(self.state.settings.masterkey_timeout).await?;
        Ok(MasterKey::derive(
            &self.state.settings.crypto,
            &secret,
            &self.state.settings.system_salt,
        ))
    }

    /// A candidate key is accepted if it unwraps a stored member key.
    fn check_against_members(&self, candidate: &MasterKey, members: &[MemberRecord]) -> CwsResult<()> {
        let Some(probe) = members
            .iter()
            .find(|m| m.is_admin)
            .or_else(|| members.first())
        else {
            return Ok(());
        };
        self.keys()
            .member_private_key(candidate, probe)
            .map(|_| ())
            .map_err(|_| CwsError::AuthenticationFailure("Invalid MasterKey credentials.".into()))
    }

    /// Bootstrap: make `source` the active master key.
    ///
    /// The configured algorithms, iterations and system salt must match the
    /// ones recorded in the store once members exist (`SettingError`). If
    /// members exist, the key must also unwrap one of their private keys,
    /// otherwise the unlock fails with `AuthenticationFailure`.
    pub async fn unlock(&self, source: &SecretSource) -> CwsResult<MasterKeyOutcome> {
        let candidate = self.derive(source).await?;

        let mut guard = self.state.master_write()?;
        self.state.db.write(|txn| {
            let members = txn.members()?;
            reconcile_pinned_settings(txn, &self.state.settings, !members.is_empty())?;
            self.check_against_members(&candidate, &members)?;
            if let Some(location) = source.location() {
                txn.put_setting(MASTERKEY_LOCATION_SETTING, &location)?;
            }
            audit_log!(
                txn,
                AuditEventType::MasterKeyUnlocked,
                resource = ("masterkey", "system"),
                details = serde_json::json!({ "members": members.len() })
            )?;
            Ok::<_, CwsError>(())
        })?;
        *guard = Some(candidate);

        info!("MasterKey unlocked");
        Ok(MasterKeyOutcome::Unlocked)
    }

    /// Replace the active master key, re-wrapping every member private key.
    ///
    /// Only the system administrator may rotate, and only while no ordinary
    /// member exists. The re-wrap is a single transaction: on any failure the
    /// previous master key stays active and all stored keys stay untouched.
    pub async fn rotate(&self, caller: &Caller, source: &SecretSource) -> CwsResult<MasterKeyOutcome> {
        if !caller.is_system_admin() {
            warn!(member_id = %caller.member_id(), "MasterKey rotation denied");
            return Err(CwsError::denied(
                "Given Account is not permitted to alter the MasterKey.",
            ));
        }
        let candidate = self.derive(source).await?;

        let mut guard = self.state.master_write()?;
        let current = guard.as_ref().ok_or_else(|| {
            CwsError::illegal("The MasterKey must be unlocked before it can be rotated.")
        })?;
        if current.same_as(&candidate) {
            return Ok(MasterKeyOutcome::Unlocked);
        }

        let keys = self.keys();
        let rewrapped = self.state.db.write(|txn| {
            let members = txn.members()?;
            if members.iter().any(|m| !m.is_admin) {
                return Err(CwsError::illegal(
                    "Cannot alter the MasterKey, as Member Accounts exists.",
                ));
            }
            for member in &members {
                let salt = decode_salt(&member.salt)?;
                let private_key = keys.member_private_key(current, member)?;
                let mut updated = member.clone();
                updated.private_key =
                    keys.wrap_member_private_key(&candidate, &member.id, &salt, &private_key)?;
                txn.put_member(&updated)?;
            }
            if let Some(location) = source.location() {
                txn.put_setting(MASTERKEY_LOCATION_SETTING, &location)?;
            }
            audit_log!(
                txn,
                AuditEventType::MasterKeyRotated,
                member = caller.member_id(),
                resource = ("masterkey", "system"),
                details = serde_json::json!({ "rewrapped": members.len() })
            )?;
            Ok(members.len())
        })?;
        *guard = Some(candidate);

        info!(rewrapped, "MasterKey rotated");
        Ok(MasterKeyOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::mpsc;
    use std::time::Instant;

    use crate::config::{DIGEST_ALGORITHM_ENV, SYMMETRIC_ALGORITHM_ENV};
    use crate::crypto::{DigestAlgorithm, SymmetricAlgorithm};
    use crate::storage::{Records, StoreError};
    use crate::testing::TestEngine;
    use crate::trust::MemberService;

    /// A data directory holding an unlocked, bootstrapped store with one
    /// ordinary member, closed again.
    async fn seeded_store() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let state = EngineState::open(TestEngine::settings(&dir)).unwrap();
        let service = MasterKeyService::new(&state);
        service.unlock(&service.default_source()).await.unwrap();
        let members = MemberService::new(&state);
        let admin = members.bootstrap(TestEngine::ADMIN_CREDENTIAL).unwrap();
        members.create_member(&admin, "alice", "alice-credential").unwrap();
        dir
    }

    #[tokio::test]
    async fn phrase_sources_are_trimmed_and_must_not_be_empty() {
        let source = SecretSource::phrase("  secret\n");
        assert_eq!(source.resolve(Duration::from_secs(1)).await.unwrap(), b"secret");

        let err = SecretSource::phrase(" \n").resolve(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    }

    #[tokio::test]
    async fn file_locators_are_read_and_missing_files_are_network_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.key");
        std::fs::write(&path, "file secret\n").unwrap();

        let url = Url::from_file_path(&path).unwrap();
        let source = SecretSource::locator(url.as_str()).unwrap();
        assert_eq!(source.resolve(Duration::from_secs(1)).await.unwrap(), b"file secret");

        let missing = Url::from_file_path(dir.path().join("absent.key")).unwrap();
        let err = SecretSource::Locator(missing)
            .resolve(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn unreachable_http_locator_is_a_network_error() {
        let source = SecretSource::locator("http://127.0.0.1:1/master.key").unwrap();
        let err = source.resolve(Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn unlock_rejects_a_key_that_cannot_open_existing_members() {
        let engine = TestEngine::new().await;
        let service = MasterKeyService::new(&engine.state);

        let err = service
            .unlock(&SecretSource::phrase("wrong secret"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);

        let outcome = service.unlock(&service.default_source()).await.unwrap();
        assert_eq!(outcome, MasterKeyOutcome::Unlocked);
    }

    #[tokio::test]
    async fn rotation_with_only_admins_rewraps_and_keeps_keys_usable() {
        let engine = TestEngine::new().await;
        let service = MasterKeyService::new(&engine.state);

        let outcome = service
            .rotate(&engine.admin, &SecretSource::phrase("new secret"))
            .await
            .unwrap();
        assert_eq!(outcome, MasterKeyOutcome::Updated);
        assert_eq!(outcome.message(), "MasterKey updated.");

        let admin = engine
            .state
            .db
            .read(|txn| txn.member(engine.admin.member_id()))
            .unwrap()
            .unwrap();
        let master = engine.state.master().unwrap();
        assert!(engine.state.keys().member_private_key(&master, &admin).is_ok());
        drop(master);

        let again = service
            .rotate(&engine.admin, &SecretSource::phrase("new secret"))
            .await
            .unwrap();
        assert_eq!(again, MasterKeyOutcome::Unlocked);
    }

    #[tokio::test]
    async fn rotation_is_blocked_once_an_ordinary_member_exists() {
        let engine = TestEngine::new().await;
        engine.member("alice");
        let service = MasterKeyService::new(&engine.state);

        let err = service
            .rotate(&engine.admin, &SecretSource::phrase("new secret"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);
        assert_eq!(err.message(), "Cannot alter the MasterKey, as Member Accounts exists.");
    }

    #[tokio::test]
    async fn only_the_system_administrator_may_rotate() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let err = MasterKeyService::new(&engine.state)
            .rotate(&alice, &SecretSource::phrase("x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
    }

    #[tokio::test]
    async fn failed_rotation_leaves_the_previous_master_key_active() {
        let engine = TestEngine::new().await;

        // A second administrator whose stored key cannot be unwrapped makes
        // the re-wrap pass fail after the first member has been rewritten.
        engine
            .state
            .db
            .write(|txn| {
                let mut broken = txn.member(engine.admin.member_id())?.unwrap();
                broken.id = "zz-broken-admin".into();
                broken.name = "broken".into();
                txn.put_member(&broken)?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let err = MasterKeyService::new(&engine.state)
            .rotate(&engine.admin, &SecretSource::phrase("new secret"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecryptionFailure);

        let admin = engine
            .state
            .db
            .read(|txn| txn.member(engine.admin.member_id()))
            .unwrap()
            .unwrap();
        let master = engine.state.master().unwrap();
        assert!(engine.state.keys().member_private_key(&master, &admin).is_ok());
    }

    #[tokio::test]
    async fn changed_crypto_settings_are_refused_once_members_exist() {
        let dir = seeded_store().await;

        let mut settings = TestEngine::settings(&dir);
        settings.crypto.digest = DigestAlgorithm::Sha256;
        let state = EngineState::open(settings).unwrap();
        let service = MasterKeyService::new(&state);
        let err = service.unlock(&service.default_source()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SettingError);
        assert!(err.message().contains(DIGEST_ALGORITHM_ENV));
        assert!(!state.is_unlocked());
        drop(state);

        // A different cipher would derive a different master key; the
        // configuration error is reported before the key is tried.
        let mut settings = TestEngine::settings(&dir);
        settings.crypto.symmetric = SymmetricAlgorithm::ChaCha20Poly1305;
        let state = EngineState::open(settings).unwrap();
        let service = MasterKeyService::new(&state);
        let err = service.unlock(&service.default_source()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SettingError);
        assert!(err.message().contains(SYMMETRIC_ALGORITHM_ENV));
        drop(state);

        let state = EngineState::open(TestEngine::settings(&dir)).unwrap();
        let service = MasterKeyService::new(&state);
        let outcome = service.unlock(&service.default_source()).await.unwrap();
        assert_eq!(outcome, MasterKeyOutcome::Unlocked);
        MemberService::new(&state)
            .authenticate("alice", "alice-credential")
            .unwrap();
    }

    #[tokio::test]
    async fn an_empty_store_records_whatever_settings_it_is_unlocked_with() {
        let dir = tempfile::tempdir().unwrap();
        {
            let state = EngineState::open(TestEngine::settings(&dir)).unwrap();
            let service = MasterKeyService::new(&state);
            service.unlock(&service.default_source()).await.unwrap();
        }

        let mut settings = TestEngine::settings(&dir);
        settings.crypto.digest = DigestAlgorithm::Sha256;
        let state = EngineState::open(settings).unwrap();
        let service = MasterKeyService::new(&state);
        service.unlock(&service.default_source()).await.unwrap();

        let stored = state.db.read(|txn| txn.setting("crypto.digest")).unwrap();
        assert_eq!(stored.as_deref(), Some("SHA256"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rotation_waits_for_outstanding_master_key_readers() {
        let engine = TestEngine::new().await;
        let admin = engine
            .state
            .db
            .read(|txn| txn.member(engine.admin.member_id()))
            .unwrap()
            .unwrap();

        let (held_tx, held_rx) = mpsc::channel();
        let reader_state = engine.state.clone();
        let reader = std::thread::spawn(move || {
            let master = reader_state.master().unwrap();
            held_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(200));
            // Still the old key: rotation cannot have swapped it underneath.
            let unwrapped = reader_state.keys().member_private_key(&master, &admin).is_ok();
            let released = Instant::now();
            drop(master);
            (unwrapped, released)
        });

        held_rx.recv().unwrap();
        MasterKeyService::new(&engine.state)
            .rotate(&engine.admin, &SecretSource::phrase("new secret"))
            .await
            .unwrap();
        let rotated = Instant::now();

        let (unwrapped, released) = reader.join().unwrap();
        assert!(unwrapped);
        assert!(rotated >= released);
    }
}
