// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Folder and object lifecycle inside a circle.
//!
//! Payloads are sealed under the circle key with a fresh nonce per write and
//! the object id as associated data. The stored checksum covers the
//! ciphertext, so corruption is detected before any decryption is attempted.

use base64ct::{Base64, Encoding};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::types::resolve_type;
use crate::crypto::{CryptoSuite, SymmetricKey};
use crate::error::{CwsError, CwsResult};
use crate::state::EngineState;
use crate::storage::{
    normalize_name, CircleRecord, DataRecord, MetadataRecord, Records, SanityStatus, StoreRead,
};
use crate::trust::caller::Caller;
use crate::trust::{authorize, caller_record, TrustLevel};

const CORRUPTED_DATA: &str =
    "The Encrypted Data Checksum is invalid, the data appears to have been corrupted.";

/// Changes applied by [`ObjectStore::update_object`]; `None` leaves a field
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectUpdate {
    pub name: Option<String>,
    pub parent_id: Option<String>,
    pub bytes: Option<Vec<u8>>,
}

impl ObjectUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn move_to(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Self::default()
        }
    }

    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Some(bytes),
            ..Self::default()
        }
    }
}

/// Metadata and decrypted payload of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectContent {
    pub metadata: MetadataRecord,
    /// `None` for folders and for objects stored without a payload.
    pub bytes: Option<Vec<u8>>,
}

fn load_circle(txn: &impl StoreRead, circle_id: &str) -> CwsResult<CircleRecord> {
    txn.circle(circle_id)?
        .ok_or_else(|| CwsError::not_found("No Circle could be found with the given Id."))
}

fn load_node(txn: &impl StoreRead, id: &str) -> CwsResult<MetadataRecord> {
    txn.metadata(id)?
        .ok_or_else(|| CwsError::not_found("No Object could be found with the given Id."))
}

/// A folder of `circle_id` that may receive children.
fn load_folder(txn: &impl StoreRead, circle_id: &str, folder_id: &str) -> CwsResult<MetadataRecord> {
    let folder = load_node(txn, folder_id)?;
    if folder.circle_id != circle_id {
        return Err(CwsError::illegal(
            "Objects cannot be moved or added across Circles.",
        ));
    }
    if !folder.is_folder() {
        return Err(CwsError::illegal("The parent must be a Folder."));
    }
    Ok(folder)
}

fn validated_name(name: &str) -> CwsResult<String> {
    let name = normalize_name(name);
    if name.is_empty() {
        return Err(CwsError::integrity("An Object name is required."));
    }
    Ok(name)
}

fn ensure_name_free(
    txn: &impl StoreRead,
    circle_id: &str,
    parent_id: &str,
    name: &str,
    except: Option<&str>,
) -> CwsResult<()> {
    match txn.child_named(circle_id, parent_id, name)? {
        Some(existing) if Some(existing.as_str()) != except => Err(CwsError::integrity(format!(
            "Another Object with the name '{name}' already exists in the Folder."
        ))),
        _ => Ok(()),
    }
}

/// Walk up from `target` and refuse if `node_id` is one of its ancestors.
fn ensure_acyclic(txn: &impl StoreRead, node_id: &str, target: &MetadataRecord) -> CwsResult<()> {
    let mut cursor = Some(target.clone());
    while let Some(current) = cursor {
        if current.id == node_id {
            return Err(CwsError::illegal(
                "An Object cannot be moved beneath itself.",
            ));
        }
        cursor = match &current.parent_id {
            Some(parent) => txn.metadata(parent)?,
            None => None,
        };
    }
    Ok(())
}

/// Seal `plaintext` for the node `metadata_id` of `circle`.
pub(crate) fn seal_payload(
    crypto: &CryptoSuite,
    key: &SymmetricKey,
    circle: &CircleRecord,
    metadata_id: &str,
    plaintext: &[u8],
) -> CwsResult<DataRecord> {
    let sealed = key.seal(metadata_id.as_bytes(), plaintext)?;
    Ok(DataRecord {
        metadata_id: metadata_id.to_string(),
        circle_id: circle.id.clone(),
        key_id: circle.key_id.clone(),
        nonce: Base64::encode_string(&sealed.nonce),
        checksum: crypto.checksum(&sealed.ciphertext),
        ciphertext: Base64::encode_string(&sealed.ciphertext),
        sanity_status: SanityStatus::Ok,
        sanity_checked: Some(Utc::now()),
    })
}

/// Whether the stored checksum still matches the stored ciphertext.
pub(crate) fn checksum_matches(crypto: &CryptoSuite, record: &DataRecord) -> bool {
    Base64::decode_vec(&record.ciphertext)
        .map(|ciphertext| crypto.checksum(&ciphertext) == record.checksum)
        .unwrap_or(false)
}

fn open_payload(crypto: &CryptoSuite, key: &SymmetricKey, record: &DataRecord) -> CwsResult<Vec<u8>> {
    let ciphertext = Base64::decode_vec(&record.ciphertext)
        .map_err(|_| CwsError::IntegrityError(CORRUPTED_DATA.into()))?;
    if crypto.checksum(&ciphertext) != record.checksum {
        warn!(metadata_id = %record.metadata_id, "Checksum mismatch on read");
        return Err(CwsError::IntegrityError(CORRUPTED_DATA.into()));
    }
    let nonce = Base64::decode_vec(&record.nonce)
        .map_err(|_| CwsError::IntegrityError(CORRUPTED_DATA.into()))?;
    key.open(&nonce, record.metadata_id.as_bytes(), &ciphertext)
}

/// Data & metadata operations for authenticated callers.
pub struct ObjectStore<'a> {
    state: &'a EngineState,
}

impl<'a> ObjectStore<'a> {
    pub fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Add a folder or object under `parent_id` (the circle root if `None`).
    ///
    /// Requires WRITE. Returns the new metadata id.
    pub fn add_object(
        &self,
        caller: &Caller,
        circle_id: &str,
        parent_id: Option<&str>,
        name: &str,
        type_name: &str,
        bytes: Option<&[u8]>,
    ) -> CwsResult<String> {
        let master = self.state.ensure_ready()?;
        let keys = self.state.keys();
        let crypto = self.state.crypto();

        let id = self.state.db.write(|txn| {
            let member = caller_record(txn, caller)?;
            let circle = load_circle(txn, circle_id)?;
            let trustee = authorize(txn, caller.member_id(), circle_id, TrustLevel::Write)?;

            let parent_id = parent_id.unwrap_or(&circle.root_folder_id);
            load_folder(txn, circle_id, parent_id)?;
            let name = validated_name(name)?;
            let data_type = resolve_type(txn, type_name)?;
            ensure_name_free(txn, circle_id, parent_id, &name, None)?;

            let now = Utc::now();
            let node = MetadataRecord {
                id: uuid::Uuid::new_v4().to_string(),
                circle_id: circle_id.to_string(),
                parent_id: Some(parent_id.to_string()),
                name,
                type_name: data_type.name,
                kind: data_type.kind,
                created: now,
                altered: now,
            };
            if let Some(bytes) = bytes {
                if node.is_folder() {
                    return Err(CwsError::illegal("Folders cannot hold data."));
                }
                let key = keys.circle_key(&master, &member, &trustee, &circle)?;
                txn.put_data(&seal_payload(&crypto, &key, &circle, &node.id, bytes)?)?;
            }
            txn.put_metadata(&node)?;
            Ok::<_, CwsError>(node.id)
        })?;

        info!(circle_id, object_id = %id, "Object added");
        Ok(id)
    }

    /// Rename, move and/or replace the payload of an object.
    ///
    /// Requires WRITE. Folders may be renamed but never moved; nothing moves
    /// across circles.
    pub fn update_object(
        &self,
        caller: &Caller,
        object_id: &str,
        update: ObjectUpdate,
    ) -> CwsResult<MetadataRecord> {
        let master = self.state.ensure_ready()?;
        let keys = self.state.keys();
        let crypto = self.state.crypto();

        let updated = self.state.db.write(|txn| {
            let member = caller_record(txn, caller)?;
            let node = load_node(txn, object_id)?;
            let circle = load_circle(txn, &node.circle_id)?;
            let trustee = authorize(txn, caller.member_id(), &circle.id, TrustLevel::Write)?;
            let Some(current_parent) = node.parent_id.clone() else {
                return Err(CwsError::illegal("The root Folder cannot be altered."));
            };

            let mut updated = node.clone();
            if let Some(target) = update.parent_id.as_deref().filter(|p| *p != current_parent) {
                if node.is_folder() {
                    return Err(CwsError::illegal("Folders cannot be moved."));
                }
                let target = load_folder(txn, &circle.id, target)?;
                ensure_acyclic(txn, &node.id, &target)?;
                updated.parent_id = Some(target.id);
            }
            if let Some(name) = &update.name {
                updated.name = validated_name(name)?;
            }

            let parent = updated.parent_id.as_deref().unwrap_or(&current_parent);
            if parent != current_parent || updated.name != node.name {
                ensure_name_free(txn, &circle.id, parent, &updated.name, Some(&node.id))?;
            }

            if let Some(bytes) = &update.bytes {
                if node.is_folder() {
                    return Err(CwsError::illegal("Folders cannot hold data."));
                }
                let key = keys.circle_key(&master, &member, &trustee, &circle)?;
                txn.put_data(&seal_payload(&crypto, &key, &circle, &node.id, bytes)?)?;
            }

            updated.altered = Utc::now();
            txn.replace_metadata(&node, &updated)?;
            Ok::<_, CwsError>(updated)
        })?;

        info!(object_id, "Object updated");
        Ok(updated)
    }

    /// Delete an object, or a folder without children. Requires WRITE.
    pub fn delete_object(&self, caller: &Caller, object_id: &str) -> CwsResult<()> {
        let _master = self.state.ensure_ready()?;
        self.state.db.write(|txn| {
            caller_record(txn, caller)?;
            let node = load_node(txn, object_id)?;
            authorize(txn, caller.member_id(), &node.circle_id, TrustLevel::Write)?;
            if node.is_root() {
                return Err(CwsError::illegal("The root Folder cannot be deleted."));
            }
            if node.is_folder() && txn.has_children(&node.circle_id, &node.id)? {
                return Err(CwsError::integrity(
                    "The Folder is not empty and cannot be deleted.",
                ));
            }
            txn.remove_data(&node.id)?;
            txn.remove_metadata(&node)?;
            Ok::<_, CwsError>(())
        })?;

        info!(object_id, "Object deleted");
        Ok(())
    }

    /// Metadata and plaintext of a node. Requires READ.
    ///
    /// A payload whose ciphertext no longer matches its checksum fails with
    /// `IntegrityError` and is never decrypted.
    pub fn read_object(&self, caller: &Caller, object_id: &str) -> CwsResult<ObjectContent> {
        let master = self.state.ensure_ready()?;
        let keys = self.state.keys();
        let crypto = self.state.crypto();

        self.state.db.read(|txn| {
            let member = caller_record(txn, caller)?;
            let metadata = load_node(txn, object_id)?;
            let circle = load_circle(txn, &metadata.circle_id)?;
            let trustee = authorize(txn, caller.member_id(), &circle.id, TrustLevel::Read)?;

            let bytes = match txn.data(object_id)? {
                Some(record) => {
                    let key = keys.circle_key(&master, &member, &trustee, &circle)?;
                    Some(open_payload(&crypto, &key, &record)?)
                }
                None => None,
            };
            Ok(ObjectContent { metadata, bytes })
        })
    }

    /// Children of a folder (the circle root if `None`), by name. Requires READ.
    pub fn list_folder(
        &self,
        caller: &Caller,
        circle_id: &str,
        folder_id: Option<&str>,
    ) -> CwsResult<Vec<MetadataRecord>> {
        let _master = self.state.ensure_ready()?;
        self.state.db.read(|txn| {
            caller_record(txn, caller)?;
            let circle = load_circle(txn, circle_id)?;
            authorize(txn, caller.member_id(), circle_id, TrustLevel::Read)?;
            let folder_id = folder_id.unwrap_or(&circle.root_folder_id);
            let folder = load_node(txn, folder_id)?;
            if folder.circle_id != circle_id || !folder.is_folder() {
                return Err(CwsError::not_found(
                    "No Folder could be found with the given Id.",
                ));
            }
            Ok(txn.children(circle_id, folder_id)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{DATA_TYPE, FOLDER_TYPE};
    use crate::error::ErrorKind;
    use crate::testing::TestEngine;
    use crate::trust::TrustModel;

    #[tokio::test]
    async fn alpha_scenario_read_trustee_is_upgraded_to_write() {
        let engine = TestEngine::new().await;
        let m1 = engine.member("m1");
        let m2 = engine.member("m2");
        let circle = engine.circle("Alpha", &m1);
        engine.add_trustee(&m1, &circle, &m2, TrustLevel::Read);
        let store = ObjectStore::new(&engine.state);

        let err = store
            .add_object(&m2, &circle, None, "note.txt", DATA_TYPE, Some(b"data"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);

        TrustModel::new(&engine.state)
            .change_trust_level(&m1, &circle, m2.member_id(), TrustLevel::Write)
            .unwrap();
        let id = store
            .add_object(&m2, &circle, None, "note.txt", DATA_TYPE, Some(b"data"))
            .unwrap();

        let content = store.read_object(&m2, &id).unwrap();
        assert_eq!(content.bytes.as_deref(), Some(&b"data"[..]));
        assert_eq!(content.metadata.name, "note.txt");
    }

    #[tokio::test]
    async fn updates_round_trip_with_a_fresh_nonce() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        let id = engine.add_note(&alice, &circle, "note.txt", b"first");
        let store = ObjectStore::new(&engine.state);
        let before = engine.state.db.read(|txn| txn.data(&id)).unwrap().unwrap();

        store
            .update_object(&alice, &id, ObjectUpdate::bytes(b"second".to_vec()))
            .unwrap();
        let after = engine.state.db.read(|txn| txn.data(&id)).unwrap().unwrap();

        assert_ne!(before.nonce, after.nonce);
        assert_ne!(before.checksum, after.checksum);
        assert_eq!(engine.read_note(&alice, &id), b"second");
    }

    #[tokio::test]
    async fn corrupted_ciphertext_is_an_integrity_error() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        let id = engine.add_note(&alice, &circle, "note.txt", b"precious");
        engine.corrupt(&id);

        let err = ObjectStore::new(&engine.state)
            .read_object(&alice, &id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityError);
        assert_eq!(err.message(), CORRUPTED_DATA);
    }

    #[tokio::test]
    async fn names_are_unique_per_parent() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        let store = ObjectStore::new(&engine.state);
        let docs = store
            .add_object(&alice, &circle, None, "docs", FOLDER_TYPE, None)
            .unwrap();
        let note = engine.add_note(&alice, &circle, "note.txt", b"a");
        store
            .add_object(&alice, &circle, Some(&docs), "note.txt", DATA_TYPE, Some(b"b"))
            .unwrap();

        let err = store
            .add_object(&alice, &circle, None, "note.txt", DATA_TYPE, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityWarning);

        let err = store
            .update_object(&alice, &note, ObjectUpdate::move_to(docs.clone()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityWarning);

        // Renaming to its own name is not a collision.
        store
            .update_object(&alice, &note, ObjectUpdate::rename("note.txt"))
            .unwrap();
        let renamed = store
            .update_object(&alice, &note, ObjectUpdate::rename("other.txt"))
            .unwrap();
        assert_eq!(renamed.name, "other.txt");
        let names: Vec<String> = store
            .list_folder(&alice, &circle, None)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["docs", "other.txt"]);
    }

    #[tokio::test]
    async fn objects_move_between_folders_but_folders_do_not() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        let store = ObjectStore::new(&engine.state);
        let docs = store
            .add_object(&alice, &circle, None, "docs", FOLDER_TYPE, None)
            .unwrap();
        let archive = store
            .add_object(&alice, &circle, None, "archive", FOLDER_TYPE, None)
            .unwrap();
        let note = engine.add_note(&alice, &circle, "note.txt", b"a");

        let moved = store
            .update_object(&alice, &note, ObjectUpdate::move_to(docs.clone()))
            .unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some(docs.as_str()));
        assert_eq!(store.list_folder(&alice, &circle, Some(&docs)).unwrap().len(), 1);
        assert_eq!(engine.read_note(&alice, &note), b"a");

        let err = store
            .update_object(&alice, &archive, ObjectUpdate::move_to(docs.clone()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);

        let err = store
            .update_object(&alice, &note, ObjectUpdate::move_to(note.clone()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);
    }

    #[tokio::test]
    async fn moving_across_circles_is_illegal() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let alpha = engine.circle("Alpha", &alice);
        let beta = engine.circle("Beta", &alice);
        let note = engine.add_note(&alice, &alpha, "note.txt", b"a");
        let beta_root = engine
            .state
            .db
            .read(|txn| txn.circle(&beta))
            .unwrap()
            .unwrap()
            .root_folder_id;

        let err = ObjectStore::new(&engine.state)
            .update_object(&alice, &note, ObjectUpdate::move_to(beta_root))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);
    }

    #[tokio::test]
    async fn non_empty_folders_and_the_root_cannot_be_deleted() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        let store = ObjectStore::new(&engine.state);
        let docs = store
            .add_object(&alice, &circle, None, "docs", FOLDER_TYPE, None)
            .unwrap();
        let inner = store
            .add_object(&alice, &circle, Some(&docs), "a.txt", DATA_TYPE, Some(b"a"))
            .unwrap();

        let err = store.delete_object(&alice, &docs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityWarning);

        store.delete_object(&alice, &inner).unwrap();
        store.delete_object(&alice, &docs).unwrap();
        assert!(engine.state.db.read(|txn| txn.data(&inner)).unwrap().is_none());

        let root = engine
            .state
            .db
            .read(|txn| txn.circle(&circle))
            .unwrap()
            .unwrap()
            .root_folder_id;
        let err = store.delete_object(&alice, &root).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);
    }

    #[tokio::test]
    async fn outsiders_and_readers_are_limited() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let bob = engine.member("bob");
        let carol = engine.member("carol");
        let circle = engine.circle("Alpha", &alice);
        engine.add_trustee(&alice, &circle, &bob, TrustLevel::Read);
        let note = engine.add_note(&alice, &circle, "note.txt", b"a");
        let store = ObjectStore::new(&engine.state);

        assert_eq!(engine.read_note(&bob, &note), b"a");
        let err = store.delete_object(&bob, &note).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);

        let err = store.read_object(&carol, &note).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
        let err = store.list_folder(&carol, &circle, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
        let err = store.read_object(&alice, "missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IdentificationWarning);
    }

    #[tokio::test]
    async fn objects_without_payload_read_back_as_metadata_only() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        let store = ObjectStore::new(&engine.state);
        let id = store
            .add_object(&alice, &circle, None, "empty", DATA_TYPE, None)
            .unwrap();

        let content = store.read_object(&alice, &id).unwrap();
        assert!(content.bytes.is_none());

        let err = store
            .add_object(&alice, &circle, None, "dir", FOLDER_TYPE, Some(b"x"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);
    }
}
