// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted records and typed accessors over the engine tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::database::{StoreRead, StoreResult, Table, WriteTxn};
use crate::crypto::SymmetricAlgorithm;
use crate::trust::TrustLevel;

/// Setting key under which the last used master key locator is kept.
pub const MASTERKEY_LOCATION_SETTING: &str = "masterkey.location";

/// Trimmed, NFC-normalised form used for every unique name.
pub fn normalize_name(name: &str) -> String {
    name.trim().nfc().collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRecord {
    pub id: String,
    pub name: String,
    /// Base64 salt, used for both the credential verifier and key wrapping.
    pub salt: String,
    pub credential_verifier: String,
    pub public_key: String,
    /// Private key wrapped under the master key.
    pub private_key: String,
    pub is_admin: bool,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CircleRecord {
    pub id: String,
    pub name: String,
    pub root_folder_id: String,
    /// Identifies the circle key; referenced by every payload it encrypts.
    pub key_id: String,
    pub key_algorithm: SymmetricAlgorithm,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrusteeRecord {
    pub circle_id: String,
    pub member_id: String,
    pub trust_level: TrustLevel,
    /// The circle key wrapped for this member's public key.
    pub circle_key: String,
    pub created: DateTime<Utc>,
    pub altered: DateTime<Utc>,
}

/// Whether a data type describes a folder or a payload-carrying object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataKind {
    Folder,
    Data,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataTypeRecord {
    pub name: String,
    pub kind: DataKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataRecord {
    pub id: String,
    pub circle_id: String,
    /// `None` only for the circle's root folder.
    pub parent_id: Option<String>,
    pub name: String,
    pub type_name: String,
    pub kind: DataKind,
    pub created: DateTime<Utc>,
    pub altered: DateTime<Utc>,
}

impl MetadataRecord {
    pub fn is_folder(&self) -> bool {
        self.kind == DataKind::Folder
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SanityStatus {
    Ok,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataRecord {
    pub metadata_id: String,
    pub circle_id: String,
    pub key_id: String,
    /// Base64 AEAD nonce, fresh for every encryption.
    pub nonce: String,
    /// Base64 ciphertext including the AEAD tag.
    pub ciphertext: String,
    /// Checksum of the decoded ciphertext bytes.
    pub checksum: String,
    pub sanity_status: SanityStatus,
    pub sanity_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Checksum of the armored signature blob; the lookup key for verify.
    pub checksum: String,
    /// Checksum of the signed payload; the dedup key for sign.
    pub document_checksum: String,
    pub member_id: String,
    pub public_key: String,
    pub created: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
    pub verifications: u64,
}

impl SignatureRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }
}

fn trustee_key(circle_id: &str, member_id: &str) -> String {
    format!("{circle_id}|{member_id}")
}

/// `{owner}|{id}` key of the secondary indexes.
fn index_key(owner: &str, id: &str) -> String {
    format!("{owner}|{id}")
}

fn index_prefix(owner: &str) -> String {
    format!("{owner}|")
}

fn children_prefix(circle_id: &str, parent_id: &str) -> String {
    format!("{circle_id}|{parent_id}|")
}

fn child_key(circle_id: &str, parent_id: &str, name: &str) -> String {
    format!("{circle_id}|{parent_id}|{name}")
}

fn signed_document_key(member_id: &str, document_checksum: &str) -> String {
    format!("{member_id}|{document_checksum}")
}

/// Typed lookups, available on both read and write transactions.
pub trait Records: StoreRead {
    fn member(&self, id: &str) -> StoreResult<Option<MemberRecord>> {
        self.get(Table::Members, id)
    }

    fn member_by_name(&self, name: &str) -> StoreResult<Option<MemberRecord>> {
        match self.get::<String>(Table::MemberNames, &normalize_name(name))? {
            Some(id) => self.member(&id),
            None => Ok(None),
        }
    }

    fn members(&self) -> StoreResult<Vec<MemberRecord>> {
        self.scan(Table::Members, "")
    }

    fn circle(&self, id: &str) -> StoreResult<Option<CircleRecord>> {
        self.get(Table::Circles, id)
    }

    fn circle_name_taken(&self, name: &str) -> StoreResult<bool> {
        self.contains(Table::CircleNames, &normalize_name(name))
    }

    fn circles(&self) -> StoreResult<Vec<CircleRecord>> {
        self.scan(Table::Circles, "")
    }

    fn trustee(&self, circle_id: &str, member_id: &str) -> StoreResult<Option<TrusteeRecord>> {
        self.get(Table::Trustees, &trustee_key(circle_id, member_id))
    }

    fn circle_trustees(&self, circle_id: &str) -> StoreResult<Vec<TrusteeRecord>> {
        self.scan(Table::Trustees, &format!("{circle_id}|"))
    }

    fn member_trustees(&self, member_id: &str) -> StoreResult<Vec<TrusteeRecord>> {
        let circle_ids: Vec<String> = self.scan(Table::MemberCircles, &index_prefix(member_id))?;
        let mut out = Vec::with_capacity(circle_ids.len());
        for circle_id in circle_ids {
            if let Some(trustee) = self.trustee(&circle_id, member_id)? {
                out.push(trustee);
            }
        }
        Ok(out)
    }

    fn metadata(&self, id: &str) -> StoreResult<Option<MetadataRecord>> {
        self.get(Table::Metadata, id)
    }

    fn child_named(
        &self,
        circle_id: &str,
        parent_id: &str,
        name: &str,
    ) -> StoreResult<Option<String>> {
        self.get(Table::MetadataNames, &child_key(circle_id, parent_id, name))
    }

    fn children(&self, circle_id: &str, parent_id: &str) -> StoreResult<Vec<MetadataRecord>> {
        let ids: Vec<String> =
            self.scan(Table::MetadataNames, &children_prefix(circle_id, parent_id))?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.metadata(&id)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn has_children(&self, circle_id: &str, parent_id: &str) -> StoreResult<bool> {
        Ok(!self
            .scan_keys(Table::MetadataNames, &children_prefix(circle_id, parent_id))?
            .is_empty())
    }

    fn circle_metadata(&self, circle_id: &str) -> StoreResult<Vec<MetadataRecord>> {
        let ids: Vec<String> = self.scan(Table::CircleMetadata, &index_prefix(circle_id))?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.metadata(&id)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn data(&self, metadata_id: &str) -> StoreResult<Option<DataRecord>> {
        self.get(Table::Data, metadata_id)
    }

    fn circle_data(&self, circle_id: &str) -> StoreResult<Vec<DataRecord>> {
        let ids: Vec<String> = self.scan(Table::CircleData, &index_prefix(circle_id))?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.data(&id)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn signature(&self, checksum: &str) -> StoreResult<Option<SignatureRecord>> {
        self.get(Table::Signatures, checksum)
    }

    fn signed_document(
        &self,
        member_id: &str,
        document_checksum: &str,
    ) -> StoreResult<Option<SignatureRecord>> {
        let key = signed_document_key(member_id, document_checksum);
        match self.get::<String>(Table::SignedDocuments, &key)? {
            Some(checksum) => self.signature(&checksum),
            None => Ok(None),
        }
    }

    fn member_signatures(&self, member_id: &str) -> StoreResult<Vec<SignatureRecord>> {
        let ids: Vec<String> = self.scan(Table::SignedDocuments, &format!("{member_id}|"))?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.signature(&id)? {
                out.push(record);
            }
        }
        out.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(out)
    }

    fn data_type(&self, name: &str) -> StoreResult<Option<DataTypeRecord>> {
        self.get(Table::DataTypes, &normalize_name(name).to_lowercase())
    }

    fn data_types(&self) -> StoreResult<Vec<DataTypeRecord>> {
        self.scan(Table::DataTypes, "")
    }

    fn setting(&self, key: &str) -> StoreResult<Option<String>> {
        self.get(Table::Settings, key)
    }
}

impl<T: StoreRead + ?Sized> Records for T {}

/// Typed mutations. Index tables are maintained alongside their records.
impl WriteTxn {
    pub fn put_member(&mut self, member: &MemberRecord) -> StoreResult<()> {
        self.put(Table::Members, &member.id, member)?;
        self.put(Table::MemberNames, &normalize_name(&member.name), &member.id)
    }

    pub fn remove_member(&mut self, member: &MemberRecord) -> StoreResult<()> {
        self.remove(Table::Members, &member.id)?;
        self.remove(Table::MemberNames, &normalize_name(&member.name))?;
        Ok(())
    }

    pub fn put_circle(&mut self, circle: &CircleRecord) -> StoreResult<()> {
        self.put(Table::Circles, &circle.id, circle)?;
        self.put(Table::CircleNames, &normalize_name(&circle.name), &circle.id)
    }

    pub fn remove_circle(&mut self, circle: &CircleRecord) -> StoreResult<()> {
        self.remove(Table::Circles, &circle.id)?;
        self.remove(Table::CircleNames, &normalize_name(&circle.name))?;
        Ok(())
    }

    pub fn put_trustee(&mut self, trustee: &TrusteeRecord) -> StoreResult<()> {
        let key = trustee_key(&trustee.circle_id, &trustee.member_id);
        self.put(Table::Trustees, &key, trustee)?;
        let index = index_key(&trustee.member_id, &trustee.circle_id);
        self.put(Table::MemberCircles, &index, &trustee.circle_id)
    }

    pub fn remove_trustee(&mut self, circle_id: &str, member_id: &str) -> StoreResult<bool> {
        self.remove(Table::MemberCircles, &index_key(member_id, circle_id))?;
        self.remove(Table::Trustees, &trustee_key(circle_id, member_id))
    }

    /// Insert a metadata node together with its name index entry.
    pub fn put_metadata(&mut self, record: &MetadataRecord) -> StoreResult<()> {
        self.put(Table::Metadata, &record.id, record)?;
        let index = index_key(&record.circle_id, &record.id);
        self.put(Table::CircleMetadata, &index, &record.id)?;
        if let Some(parent_id) = &record.parent_id {
            let key = child_key(&record.circle_id, parent_id, &record.name);
            self.put(Table::MetadataNames, &key, &record.id)?;
        }
        Ok(())
    }

    pub fn remove_metadata(&mut self, record: &MetadataRecord) -> StoreResult<()> {
        self.remove(Table::Metadata, &record.id)?;
        self.remove(Table::CircleMetadata, &index_key(&record.circle_id, &record.id))?;
        if let Some(parent_id) = &record.parent_id {
            let key = child_key(&record.circle_id, parent_id, &record.name);
            self.remove(Table::MetadataNames, &key)?;
        }
        Ok(())
    }

    /// Rewrite a node whose name or parent may have changed.
    pub fn replace_metadata(
        &mut self,
        old: &MetadataRecord,
        new: &MetadataRecord,
    ) -> StoreResult<()> {
        if let Some(parent_id) = &old.parent_id {
            let key = child_key(&old.circle_id, parent_id, &old.name);
            self.remove(Table::MetadataNames, &key)?;
        }
        self.put_metadata(new)
    }

    pub fn put_data(&mut self, record: &DataRecord) -> StoreResult<()> {
        self.put(Table::Data, &record.metadata_id, record)?;
        let index = index_key(&record.circle_id, &record.metadata_id);
        self.put(Table::CircleData, &index, &record.metadata_id)
    }

    pub fn remove_data(&mut self, metadata_id: &str) -> StoreResult<bool> {
        let Some(record) = self.data(metadata_id)? else {
            return Ok(false);
        };
        self.remove(Table::CircleData, &index_key(&record.circle_id, metadata_id))?;
        self.remove(Table::Data, metadata_id)
    }

    /// Store a signature and point the signer's dedup index at it.
    pub fn put_signature(&mut self, record: &SignatureRecord) -> StoreResult<()> {
        self.put(Table::Signatures, &record.checksum, record)?;
        let key = signed_document_key(&record.member_id, &record.document_checksum);
        self.put(Table::SignedDocuments, &key, &record.checksum)
    }

    /// Drop a member's dedup index; the signature records themselves stay
    /// verifiable.
    pub fn remove_signed_documents(&mut self, member_id: &str) -> StoreResult<usize> {
        let keys = self.scan_keys(Table::SignedDocuments, &format!("{member_id}|"))?;
        for key in &keys {
            self.remove(Table::SignedDocuments, key)?;
        }
        Ok(keys.len())
    }

    pub fn put_data_type(&mut self, record: &DataTypeRecord) -> StoreResult<()> {
        let key = normalize_name(&record.name).to_lowercase();
        self.put(Table::DataTypes, &key, record)
    }

    pub fn remove_data_type(&mut self, name: &str) -> StoreResult<bool> {
        self.remove(Table::DataTypes, &normalize_name(name).to_lowercase())
    }

    pub fn put_setting(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.put(Table::Settings, key, &value.to_string())
    }
}
