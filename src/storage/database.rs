// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded engine database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! Every table maps a string key to JSON bytes.
//!
//! - `members`: member_id → MemberRecord
//! - `member_names`: normalised name → member_id
//! - `circles`: circle_id → CircleRecord
//! - `circle_names`: normalised name → circle_id
//! - `trustees`: `circle_id|member_id` → TrusteeRecord
//! - `member_circles`: `member_id|circle_id` → circle_id
//! - `metadata`: metadata_id → MetadataRecord
//! - `metadata_names`: `circle_id|parent_id|name` → metadata_id
//! - `circle_metadata`: `circle_id|metadata_id` → metadata_id
//! - `data`: metadata_id → DataRecord
//! - `circle_data`: `circle_id|metadata_id` → metadata_id
//! - `signatures`: checksum(signature blob) → SignatureRecord
//! - `signed_documents`: `member_id|checksum(payload)` → signature checksum
//! - `data_types`: name → DataTypeRecord
//! - `settings`: key → value
//! - `audit`: `timestamp|event_id` → AuditEvent
//!
//! Every engine operation runs inside exactly one [`CwsDatabase::write`] or
//! [`CwsDatabase::read`] call. redb admits a single writer at a time, so
//! writes are serializable and an `Err` from the closure rolls everything back.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

// =============================================================================
// Table Definitions
// =============================================================================

const MEMBERS: TableDefinition<&str, &[u8]> = TableDefinition::new("members");
const MEMBER_NAMES: TableDefinition<&str, &[u8]> = TableDefinition::new("member_names");
const CIRCLES: TableDefinition<&str, &[u8]> = TableDefinition::new("circles");
const CIRCLE_NAMES: TableDefinition<&str, &[u8]> = TableDefinition::new("circle_names");
const TRUSTEES: TableDefinition<&str, &[u8]> = TableDefinition::new("trustees");
const MEMBER_CIRCLES: TableDefinition<&str, &[u8]> = TableDefinition::new("member_circles");
const METADATA: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");
const METADATA_NAMES: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata_names");
const CIRCLE_METADATA: TableDefinition<&str, &[u8]> = TableDefinition::new("circle_metadata");
const DATA: TableDefinition<&str, &[u8]> = TableDefinition::new("data");
const CIRCLE_DATA: TableDefinition<&str, &[u8]> = TableDefinition::new("circle_data");
const SIGNATURES: TableDefinition<&str, &[u8]> = TableDefinition::new("signatures");
const SIGNED_DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("signed_documents");
const DATA_TYPES: TableDefinition<&str, &[u8]> = TableDefinition::new("data_types");
const SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");
const AUDIT: TableDefinition<&str, &[u8]> = TableDefinition::new("audit");

/// Logical tables of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Members,
    MemberNames,
    Circles,
    CircleNames,
    Trustees,
    MemberCircles,
    Metadata,
    MetadataNames,
    CircleMetadata,
    Data,
    CircleData,
    Signatures,
    SignedDocuments,
    DataTypes,
    Settings,
    Audit,
}

impl Table {
    const ALL: [Table; 16] = [
        Table::Members,
        Table::MemberNames,
        Table::Circles,
        Table::CircleNames,
        Table::Trustees,
        Table::MemberCircles,
        Table::Metadata,
        Table::MetadataNames,
        Table::CircleMetadata,
        Table::Data,
        Table::CircleData,
        Table::Signatures,
        Table::SignedDocuments,
        Table::DataTypes,
        Table::Settings,
        Table::Audit,
    ];

    fn definition(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Table::Members => MEMBERS,
            Table::MemberNames => MEMBER_NAMES,
            Table::Circles => CIRCLES,
            Table::CircleNames => CIRCLE_NAMES,
            Table::Trustees => TRUSTEES,
            Table::MemberCircles => MEMBER_CIRCLES,
            Table::Metadata => METADATA,
            Table::MetadataNames => METADATA_NAMES,
            Table::CircleMetadata => CIRCLE_METADATA,
            Table::Data => DATA,
            Table::CircleData => CIRCLE_DATA,
            Table::Signatures => SIGNATURES,
            Table::SignedDocuments => SIGNED_DOCUMENTS,
            Table::DataTypes => DATA_TYPES,
            Table::Settings => SETTINGS,
            Table::Audit => AUDIT,
        }
    }
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Transactions
// =============================================================================

/// Read access shared by read and write transactions.
pub trait StoreRead {
    fn get_raw(&self, table: Table, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_raw(&self, table: Table, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;

    fn get<T: DeserializeOwned>(&self, table: Table, key: &str) -> StoreResult<Option<T>> {
        match self.get_raw(table, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn contains(&self, table: Table, key: &str) -> StoreResult<bool> {
        Ok(self.get_raw(table, key)?.is_some())
    }

    fn scan<T: DeserializeOwned>(&self, table: Table, prefix: &str) -> StoreResult<Vec<T>> {
        self.scan_raw(table, prefix)?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(StoreError::from))
            .collect()
    }

    fn scan_keys(&self, table: Table, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .scan_raw(table, prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }
}

fn scan_table<T>(table: &T, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in table.range(prefix..)? {
        let (key, value) = entry?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        out.push((key.to_string(), value.value().to_vec()));
    }
    Ok(out)
}

/// A consistent read-only snapshot.
pub struct ReadTxn {
    txn: redb::ReadTransaction,
}

impl StoreRead for ReadTxn {
    fn get_raw(&self, table: Table, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let t = self.txn.open_table(table.definition())?;
        let value = t.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    fn scan_raw(&self, table: Table, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let t = self.txn.open_table(table.definition())?;
        scan_table(&t, prefix)
    }
}

/// A write transaction. Dropped without commit means rolled back.
pub struct WriteTxn {
    txn: redb::WriteTransaction,
}

impl StoreRead for WriteTxn {
    fn get_raw(&self, table: Table, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let t = self.txn.open_table(table.definition())?;
        let value = t.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    fn scan_raw(&self, table: Table, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let t = self.txn.open_table(table.definition())?;
        let entries = scan_table(&t, prefix)?;
        Ok(entries)
    }
}

impl WriteTxn {
    pub fn put<T: Serialize>(&mut self, table: Table, key: &str, value: &T) -> StoreResult<()> {
        let json = serde_json::to_vec(value)?;
        let mut t = self.txn.open_table(table.definition())?;
        t.insert(key, json.as_slice())?;
        Ok(())
    }

    /// Remove a key, returning whether it existed.
    pub fn remove(&mut self, table: Table, key: &str) -> StoreResult<bool> {
        let mut t = self.txn.open_table(table.definition())?;
        let existed = t.remove(key)?.is_some();
        Ok(existed)
    }
}

// =============================================================================
// CwsDatabase
// =============================================================================

pub struct CwsDatabase {
    db: Database,
}

impl CwsDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        for table in Table::ALL {
            let _ = write_txn.open_table(table.definition())?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Run `f` against a read snapshot.
    pub fn read<T, E>(&self, f: impl FnOnce(&ReadTxn) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let txn = ReadTxn {
            txn: self.db.begin_read().map_err(StoreError::from)?,
        };
        f(&txn)
    }

    /// Run `f` inside one write transaction: commit on `Ok`, abort on `Err`.
    pub fn write<T, E>(&self, f: impl FnOnce(&mut WriteTxn) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut txn = WriteTxn {
            txn: self.db.begin_write().map_err(StoreError::from)?,
        };
        match f(&mut txn) {
            Ok(value) => {
                txn.txn.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort) = txn.txn.abort() {
                    warn!(error = %abort, "Failed to abort write transaction");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        value: u32,
    }

    fn temp_db() -> (CwsDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = CwsDatabase::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn committed_writes_are_visible_to_readers() {
        let (db, _dir) = temp_db();
        db.write(|txn| txn.put(Table::Settings, "a", &Row { value: 1 }))
            .unwrap();

        let row: Option<Row> = db.read(|txn| txn.get(Table::Settings, "a")).unwrap();
        assert_eq!(row, Some(Row { value: 1 }));
    }

    #[test]
    fn failed_closures_roll_back_every_write() {
        let (db, _dir) = temp_db();
        let result: Result<(), StoreError> = db.write(|txn| {
            txn.put(Table::Settings, "a", &Row { value: 1 })?;
            txn.put(Table::Members, "b", &Row { value: 2 })?;
            Err(StoreError::Io(std::io::Error::other("boom")))
        });
        assert!(result.is_err());

        let (a, b) = db
            .read(|txn| {
                Ok::<_, StoreError>((
                    txn.contains(Table::Settings, "a")?,
                    txn.contains(Table::Members, "b")?,
                ))
            })
            .unwrap();
        assert!(!a && !b);
    }

    #[test]
    fn prefix_scan_returns_only_matching_keys_in_order() {
        let (db, _dir) = temp_db();
        db.write(|txn| {
            txn.put(Table::Trustees, "c1|m2", &Row { value: 2 })?;
            txn.put(Table::Trustees, "c1|m1", &Row { value: 1 })?;
            txn.put(Table::Trustees, "c2|m1", &Row { value: 3 })?;
            txn.put(Table::Trustees, "c10|m1", &Row { value: 4 })?;
            Ok::<_, StoreError>(())
        })
        .unwrap();

        let rows: Vec<Row> = db.read(|txn| txn.scan(Table::Trustees, "c1|")).unwrap();
        assert_eq!(rows, vec![Row { value: 1 }, Row { value: 2 }]);

        let keys = db.read(|txn| txn.scan_keys(Table::Trustees, "")).unwrap();
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn remove_reports_whether_the_key_existed() {
        let (db, _dir) = temp_db();
        let (first, second) = db
            .write(|txn| {
                txn.put(Table::Data, "x", &Row { value: 9 })?;
                Ok::<_, StoreError>((txn.remove(Table::Data, "x")?, txn.remove(Table::Data, "x")?))
            })
            .unwrap();
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn reopening_keeps_committed_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.redb");
        {
            let db = CwsDatabase::open(&path).unwrap();
            db.write(|txn| txn.put(Table::Settings, "k", &Row { value: 5 }))
                .unwrap();
        }
        let db = CwsDatabase::open(&path).unwrap();
        let row: Option<Row> = db.read(|txn| txn.get(Table::Settings, "k")).unwrap();
        assert_eq!(row, Some(Row { value: 5 }));
    }
}
