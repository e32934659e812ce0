// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Registered data types.
//!
//! Every metadata node carries a type name. `folder` and `data` are built in;
//! administrators may register further names of either kind.

use tracing::info;

use crate::audit_log;
use crate::error::{CwsError, CwsResult};
use crate::state::EngineState;
use crate::storage::{normalize_name, AuditEventType, DataKind, DataTypeRecord, Records, StoreRead};
use crate::trust::caller::Caller;
use crate::trust::{caller_record, require_system_admin};

pub const FOLDER_TYPE: &str = "folder";
pub const DATA_TYPE: &str = "data";

fn type_key(name: &str) -> String {
    normalize_name(name).to_lowercase()
}

fn builtin(name: &str) -> Option<DataTypeRecord> {
    match type_key(name).as_str() {
        FOLDER_TYPE => Some(DataTypeRecord {
            name: FOLDER_TYPE.to_string(),
            kind: DataKind::Folder,
        }),
        DATA_TYPE => Some(DataTypeRecord {
            name: DATA_TYPE.to_string(),
            kind: DataKind::Data,
        }),
        _ => None,
    }
}

/// Look up a type by name, built-ins first.
pub fn resolve_type(txn: &impl StoreRead, name: &str) -> CwsResult<DataTypeRecord> {
    if let Some(record) = builtin(name) {
        return Ok(record);
    }
    txn.data_type(name)?.ok_or_else(|| {
        CwsError::integrity(format!(
            "The Data Type '{}' is not registered.",
            normalize_name(name)
        ))
    })
}

fn type_in_use(txn: &impl StoreRead, name: &str) -> CwsResult<bool> {
    let key = type_key(name);
    for circle in txn.circles()? {
        if txn
            .circle_metadata(&circle.id)?
            .iter()
            .any(|node| type_key(&node.type_name) == key)
        {
            return Ok(true);
        }
    }
    Ok(false)
}

pub struct DataTypeService<'a> {
    state: &'a EngineState,
}

impl<'a> DataTypeService<'a> {
    pub fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Register a type, or change the kind of a registered one.
    ///
    /// A type already used by metadata cannot change kind.
    pub fn process_data_type(
        &self,
        caller: &Caller,
        name: &str,
        kind: DataKind,
    ) -> CwsResult<DataTypeRecord> {
        require_system_admin(caller, "manage Data Types")?;
        let _master = self.state.ensure_ready()?;

        let record = self.state.db.write(|txn| {
            caller_record(txn, caller)?;
            let key = type_key(name);
            if key.is_empty() {
                return Err(CwsError::integrity("A Data Type name is required."));
            }
            if builtin(&key).is_some() {
                return Err(CwsError::illegal(format!(
                    "The Data Type '{key}' is built in and cannot be altered."
                )));
            }
            if let Some(existing) = txn.data_type(&key)? {
                if existing.kind != kind && type_in_use(txn, &key)? {
                    return Err(CwsError::illegal(format!(
                        "The Data Type '{key}' is in use and cannot change kind."
                    )));
                }
            }

            let record = DataTypeRecord { name: key, kind };
            txn.put_data_type(&record)?;
            audit_log!(
                txn,
                AuditEventType::DataTypeChanged,
                member = caller.member_id(),
                resource = ("data_type", record.name.as_str()),
                details = serde_json::json!({ "kind": kind })
            )?;
            Ok(record)
        })?;

        info!(data_type = %record.name, kind = ?record.kind, "Data Type processed");
        Ok(record)
    }

    pub fn delete_data_type(&self, caller: &Caller, name: &str) -> CwsResult<()> {
        require_system_admin(caller, "manage Data Types")?;
        let _master = self.state.ensure_ready()?;

        self.state.db.write(|txn| {
            caller_record(txn, caller)?;
            let key = type_key(name);
            if builtin(&key).is_some() {
                return Err(CwsError::illegal(format!(
                    "The Data Type '{key}' is built in and cannot be deleted."
                )));
            }
            if txn.data_type(&key)?.is_none() {
                return Err(CwsError::not_found(format!(
                    "The Data Type '{key}' does not exist."
                )));
            }
            if type_in_use(txn, &key)? {
                return Err(CwsError::illegal(format!(
                    "The Data Type '{key}' is in use and cannot be deleted."
                )));
            }
            txn.remove_data_type(&key)?;
            audit_log!(
                txn,
                AuditEventType::DataTypeDeleted,
                member = caller.member_id(),
                resource = ("data_type", key.as_str())
            )?;
            Ok(())
        })?;

        info!(data_type = name, "Data Type deleted");
        Ok(())
    }

    /// Built-in and registered types, sorted by name.
    pub fn list_data_types(&self, caller: &Caller) -> CwsResult<Vec<DataTypeRecord>> {
        let _master = self.state.ensure_ready()?;
        self.state.db.read(|txn| {
            caller_record(txn, caller)?;
            let mut types = txn.data_types()?;
            types.extend(builtin(FOLDER_TYPE));
            types.extend(builtin(DATA_TYPE));
            types.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(types)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ObjectStore, ObjectUpdate};
    use crate::error::ErrorKind;
    use crate::testing::TestEngine;

    #[tokio::test]
    async fn builtins_are_always_listed_and_protected() {
        let engine = TestEngine::new().await;
        let service = DataTypeService::new(&engine.state);

        let names: Vec<String> = service
            .list_data_types(&engine.admin)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["data", "folder"]);

        let err = service
            .process_data_type(&engine.admin, "Folder", DataKind::Data)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);
        let err = service.delete_data_type(&engine.admin, "data").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);
    }

    #[tokio::test]
    async fn registered_types_can_be_used_and_are_protected_while_in_use() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        let service = DataTypeService::new(&engine.state);

        let denied = service
            .process_data_type(&alice, "contract", DataKind::Data)
            .unwrap_err();
        assert_eq!(denied.kind(), ErrorKind::AuthorizationDenied);

        let record = service
            .process_data_type(&engine.admin, " Contract ", DataKind::Data)
            .unwrap();
        assert_eq!(record.name, "contract");

        let store = ObjectStore::new(&engine.state);
        let id = store
            .add_object(&alice, &circle, None, "deal.pdf", "contract", Some(b"signed"))
            .unwrap();

        let err = service.delete_data_type(&engine.admin, "contract").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);
        let err = service
            .process_data_type(&engine.admin, "contract", DataKind::Folder)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);

        store.delete_object(&alice, &id).unwrap();
        service.delete_data_type(&engine.admin, "contract").unwrap();
        let err = store
            .add_object(&alice, &circle, None, "deal.pdf", "contract", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityWarning);
    }

    #[tokio::test]
    async fn folder_kinded_types_behave_as_folders() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        DataTypeService::new(&engine.state)
            .process_data_type(&engine.admin, "album", DataKind::Folder)
            .unwrap();

        let store = ObjectStore::new(&engine.state);
        let album = store
            .add_object(&alice, &circle, None, "Holidays", "album", None)
            .unwrap();
        store
            .add_object(&alice, &circle, Some(&album), "beach.jpg", DATA_TYPE, Some(b"img"))
            .unwrap();

        let err = store
            .update_object(&alice, &album, ObjectUpdate::bytes(b"x".to_vec()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);
    }
}
