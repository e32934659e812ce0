// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Circles and the trustee relation.
//!
//! A trustee row either exists with a level or does not exist; level changes
//! overwrite in place. The circle key is issued once, when the circle is
//! created, and wrapped again for each member added later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::caller::Caller;
use super::levels::TrustLevel;
use super::{authorize, caller_record, require_system_admin, resolve_trustee};
use crate::audit_log;
use crate::crypto::MemberPublicKey;
use crate::data::types::FOLDER_TYPE;
use crate::error::{CwsError, CwsResult};
use crate::state::EngineState;
use crate::storage::{
    normalize_name, AuditEventType, CircleRecord, DataKind, MetadataRecord, Records, StoreRead,
    TrusteeRecord,
};

/// Name of every circle's implicit root folder.
pub const ROOT_FOLDER_NAME: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircleView {
    pub id: String,
    pub name: String,
    pub root_folder_id: String,
    /// The caller's own level, if it is a trustee.
    pub trust_level: Option<TrustLevel>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrusteeView {
    pub circle_id: String,
    pub member_id: String,
    pub member_name: String,
    pub trust_level: TrustLevel,
    pub created: DateTime<Utc>,
    pub altered: DateTime<Utc>,
}

fn trustee_view(txn: &impl StoreRead, trustee: &TrusteeRecord) -> CwsResult<TrusteeView> {
    let member_name = txn
        .member(&trustee.member_id)?
        .map(|m| m.name)
        .unwrap_or_default();
    Ok(TrusteeView {
        circle_id: trustee.circle_id.clone(),
        member_id: trustee.member_id.clone(),
        member_name,
        trust_level: trustee.trust_level,
        created: trustee.created,
        altered: trustee.altered,
    })
}

fn load_circle(txn: &impl StoreRead, circle_id: &str) -> CwsResult<CircleRecord> {
    txn.circle(circle_id)?
        .ok_or_else(|| CwsError::not_found("No Circle could be found with the given Id."))
}

/// Whether the circle holds anything besides its root folder.
pub(crate) fn circle_has_content(txn: &impl StoreRead, circle_id: &str) -> CwsResult<bool> {
    match txn.circle(circle_id)? {
        Some(circle) => Ok(txn.has_children(circle_id, &circle.root_folder_id)?),
        None => Ok(false),
    }
}

/// Refuse to let `leaving_member` stop being an ADMIN if that leaves a
/// circle with content without any ADMIN.
pub(crate) fn ensure_admin_remains(
    txn: &impl StoreRead,
    circle_id: &str,
    leaving_member: &str,
) -> CwsResult<()> {
    let trustees = txn.circle_trustees(circle_id)?;
    let leaving_is_admin = trustees
        .iter()
        .any(|t| t.member_id == leaving_member && t.trust_level == TrustLevel::Admin);
    if !leaving_is_admin {
        return Ok(());
    }
    let remaining_admins = trustees
        .iter()
        .filter(|t| t.member_id != leaving_member && t.trust_level == TrustLevel::Admin)
        .count();
    if remaining_admins == 0 && circle_has_content(txn, circle_id)? {
        return Err(CwsError::illegal(
            "The last Administrator of a Circle holding data cannot be removed.",
        ));
    }
    Ok(())
}

pub struct TrustModel<'a> {
    state: &'a EngineState,
}

impl<'a> TrustModel<'a> {
    pub fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Create a circle with a fresh key. System administrator only.
    ///
    /// `circle_admin` becomes the first ADMIN trustee; it defaults to the
    /// caller.
    pub fn create_circle(
        &self,
        caller: &Caller,
        name: &str,
        circle_admin: Option<&str>,
    ) -> CwsResult<CircleView> {
        require_system_admin(caller, "create Circles")?;
        let _master = self.state.ensure_ready()?;
        let keys = self.state.keys();

        let circle = self.state.db.write(|txn| {
            caller_record(txn, caller)?;
            let name = normalize_name(name);
            if name.is_empty() {
                return Err(CwsError::integrity("A Circle name is required."));
            }
            if txn.circle_name_taken(&name)? {
                return Err(CwsError::integrity(format!(
                    "A Circle with the name '{name}' already exists."
                )));
            }
            let admin_id = circle_admin.unwrap_or(caller.member_id());
            let admin = txn
                .member(admin_id)?
                .ok_or_else(|| CwsError::not_found("No such Account could be found."))?;

            let now = Utc::now();
            let circle_key = keys.issue_circle_key()?;
            let circle = CircleRecord {
                id: uuid::Uuid::new_v4().to_string(),
                name,
                root_folder_id: uuid::Uuid::new_v4().to_string(),
                key_id: uuid::Uuid::new_v4().to_string(),
                key_algorithm: circle_key.algorithm(),
                created: now,
            };
            txn.put_circle(&circle)?;
            txn.put_metadata(&MetadataRecord {
                id: circle.root_folder_id.clone(),
                circle_id: circle.id.clone(),
                parent_id: None,
                name: ROOT_FOLDER_NAME.to_string(),
                type_name: FOLDER_TYPE.to_string(),
                kind: DataKind::Folder,
                created: now,
                altered: now,
            })?;

            let public_key = MemberPublicKey::from_armored(&admin.public_key)?;
            txn.put_trustee(&TrusteeRecord {
                circle_id: circle.id.clone(),
                member_id: admin.id.clone(),
                trust_level: TrustLevel::Admin,
                circle_key: keys.wrap_circle_key_for_trustee(&circle_key, &public_key)?,
                created: now,
                altered: now,
            })?;
            audit_log!(
                txn,
                AuditEventType::CircleCreated,
                member = caller.member_id(),
                resource = ("circle", circle.id.as_str()),
                details = serde_json::json!({ "name": circle.name, "admin": admin.id })
            )?;
            Ok(circle)
        })?;

        info!(circle_id = %circle.id, "Circle created");
        let level = (circle_admin.unwrap_or(caller.member_id()) == caller.member_id())
            .then_some(TrustLevel::Admin);
        Ok(CircleView {
            id: circle.id,
            name: circle.name,
            root_folder_id: circle.root_folder_id,
            trust_level: level,
            created: circle.created,
        })
    }

    /// Delete a circle.
    ///
    /// Allowed for the system administrator or a circle ADMIN. A circle that
    /// still holds data is refused, unless it is orphaned (no trustees left),
    /// in which case its content goes with it.
    pub fn delete_circle(&self, caller: &Caller, circle_id: &str) -> CwsResult<()> {
        let _master = self.state.ensure_ready()?;
        let removed = self.state.db.write(|txn| {
            caller_record(txn, caller)?;
            let circle = load_circle(txn, circle_id)?;
            if !caller.is_system_admin() {
                authorize(txn, caller.member_id(), circle_id, TrustLevel::Admin)?;
            }

            let trustees = txn.circle_trustees(circle_id)?;
            if !trustees.is_empty() && circle_has_content(txn, circle_id)? {
                return Err(CwsError::integrity(
                    "The Circle still contains data and cannot be deleted.",
                ));
            }

            let content = txn.circle_metadata(circle_id)?;
            for node in &content {
                txn.remove_data(&node.id)?;
                txn.remove_metadata(node)?;
            }
            for trustee in &trustees {
                txn.remove_trustee(circle_id, &trustee.member_id)?;
            }
            txn.remove_circle(&circle)?;
            audit_log!(
                txn,
                AuditEventType::CircleDeleted,
                member = caller.member_id(),
                resource = ("circle", circle_id),
                details = serde_json::json!({ "orphaned": trustees.is_empty(), "nodes": content.len() })
            )?;
            Ok::<_, CwsError>(content.len())
        })?;

        info!(circle_id, removed_nodes = removed, "Circle deleted");
        Ok(())
    }

    /// Circles visible to the caller: its own, or all for the administrator.
    pub fn list_circles(&self, caller: &Caller) -> CwsResult<Vec<CircleView>> {
        let _master = self.state.ensure_ready()?;
        self.state.db.read(|txn| {
            caller_record(txn, caller)?;
            let mut views = Vec::new();
            for circle in txn.circles()? {
                let level = txn
                    .trustee(&circle.id, caller.member_id())?
                    .map(|t| t.trust_level);
                if level.is_none() && !caller.is_system_admin() {
                    continue;
                }
                views.push(CircleView {
                    id: circle.id,
                    name: circle.name,
                    root_folder_id: circle.root_folder_id,
                    trust_level: level,
                    created: circle.created,
                });
            }
            views.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(views)
        })
    }

    pub fn list_trustees(&self, caller: &Caller, circle_id: &str) -> CwsResult<Vec<TrusteeView>> {
        let _master = self.state.ensure_ready()?;
        self.state.db.read(|txn| {
            caller_record(txn, caller)?;
            load_circle(txn, circle_id)?;
            authorize(txn, caller.member_id(), circle_id, TrustLevel::Read)?;
            txn.circle_trustees(circle_id)?
                .iter()
                .map(|t| trustee_view(txn, t))
                .collect()
        })
    }

    /// Add `member_id` to the circle, wrapping the circle key for it.
    ///
    /// The requester must be an ADMIN trustee: the circle key is unwrapped
    /// from the requester's own trustee row.
    pub fn add_trustee(
        &self,
        requester: &Caller,
        circle_id: &str,
        member_id: &str,
        level: TrustLevel,
    ) -> CwsResult<TrusteeView> {
        let master = self.state.ensure_ready()?;
        let keys = self.state.keys();

        let view = self.state.db.write(|txn| {
            let requester_record = caller_record(txn, requester)?;
            let circle = load_circle(txn, circle_id)?;
            let own = authorize(txn, requester.member_id(), circle_id, TrustLevel::Admin)?;
            let member = txn
                .member(member_id)?
                .ok_or_else(|| CwsError::not_found("No such Account could be found."))?;
            if txn.trustee(circle_id, member_id)?.is_some() {
                return Err(CwsError::integrity(
                    "The Member is already a Trustee of the Circle.",
                ));
            }

            let circle_key = keys.circle_key(&master, &requester_record, &own, &circle)?;
            let public_key = MemberPublicKey::from_armored(&member.public_key)?;
            let now = Utc::now();
            let trustee = TrusteeRecord {
                circle_id: circle_id.to_string(),
                member_id: member_id.to_string(),
                trust_level: level,
                circle_key: keys.wrap_circle_key_for_trustee(&circle_key, &public_key)?,
                created: now,
                altered: now,
            };
            txn.put_trustee(&trustee)?;
            audit_log!(
                txn,
                AuditEventType::TrusteeAdded,
                member = requester.member_id(),
                resource = ("trustee", format!("{circle_id}|{member_id}")),
                details = serde_json::json!({ "level": level })
            )?;
            trustee_view(txn, &trustee)
        })?;

        info!(circle_id, member_id, level = %level, "Trustee added");
        Ok(view)
    }

    /// Overwrite a trustee's level. Requires ADMIN.
    pub fn change_trust_level(
        &self,
        requester: &Caller,
        circle_id: &str,
        member_id: &str,
        level: TrustLevel,
    ) -> CwsResult<TrusteeView> {
        let _master = self.state.ensure_ready()?;
        let view = self.state.db.write(|txn| {
            caller_record(txn, requester)?;
            load_circle(txn, circle_id)?;
            authorize(txn, requester.member_id(), circle_id, TrustLevel::Admin)?;
            let mut trustee = resolve_trustee(txn, member_id, circle_id)?;
            if level != TrustLevel::Admin {
                ensure_admin_remains(txn, circle_id, member_id)?;
            }

            let previous = trustee.trust_level;
            trustee.trust_level = level;
            trustee.altered = Utc::now();
            txn.put_trustee(&trustee)?;
            audit_log!(
                txn,
                AuditEventType::TrusteeChanged,
                member = requester.member_id(),
                resource = ("trustee", format!("{circle_id}|{member_id}")),
                details = serde_json::json!({ "from": previous, "to": level })
            )?;
            trustee_view(txn, &trustee)
        })?;

        info!(circle_id, member_id, level = %level, "Trust level changed");
        Ok(view)
    }

    /// Remove a trustee. Requires ADMIN, also when removing oneself.
    pub fn remove_trustee(
        &self,
        requester: &Caller,
        circle_id: &str,
        member_id: &str,
    ) -> CwsResult<()> {
        let _master = self.state.ensure_ready()?;
        self.state.db.write(|txn| {
            caller_record(txn, requester)?;
            load_circle(txn, circle_id)?;
            authorize(txn, requester.member_id(), circle_id, TrustLevel::Admin)?;
            resolve_trustee(txn, member_id, circle_id)?;
            ensure_admin_remains(txn, circle_id, member_id)?;

            txn.remove_trustee(circle_id, member_id)?;
            audit_log!(
                txn,
                AuditEventType::TrusteeRemoved,
                member = requester.member_id(),
                resource = ("trustee", format!("{circle_id}|{member_id}"))
            )?;
            Ok::<_, CwsError>(())
        })?;

        info!(circle_id, member_id, "Trustee removed");
        Ok(())
    }
}
