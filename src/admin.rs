// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! System administrator queries over the audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CwsResult;
use crate::state::EngineState;
use crate::storage::{audit_events, AuditEvent, AuditEventType};
use crate::trust::caller::Caller;
use crate::trust::{caller_record, require_system_admin};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Filters for [`AdminService::list_audit_events`]; all optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Only events at or after this instant.
    pub since: Option<DateTime<Utc>>,
    pub member_id: Option<String>,
    pub event_type: Option<AuditEventType>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    /// Maximum number of results (default 100, capped at 1000).
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    pub events: Vec<AuditEvent>,
    /// Matching events before limit/offset.
    pub total: usize,
    pub has_more: bool,
}

pub struct AdminService<'a> {
    state: &'a EngineState,
}

impl<'a> AdminService<'a> {
    pub fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Audit events in chronological order.
    pub fn list_audit_events(&self, caller: &Caller, query: &AuditQuery) -> CwsResult<AuditPage> {
        require_system_admin(caller, "read the audit trail")?;
        let mut events = self.state.db.read(|txn| {
            caller_record(txn, caller)?;
            Ok::<_, crate::error::CwsError>(audit_events(txn)?)
        })?;

        if let Some(since) = query.since {
            events.retain(|e| e.timestamp >= since);
        }
        if let Some(member_id) = &query.member_id {
            events.retain(|e| e.member_id.as_deref() == Some(member_id.as_str()));
        }
        if let Some(event_type) = &query.event_type {
            events.retain(|e| &e.event_type == event_type);
        }
        if let Some(resource_type) = &query.resource_type {
            events.retain(|e| e.resource_type.as_deref() == Some(resource_type.as_str()));
        }
        if let Some(resource_id) = &query.resource_id {
            events.retain(|e| e.resource_id.as_deref() == Some(resource_id.as_str()));
        }

        let total = events.len();
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = query.offset.unwrap_or(0);
        let has_more = offset + limit < total;
        let events = events.into_iter().skip(offset).take(limit).collect();

        Ok(AuditPage {
            events,
            total,
            has_more,
        })
    }
}
