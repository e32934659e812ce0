// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Events are written inside the same write transaction as the action they
//! describe, so an aborted action leaves no audit entry behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::database::{StoreRead, StoreResult, Table, WriteTxn};

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Master key events
    MasterKeyUnlocked,
    MasterKeyRotated,

    // Member events
    MemberCreated,
    MemberDeleted,

    // Circle events
    CircleCreated,
    CircleDeleted,
    TrusteeAdded,
    TrusteeChanged,
    TrusteeRemoved,

    // Data type events
    DataTypeChanged,
    DataTypeDeleted,

    // Integrity events
    SanityFailure,

    // Signature events
    SignatureCreated,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Member who triggered the event, if any.
    pub member_id: Option<String>,
    pub resource_id: Option<String>,
    /// member, circle, trustee, data, signature, ...
    pub resource_type: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            member_id: None,
            resource_id: None,
            resource_type: None,
            details: None,
        }
    }

    pub fn with_member(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sortable key: timestamp first, then the event id for uniqueness.
    fn key(&self) -> String {
        format!(
            "{}|{}",
            self.timestamp.format("%Y%m%d%H%M%S%.9f"),
            self.event_id
        )
    }
}

impl WriteTxn {
    pub fn audit(&mut self, event: &AuditEvent) -> StoreResult<()> {
        self.put(Table::Audit, &event.key(), event)
    }
}

/// All audit events in chronological order.
pub fn audit_events(txn: &impl StoreRead) -> StoreResult<Vec<AuditEvent>> {
    txn.scan(Table::Audit, "")
}

/// Record an audit event inside a write transaction.
///
/// ```rust,ignore
/// audit_log!(txn, AuditEventType::CircleCreated, member = caller.member_id(), resource = ("circle", &circle.id));
/// ```
#[macro_export]
macro_rules! audit_log {
    ($txn:expr, $event_type:expr, member = $member:expr, resource = ($rtype:expr, $rid:expr)) => {
        $txn.audit(
            &$crate::storage::AuditEvent::new($event_type)
                .with_member($member)
                .with_resource($rtype, $rid),
        )
    };
    ($txn:expr, $event_type:expr, member = $member:expr, resource = ($rtype:expr, $rid:expr), details = $details:expr) => {
        $txn.audit(
            &$crate::storage::AuditEvent::new($event_type)
                .with_member($member)
                .with_resource($rtype, $rid)
                .with_details($details),
        )
    };
    ($txn:expr, $event_type:expr, resource = ($rtype:expr, $rid:expr), details = $details:expr) => {
        $txn.audit(
            &$crate::storage::AuditEvent::new($event_type)
                .with_resource($rtype, $rid)
                .with_details($details),
        )
    };
}
