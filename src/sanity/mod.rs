// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sanity Engine
//!
//! Recomputes the checksum of every stored ciphertext and records the result
//! on the payload, independently of reads. A run is split into one write
//! transaction per circle, so results already recorded survive a failure or a
//! shutdown later in the run.
//!
//! - `sweeper` - periodic background runs

pub mod sweeper;

pub use sweeper::SanitySweeper;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit_log;
use crate::data::objects::checksum_matches;
use crate::error::{CwsError, CwsResult};
use crate::state::EngineState;
use crate::storage::{AuditEventType, Records, SanityStatus};
use crate::trust::caller::Caller;
use crate::trust::{authorize, caller_record, require_system_admin, resolve_trustee, TrustLevel};

/// Which circles a run or a failure listing covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanityScope {
    /// Every circle; system administrator only.
    All,
    /// One circle; requires ADMIN on it.
    Circle(String),
}

/// Totals of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanityReport {
    pub circles: usize,
    pub checked: usize,
    pub failed: usize,
}

impl SanityReport {
    fn absorb(&mut self, other: SanityReport) {
        self.circles += other.circles;
        self.checked += other.checked;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanityFailure {
    pub data_id: String,
    pub circle_id: String,
    pub failed_at: DateTime<Utc>,
}

/// Check every payload of one circle in a single transaction.
pub(crate) fn check_circle(state: &EngineState, circle_id: &str) -> CwsResult<SanityReport> {
    let crypto = state.crypto();
    let report = state.db.write(|txn| {
        let mut report = SanityReport {
            circles: 1,
            ..SanityReport::default()
        };
        let now = Utc::now();
        for mut record in txn.circle_data(circle_id)? {
            let status = if checksum_matches(&crypto, &record) {
                SanityStatus::Ok
            } else {
                SanityStatus::Failed
            };
            if status == SanityStatus::Failed {
                report.failed += 1;
                if record.sanity_status != SanityStatus::Failed {
                    audit_log!(
                        txn,
                        AuditEventType::SanityFailure,
                        resource = ("data", record.metadata_id.as_str()),
                        details = serde_json::json!({ "circle_id": circle_id })
                    )?;
                }
            }
            record.sanity_status = status;
            record.sanity_checked = Some(now);
            txn.put_data(&record)?;
            report.checked += 1;
        }
        Ok::<_, CwsError>(report)
    })?;

    if report.failed > 0 {
        warn!(circle_id, failed = report.failed, "Sanity check found corrupted data");
    }
    Ok(report)
}

/// Check the given circles one by one, stopping early if `stop` says so.
pub(crate) fn check_circles(
    state: &EngineState,
    circle_ids: &[String],
    stop: impl Fn() -> bool,
) -> CwsResult<SanityReport> {
    let mut report = SanityReport::default();
    for circle_id in circle_ids {
        if stop() {
            info!(completed = report.circles, "Sanity run interrupted");
            break;
        }
        report.absorb(check_circle(state, circle_id)?);
    }
    Ok(report)
}

pub(crate) fn all_circle_ids(state: &EngineState) -> CwsResult<Vec<String>> {
    state
        .db
        .read(|txn| Ok(txn.circles()?.into_iter().map(|c| c.id).collect()))
}

pub struct SanityService<'a> {
    state: &'a EngineState,
}

impl<'a> SanityService<'a> {
    pub fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Run a check over `scope` on demand.
    pub fn run_sanity_check(&self, caller: &Caller, scope: &SanityScope) -> CwsResult<SanityReport> {
        let _master = self.state.ensure_ready()?;
        let circle_ids = match scope {
            SanityScope::All => {
                require_system_admin(caller, "check all Circles")?;
                self.state.db.read(|txn| caller_record(txn, caller))?;
                all_circle_ids(self.state)?
            }
            SanityScope::Circle(circle_id) => {
                self.state.db.read(|txn| {
                    caller_record(txn, caller)?;
                    if txn.circle(circle_id)?.is_none() {
                        return Err(CwsError::not_found(
                            "No Circle could be found with the given Id.",
                        ));
                    }
                    authorize(txn, caller.member_id(), circle_id, TrustLevel::Admin)
                })?;
                vec![circle_id.clone()]
            }
        };

        let report = check_circles(self.state, &circle_ids, || false)?;
        info!(
            circles = report.circles,
            checked = report.checked,
            failed = report.failed,
            "Sanity check completed"
        );
        Ok(report)
    }

    /// Failed payloads, ordered by check time.
    ///
    /// The system administrator sees every circle, optionally narrowed to one.
    /// Anyone else sees only circles it administers: a named circle requires
    /// ADMIN on it, and without one the caller must administer at least one
    /// circle.
    pub fn list_failures(
        &self,
        caller: &Caller,
        circle_id: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> CwsResult<Vec<SanityFailure>> {
        let _master = self.state.ensure_ready()?;
        self.state.db.read(|txn| {
            caller_record(txn, caller)?;
            let circle_ids: Vec<String> = match circle_id {
                Some(circle_id) => {
                    if !caller.is_system_admin() {
                        resolve_trustee(txn, caller.member_id(), circle_id)?;
                        authorize(txn, caller.member_id(), circle_id, TrustLevel::Admin)?;
                    }
                    vec![circle_id.to_string()]
                }
                None if caller.is_system_admin() => {
                    txn.circles()?.into_iter().map(|c| c.id).collect()
                }
                None => {
                    let administered: Vec<String> = txn
                        .member_trustees(caller.member_id())?
                        .into_iter()
                        .filter(|t| t.trust_level == TrustLevel::Admin)
                        .map(|t| t.circle_id)
                        .collect();
                    if administered.is_empty() {
                        return Err(CwsError::denied(
                            "Only Circle Administrators may list sanity failures.",
                        ));
                    }
                    administered
                }
            };

            let mut failures = Vec::new();
            for circle_id in &circle_ids {
                for record in txn.circle_data(circle_id)? {
                    let Some(failed_at) = record.sanity_checked else {
                        continue;
                    };
                    if record.sanity_status != SanityStatus::Failed
                        || since.is_some_and(|since| failed_at < since)
                    {
                        continue;
                    }
                    failures.push(SanityFailure {
                        data_id: record.metadata_id,
                        circle_id: record.circle_id,
                        failed_at,
                    });
                }
            }
            failures.sort_by(|a, b| {
                a.failed_at
                    .cmp(&b.failed_at)
                    .then_with(|| a.data_id.cmp(&b.data_id))
            });
            Ok(failures)
        })
    }
}
