//! Cycle outcome reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use tandem_core::System;

use crate::error::{ErrorKind, SyncError};

/// Stage of the cycle an item failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Enumerate,
    Link,
    Attachments,
    Notes,
    Status,
    Reopen,
    Closure,
}

/// Per-phase mutation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub incidents_created: usize,
    pub tickets_created: usize,
    pub back_refs_written: usize,
    pub attachments_to_a: usize,
    pub attachments_to_b: usize,
    pub notes_to_a: usize,
    pub notes_to_b: usize,
    pub statuses_propagated: usize,
    pub mirrors_updated: usize,
    pub reopened: usize,
    pub closed_on_a: usize,
    pub closed_on_b: usize,
}

impl Counters {
    /// Total number of remote mutations the counters account for.
    pub fn mutations(&self) -> usize {
        self.incidents_created
            + self.tickets_created
            + self.back_refs_written
            + self.attachments_to_a
            + self.attachments_to_b
            + self.notes_to_a
            + self.notes_to_b
            + self.statuses_propagated
            + self.mirrors_updated
            + self.reopened
            + self.closed_on_a
            + self.closed_on_b
    }
}

/// One item that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub system: System,
    pub key: String,
    pub phase: Phase,
    pub kind: ErrorKind,
    pub message: String,
}

/// Something that needs a human to look at it; nothing was mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Anomaly {
    /// Both sides carry references and they disagree.
    ConflictingReferences {
        ticket: String,
        ref_b: String,
        incident: String,
        ext_a: String,
    },
    /// A ticket points at an incident that is not open (closed or deleted).
    StaleReference { ticket: String, ref_b: String },
    /// An incident points at a ticket that is not open.
    DanglingExtA { incident: String, ext_a: String },
    /// `ext_A` rejected by the key filter.
    FilteredKey { incident: String, raw: String },
    /// A reopen marker is set but `ext_A` names no ticket that can be found.
    UnresolvableReopen { incident: String, ext_a: String },
}

/// Summary returned by [`crate::Orchestrator::run_cycle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tickets_seen: usize,
    pub incidents_seen: usize,
    pub pairs: usize,
    pub counters: Counters,
    pub anomalies: Vec<Anomaly>,
    pub failures: Vec<ItemFailure>,
}

impl CycleReport {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            tickets_seen: 0,
            incidents_seen: 0,
            pairs: 0,
            counters: Counters::default(),
            anomalies: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Record a skipped item and keep going.
    pub(crate) fn fail(
        &mut self,
        system: System,
        key: impl Into<String>,
        phase: Phase,
        err: &SyncError,
    ) {
        let key = key.into();
        tracing::warn!("{phase:?}: skipping {system} item {key}: {err}");
        self.failures.push(ItemFailure {
            system,
            key,
            phase,
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    pub(crate) fn anomaly(&mut self, anomaly: Anomaly) {
        tracing::warn!("consistency anomaly: {anomaly:?}");
        self.anomalies.push(anomaly);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepoError;

    #[test]
    fn failures_carry_error_kind() {
        let mut report = CycleReport::new(Utc::now());
        let err = SyncError::Remote {
            system: System::B,
            op: "create_attachment",
            source: RepoError::Transient("503".into()),
        };
        report.fail(System::A, "T200 001", Phase::Attachments, &err);
        assert!(!report.is_clean());
        assert_eq!(report.failures[0].kind, ErrorKind::Transient);
        assert_eq!(report.failures[0].key, "T200 001");
    }

    #[test]
    fn report_serializes_with_kebab_phases() {
        let mut report = CycleReport::new(Utc::now());
        report.fail(
            System::B,
            "I100-1",
            Phase::Closure,
            &SyncError::item("I100-1", "gone"),
        );
        report.anomaly(Anomaly::StaleReference {
            ticket: "T200 001".into(),
            ref_b: "I100-9".into(),
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failures"][0]["phase"], "closure");
        assert_eq!(json["failures"][0]["kind"], "permanent-on-item");
        assert_eq!(json["anomalies"][0]["type"], "stale-reference");
    }

    #[test]
    fn mutation_total_sums_counters() {
        let counters = Counters {
            incidents_created: 1,
            back_refs_written: 1,
            closed_on_b: 2,
            ..Counters::default()
        };
        assert_eq!(counters.mutations(), 4);
    }
}
