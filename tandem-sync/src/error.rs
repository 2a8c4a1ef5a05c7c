//! Error types for tandem-sync.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use tandem_core::{ModelError, System};

/// Failures reported by repository adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    /// Network timeout, 5xx, rate limit; worth retrying next cycle.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The addressed item does not exist (any more).
    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    /// The backend refused the request for this item.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The backend answered with a payload the adapter could not interpret.
    #[error("unexpected payload: {0}")]
    Schema(String),
}

/// Coarse classification used for reporting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Transient,
    PermanentOnItem,
    SchemaViolation,
    InconsistentReference,
    Fatal,
}

/// All errors that can arise while running a reconciliation cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote call returned an error.
    #[error("{system} {op} failed: {source}")]
    Remote {
        system: System,
        op: &'static str,
        #[source]
        source: RepoError,
    },

    /// A remote call did not answer within the configured bound.
    #[error("{system} {op} timed out after {after:?}")]
    Timeout {
        system: System,
        op: &'static str,
        after: Duration,
    },

    /// A record or bookkeeping field could not be interpreted.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The item cannot be processed as it stands.
    #[error("{item}: {reason}")]
    Item { item: String, reason: String },

    /// Both sides carry references that disagree.
    #[error("ticket {ticket} references {ref_b} but incident {incident} references {ext_a}")]
    Inconsistent {
        ticket: String,
        ref_b: String,
        incident: String,
        ext_a: String,
    },

    /// Neither system could be enumerated; the cycle was aborted.
    #[error("both systems unreachable (A: {a}; B: {b})")]
    Unreachable {
        a: Box<SyncError>,
        b: Box<SyncError>,
    },

    #[error("a reconciliation cycle is already running")]
    CycleInProgress,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Remote { source, .. } => match source {
                RepoError::Transient(_) => ErrorKind::Transient,
                RepoError::NotFound { .. } | RepoError::Rejected(_) => ErrorKind::PermanentOnItem,
                RepoError::Schema(_) => ErrorKind::SchemaViolation,
            },
            SyncError::Timeout { .. } => ErrorKind::Transient,
            SyncError::Model(model) => match model {
                ModelError::Schema { .. } | ModelError::Payload { .. } => {
                    ErrorKind::SchemaViolation
                }
                ModelError::Extension { .. } => ErrorKind::PermanentOnItem,
            },
            SyncError::Item { .. } => ErrorKind::PermanentOnItem,
            SyncError::Inconsistent { .. } => ErrorKind::InconsistentReference,
            SyncError::Unreachable { .. } | SyncError::CycleInProgress => ErrorKind::Fatal,
        }
    }

    /// The system a remote call was addressed to, if this is a remote error.
    pub fn system(&self) -> Option<System> {
        match self {
            SyncError::Remote { system, .. } | SyncError::Timeout { system, .. } => Some(*system),
            _ => None,
        }
    }

    pub(crate) fn item(item: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::Item {
            item: item.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_are_classified_by_source() {
        let transient = SyncError::Remote {
            system: System::B,
            op: "create_attachment",
            source: RepoError::Transient("503".into()),
        };
        assert_eq!(transient.kind(), ErrorKind::Transient);
        assert!(transient.to_string().starts_with("B create_attachment failed"));

        let gone = SyncError::Remote {
            system: System::A,
            op: "get",
            source: RepoError::NotFound {
                kind: "ticket",
                key: "7".into(),
            },
        };
        assert_eq!(gone.kind(), ErrorKind::PermanentOnItem);
    }

    #[test]
    fn timeouts_are_transient() {
        let err = SyncError::Timeout {
            system: System::A,
            op: "list_open",
            after: Duration::from_secs(30),
        };
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn malformed_extension_is_permanent_on_item() {
        let err = SyncError::from(ModelError::Extension {
            field: "attach_map",
            raw: "{".into(),
            reason: "unterminated".into(),
        });
        assert_eq!(err.kind(), ErrorKind::PermanentOnItem);
    }

    #[test]
    fn remote_errors_name_their_system() {
        let err = SyncError::Timeout {
            system: System::B,
            op: "update_extension",
            after: Duration::from_secs(30),
        };
        assert_eq!(err.system(), Some(System::B));
        assert_eq!(SyncError::item("I100-1", "gone").system(), None);
    }

    #[test]
    fn lock_contention_is_fatal() {
        assert_eq!(SyncError::CycleInProgress.kind(), ErrorKind::Fatal);
    }
}
