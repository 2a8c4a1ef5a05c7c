//! Wire shapes exchanged with repository adapters.
//!
//! Field names follow the records the adapters already produce; the
//! bookkeeping fields stay plain strings here and are parsed by
//! [`crate::model`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::types::{IncidentStatus, TicketStatus, NO_COUNTERPART};

fn no_counterpart() -> String {
    NO_COUNTERPART.to_owned()
}

/// A-side ticket as delivered by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: String,
    pub number: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(rename = "ref_B", default = "no_counterpart")]
    pub ref_b: String,
    #[serde(default = "no_counterpart")]
    pub attach_map: String,
    #[serde(default = "no_counterpart")]
    pub note_map: String,
    #[serde(default = "no_counterpart")]
    pub status_mirror: String,
}

impl TicketRecord {
    /// A ticket with empty text fields and every bookkeeping field unset.
    pub fn new(id: impl Into<String>, number: impl Into<String>, status: TicketStatus) -> Self {
        Self {
            id: id.into(),
            number: number.into(),
            title: String::new(),
            description: String::new(),
            status: status.as_token().to_owned(),
            queue_id: None,
            contact_id: None,
            ref_b: no_counterpart(),
            attach_map: no_counterpart(),
            note_map: no_counterpart(),
            status_mirror: no_counterpart(),
        }
    }
}

/// B-side incident as delivered by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: String,
    pub number: String,
    #[serde(default)]
    pub brief_description: String,
    #[serde(default)]
    pub request: String,
    pub processing_status_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    #[serde(rename = "ext_A", default)]
    pub ext_a: String,
    #[serde(default)]
    pub reopen_marker: String,
}

impl IncidentRecord {
    /// An incident without a counterpart reference or reopen marker.
    pub fn new(id: impl Into<String>, number: impl Into<String>, status: IncidentStatus) -> Self {
        Self {
            id: id.into(),
            number: number.into(),
            brief_description: String::new(),
            request: String::new(),
            processing_status_id: status.as_token().to_owned(),
            caller_id: None,
            ext_a: String::new(),
            reopen_marker: String::new(),
        }
    }
}

/// Attachment metadata (either side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub id: String,
    #[serde(rename = "filename", alias = "fileName")]
    pub file_name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub description: String,
}

/// Note (A) or action (B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: String,
    #[serde(alias = "memoText", alias = "description")]
    pub text: String,
    #[serde(alias = "entryDate")]
    pub created_at: DateTime<Utc>,
}

/// Attachment content as downloaded: base64 text inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentEnvelope {
    pub attachment_id: String,
    pub data: String,
}

impl AttachmentEnvelope {
    pub fn from_bytes(attachment_id: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            attachment_id: attachment_id.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Decode the payload. Line breaks inserted by MIME encoders are ignored.
    pub fn decode(&self) -> Result<Vec<u8>, ModelError> {
        let compact: String = self.data.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| ModelError::Payload {
                attachment: self.attachment_id.clone(),
                reason: e.to_string(),
            })
    }
}

/// Everything needed to upload an attachment to either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub description: String,
}

/// Input for creating an A-side ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDraft {
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    /// Number of the B-side counterpart, or `None` to write the sentinel.
    pub ref_b: Option<String>,
    pub contact_id: Option<String>,
}

/// Input for creating a B-side incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentDraft {
    pub brief_description: String,
    pub request: String,
    pub status: IncidentStatus,
    /// Number of the A-side counterpart; empty when none.
    pub ext_a: String,
    pub caller_id: Option<String>,
}
