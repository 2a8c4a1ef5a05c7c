//! Typed views of the wire records.
//!
//! Conversion happens once, where records leave the repository layer. A
//! record that cannot be converted is a schema violation for that item only.

use chrono::{DateTime, Utc};

use crate::error::ModelError;
use crate::ext::{self, ExtField, MirrorMap};
use crate::types::{
    AttachmentId, IncidentId, IncidentNumber, IncidentStatus, NoteId, TicketId, TicketNumber,
    TicketStatus,
};
use crate::wire::{AttachmentRecord, IncidentRecord, NoteRecord, TicketRecord};

/// An A-side ticket with its bookkeeping fields parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: TicketId,
    pub number: TicketNumber,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub queue_id: Option<i64>,
    pub contact_id: Option<String>,
    /// Counterpart incident number; `None` for the `"No"` sentinel.
    pub ref_b: Option<IncidentNumber>,
    pub attach_map: ExtField<MirrorMap>,
    pub note_map: ExtField<MirrorMap>,
    pub status_mirror: ExtField<TicketStatus>,
}

impl TryFrom<TicketRecord> for Ticket {
    type Error = ModelError;

    fn try_from(record: TicketRecord) -> Result<Self, Self::Error> {
        let schema = |reason: String| ModelError::Schema {
            record: "ticket",
            key: if record.number.is_empty() {
                record.id.clone()
            } else {
                record.number.clone()
            },
            reason,
        };
        if record.id.trim().is_empty() {
            return Err(schema("missing id".to_owned()));
        }
        if record.number.trim().is_empty() {
            return Err(schema("missing number".to_owned()));
        }
        let status = record
            .status
            .parse::<TicketStatus>()
            .map_err(|e| schema(e.to_string()))?;

        Ok(Ticket {
            id: TicketId(record.id),
            number: TicketNumber(record.number.trim().to_owned()),
            title: record.title,
            description: record.description,
            status,
            queue_id: record.queue_id,
            contact_id: record.contact_id.filter(|c| !c.is_empty()),
            ref_b: ext::parse_ref(&record.ref_b),
            attach_map: MirrorMap::parse_field(&record.attach_map),
            note_map: MirrorMap::parse_field(&record.note_map),
            status_mirror: ext::parse_status_mirror(&record.status_mirror),
        })
    }
}

/// A B-side incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    pub id: IncidentId,
    pub number: IncidentNumber,
    pub brief_description: String,
    pub request: String,
    pub status: IncidentStatus,
    pub caller_id: Option<String>,
    /// Raw counterpart reference; normalized by the key filter before use.
    pub ext_a: Option<String>,
    pub reopen_marker: String,
}

impl TryFrom<IncidentRecord> for Incident {
    type Error = ModelError;

    fn try_from(record: IncidentRecord) -> Result<Self, Self::Error> {
        let schema = |reason: String| ModelError::Schema {
            record: "incident",
            key: if record.number.is_empty() {
                record.id.clone()
            } else {
                record.number.clone()
            },
            reason,
        };
        if record.id.trim().is_empty() {
            return Err(schema("missing id".to_owned()));
        }
        if record.number.trim().is_empty() {
            return Err(schema("missing number".to_owned()));
        }
        let status = record
            .processing_status_id
            .parse::<IncidentStatus>()
            .map_err(|e| schema(e.to_string()))?;

        let ext_a = Some(record.ext_a).filter(|raw| !raw.trim().is_empty());
        Ok(Incident {
            id: IncidentId(record.id),
            number: IncidentNumber(record.number.trim().to_owned()),
            brief_description: record.brief_description,
            request: record.request,
            status,
            caller_id: record.caller_id.filter(|c| !c.is_empty()),
            ext_a,
            reopen_marker: record.reopen_marker,
        })
    }
}

/// Attachment metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: AttachmentId,
    pub file_name: String,
    pub content_type: String,
    pub description: String,
}

impl From<AttachmentRecord> for Attachment {
    fn from(record: AttachmentRecord) -> Self {
        Attachment {
            id: AttachmentId(record.id),
            file_name: record.file_name,
            content_type: record.content_type,
            description: record.description,
        }
    }
}

/// A note (A) or action (B).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<NoteRecord> for Note {
    fn from(record: NoteRecord) -> Self {
        Note {
            id: NoteId(record.id),
            text: record.text,
            created_at: record.created_at,
        }
    }
}
