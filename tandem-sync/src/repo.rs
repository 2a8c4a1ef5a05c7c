//! Repository contracts for the two reconciled systems.
//!
//! Adapters speak wire records ([`tandem_core::wire`]); the cycle converts
//! them to typed values. Neither `create_attachment` nor `create_note`
//! deduplicates; the bookkeeping maps do that.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tandem_core::wire::{
    AttachmentEnvelope, AttachmentRecord, AttachmentUpload, IncidentDraft, IncidentRecord,
    NoteRecord, TicketDraft, TicketRecord,
};
use tandem_core::{
    AttachmentId, IncidentField, IncidentId, IncidentNumber, IncidentStatus, MarkerField, NoteId,
    TicketField, TicketId, TicketNumber, TicketStatus,
};

use crate::error::RepoError;

/// Filter for `list_open`. Terminal items are always excluded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpenQuery {
    /// Only items modified at or after this instant; `None` for everything.
    pub since: Option<DateTime<Utc>>,
    /// A-side account; ignored by B.
    pub account_id: Option<String>,
    /// A-side queues to leave out; ignored by B.
    pub excluded_queues: Vec<i64>,
}

/// System A: the service-desk backend.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn list_open(&self, query: &OpenQuery) -> Result<Vec<TicketRecord>, RepoError>;

    async fn get(&self, id: &TicketId) -> Result<TicketRecord, RepoError>;

    async fn get_by_key(&self, number: &TicketNumber) -> Result<Option<TicketRecord>, RepoError>;

    /// Create a ticket; `ref_B` is written as the sentinel unless the draft
    /// names a counterpart.
    async fn create(&self, draft: TicketDraft) -> Result<TicketRecord, RepoError>;

    /// Atomic single-field write of a bookkeeping scalar.
    async fn update_extension(
        &self,
        id: &TicketId,
        field: TicketField,
        value: String,
    ) -> Result<(), RepoError>;

    async fn list_attachments(&self, parent: &TicketId)
        -> Result<Vec<AttachmentRecord>, RepoError>;

    async fn get_attachment_bytes(
        &self,
        id: &AttachmentId,
    ) -> Result<AttachmentEnvelope, RepoError>;

    async fn create_attachment(
        &self,
        parent: &TicketId,
        upload: AttachmentUpload,
    ) -> Result<AttachmentId, RepoError>;

    async fn list_notes(&self, parent: &TicketId) -> Result<Vec<NoteRecord>, RepoError>;

    /// Returns the new note id when the backend reports it.
    async fn create_note(&self, parent: &TicketId, text: &str)
        -> Result<Option<NoteId>, RepoError>;

    async fn set_status(&self, id: &TicketId, status: TicketStatus) -> Result<(), RepoError>;

    /// Map a B-side caller to an A-side contact.
    async fn contact_for_caller(&self, _caller_id: &str) -> Result<Option<String>, RepoError> {
        Ok(None)
    }

    /// Map an A-side contact to a B-side caller.
    async fn caller_for_contact(&self, _contact_id: &str) -> Result<Option<String>, RepoError> {
        Ok(None)
    }
}

/// System B: the incident tracker.
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    async fn list_open(&self, query: &OpenQuery) -> Result<Vec<IncidentRecord>, RepoError>;

    async fn get(&self, id: &IncidentId) -> Result<IncidentRecord, RepoError>;

    async fn get_by_key(
        &self,
        number: &IncidentNumber,
    ) -> Result<Option<IncidentRecord>, RepoError>;

    async fn create(&self, draft: IncidentDraft) -> Result<IncidentRecord, RepoError>;

    async fn update_extension(
        &self,
        id: &IncidentId,
        field: IncidentField,
        value: String,
    ) -> Result<(), RepoError>;

    async fn list_attachments(
        &self,
        parent: &IncidentId,
    ) -> Result<Vec<AttachmentRecord>, RepoError>;

    async fn get_attachment_bytes(
        &self,
        id: &AttachmentId,
    ) -> Result<AttachmentEnvelope, RepoError>;

    async fn create_attachment(
        &self,
        parent: &IncidentId,
        upload: AttachmentUpload,
    ) -> Result<AttachmentId, RepoError>;

    async fn list_notes(&self, parent: &IncidentId) -> Result<Vec<NoteRecord>, RepoError>;

    /// Returns the new action id when the backend reports it.
    async fn create_note(
        &self,
        parent: &IncidentId,
        text: &str,
    ) -> Result<Option<NoteId>, RepoError>;

    async fn set_status(&self, id: &IncidentId, status: IncidentStatus) -> Result<(), RepoError>;

    async fn set_marker(
        &self,
        id: &IncidentId,
        field: MarkerField,
        value: &str,
    ) -> Result<(), RepoError>;
}
