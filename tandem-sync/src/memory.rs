//! In-memory repositories.
//!
//! Deterministic reference implementations of both repository traits:
//!
//! - tickets are numbered `T200 001`, `T200 002`, ...; incidents `I100-1`, ...
//! - attachment ids are `α1`, `α2`, ... on A and `β1`, `β2`, ... on B
//! - note ids are `n1`, ... on A and `act1`, ... on B; creating an incident
//!   adds the usual `Initial action` entry
//!
//! Every successful mutation is appended to a log (see
//! [`InMemoryTickets::mutations`]); seeding and inspection helpers are not
//! logged. Faults can be injected to exercise failure paths.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tandem_core::wire::{
    AttachmentEnvelope, AttachmentRecord, AttachmentUpload, IncidentDraft, IncidentRecord,
    NoteRecord, TicketDraft, TicketRecord,
};
use tandem_core::{
    AttachmentId, IncidentField, IncidentId, IncidentNumber, IncidentStatus, MarkerField, NoteId,
    System, TicketField, TicketId, TicketNumber, TicketStatus,
};
use tandem_core::types::NO_COUNTERPART;

use crate::error::RepoError;
use crate::repo::{IncidentRepository, OpenQuery, TicketRepository};

/// Text of the action System B adds to every new incident.
pub const INITIAL_ACTION: &str = "Initial action";

/// One logged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub system: System,
    pub op: &'static str,
    /// Human key of the item touched, with the field for extension writes.
    pub target: String,
}

// ---------------------------------------------------------------------------
// Shared storage
// ---------------------------------------------------------------------------

trait Item: Clone {
    fn id(&self) -> &str;
    fn number(&self) -> &str;
    fn is_terminal(&self) -> bool;
}

impl Item for TicketRecord {
    fn id(&self) -> &str {
        &self.id
    }
    fn number(&self) -> &str {
        &self.number
    }
    fn is_terminal(&self) -> bool {
        self.status
            .parse::<TicketStatus>()
            .is_ok_and(TicketStatus::is_terminal)
    }
}

impl Item for IncidentRecord {
    fn id(&self) -> &str {
        &self.id
    }
    fn number(&self) -> &str {
        &self.number
    }
    fn is_terminal(&self) -> bool {
        self.processing_status_id
            .parse::<IncidentStatus>()
            .is_ok_and(IncidentStatus::is_terminal)
    }
}

#[derive(Debug, Clone)]
struct Stored<R> {
    record: R,
    account: Option<String>,
    modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredAttachment {
    parent: String,
    record: AttachmentRecord,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct StoredNote {
    parent: String,
    record: NoteRecord,
}

#[derive(Debug, Default)]
struct Faults {
    fail_uploads: usize,
    fail_note_creates: usize,
    fail_updates: usize,
    fail_listing: bool,
    delay: Option<Duration>,
    hide_note_ids: bool,
    list_terminal: bool,
}

struct Shelf<R> {
    system: System,
    kind: &'static str,
    items: Vec<Stored<R>>,
    attachments: Vec<StoredAttachment>,
    notes: Vec<StoredNote>,
    next_item: u32,
    next_attachment: u32,
    next_note: u32,
    last_tick: Option<DateTime<Utc>>,
    log: Vec<Mutation>,
    faults: Faults,
}

impl<R: Item> Shelf<R> {
    fn new(system: System, kind: &'static str) -> Self {
        Self {
            system,
            kind,
            items: Vec::new(),
            attachments: Vec::new(),
            notes: Vec::new(),
            next_item: 0,
            next_attachment: 0,
            next_note: 0,
            last_tick: None,
            log: Vec::new(),
            faults: Faults::default(),
        }
    }

    /// Wall-clock time, strictly increasing across calls.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let now = match self.last_tick {
            Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_tick = Some(now);
        now
    }

    fn log(&mut self, op: &'static str, target: impl Into<String>) {
        self.log.push(Mutation {
            system: self.system,
            op,
            target: target.into(),
        });
    }

    fn insert(&mut self, record: R, account: Option<String>) {
        let modified_at = self.tick();
        self.items.push(Stored {
            record,
            account,
            modified_at,
        });
    }

    fn by_id(&self, id: &str) -> Result<&Stored<R>, RepoError> {
        self.items
            .iter()
            .find(|s| s.record.id() == id)
            .ok_or_else(|| RepoError::NotFound {
                kind: self.kind,
                key: id.to_owned(),
            })
    }

    fn by_id_mut(&mut self, id: &str) -> Result<&mut Stored<R>, RepoError> {
        let kind = self.kind;
        self.items
            .iter_mut()
            .find(|s| s.record.id() == id)
            .ok_or_else(|| RepoError::NotFound {
                kind,
                key: id.to_owned(),
            })
    }

    fn by_number_mut(&mut self, number: &str) -> Option<&mut Stored<R>> {
        self.items
            .iter_mut()
            .find(|s| s.record.number() == number)
    }

    /// Apply `change` to the item `id`, bump its modification time and log.
    fn modify(
        &mut self,
        id: &str,
        op: &'static str,
        field: Option<&str>,
        change: impl FnOnce(&mut R),
    ) -> Result<(), RepoError> {
        let now = self.tick();
        let stored = self.by_id_mut(id)?;
        change(&mut stored.record);
        stored.modified_at = now;
        let target = match field {
            Some(field) => format!("{}.{field}", stored.record.number()),
            None => stored.record.number().to_owned(),
        };
        self.log(op, target);
        Ok(())
    }

    fn list_open(&self, query: &OpenQuery, keep: impl Fn(&Stored<R>) -> bool) -> Vec<R> {
        self.items
            .iter()
            .filter(|s| self.faults.list_terminal || !s.record.is_terminal())
            .filter(|s| query.since.map_or(true, |since| s.modified_at >= since))
            .filter(|s| keep(s))
            .map(|s| s.record.clone())
            .collect()
    }

    fn fresh_id(&mut self, make: impl Fn(u32) -> String) -> String {
        loop {
            self.next_item += 1;
            let candidate = make(self.next_item);
            if !self.items.iter().any(|s| s.record.id() == candidate) {
                return candidate;
            }
        }
    }

    fn fresh_number(&self, make: impl Fn(u32) -> String) -> String {
        (1..)
            .map(&make)
            .find(|n| !self.items.iter().any(|s| s.record.number() == n))
            .unwrap_or_else(|| make(0))
    }

    fn add_attachment(&mut self, parent: &str, prefix: &str, upload: AttachmentUpload) -> String {
        self.next_attachment += 1;
        let id = format!("{prefix}{}", self.next_attachment);
        self.attachments.push(StoredAttachment {
            parent: parent.to_owned(),
            record: AttachmentRecord {
                id: id.clone(),
                file_name: upload.file_name,
                content_type: upload.content_type,
                description: upload.description,
            },
            bytes: upload.bytes,
        });
        id
    }

    fn add_note(&mut self, parent: &str, prefix: &str, text: &str) -> String {
        self.next_note += 1;
        let id = format!("{prefix}{}", self.next_note);
        let created_at = self.tick();
        self.notes.push(StoredNote {
            parent: parent.to_owned(),
            record: NoteRecord {
                id: id.clone(),
                text: text.to_owned(),
                created_at,
            },
        });
        id
    }

    fn list_attachments(&self, parent: &str) -> Result<Vec<AttachmentRecord>, RepoError> {
        self.by_id(parent)?;
        Ok(self
            .attachments
            .iter()
            .filter(|a| a.parent == parent)
            .map(|a| a.record.clone())
            .collect())
    }

    fn envelope(&self, id: &str) -> Result<AttachmentEnvelope, RepoError> {
        self.attachments
            .iter()
            .find(|a| a.record.id == id)
            .map(|a| AttachmentEnvelope::from_bytes(id, &a.bytes))
            .ok_or_else(|| RepoError::NotFound {
                kind: "attachment",
                key: id.to_owned(),
            })
    }

    fn upload(
        &mut self,
        parent: &str,
        prefix: &str,
        upload: AttachmentUpload,
    ) -> Result<AttachmentId, RepoError> {
        if self.faults.fail_uploads > 0 {
            self.faults.fail_uploads -= 1;
            return Err(RepoError::Transient("injected upload failure".to_owned()));
        }
        let number = self.by_id(parent)?.record.number().to_owned();
        let id = self.add_attachment(parent, prefix, upload);
        self.log("create_attachment", format!("{number}/{id}"));
        Ok(AttachmentId(id))
    }

    fn list_notes(&self, parent: &str) -> Result<Vec<NoteRecord>, RepoError> {
        self.by_id(parent)?;
        let mut notes: Vec<NoteRecord> = self
            .notes
            .iter()
            .filter(|n| n.parent == parent)
            .map(|n| n.record.clone())
            .collect();
        notes.sort_by(|x, y| x.created_at.cmp(&y.created_at));
        Ok(notes)
    }

    fn create_note(
        &mut self,
        parent: &str,
        prefix: &str,
        text: &str,
    ) -> Result<Option<NoteId>, RepoError> {
        if self.faults.fail_note_creates > 0 {
            self.faults.fail_note_creates -= 1;
            return Err(RepoError::Transient("injected note failure".to_owned()));
        }
        let number = self.by_id(parent)?.record.number().to_owned();
        let id = self.add_note(parent, prefix, text);
        self.log("create_note", format!("{number}/{id}"));
        Ok((!self.faults.hide_note_ids).then_some(NoteId(id)))
    }

    fn check_update(&mut self) -> Result<(), RepoError> {
        if self.faults.fail_updates > 0 {
            self.faults.fail_updates -= 1;
            return Err(RepoError::Transient("injected update failure".to_owned()));
        }
        Ok(())
    }

    fn check_listing(&self) -> Result<(), RepoError> {
        if self.faults.fail_listing {
            return Err(RepoError::Transient("injected listing failure".to_owned()));
        }
        Ok(())
    }

    fn bytes(&self, id: &str) -> Option<Vec<u8>> {
        self.attachments
            .iter()
            .find(|a| a.record.id == id)
            .map(|a| a.bytes.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn pause<R>(shelf: &Mutex<Shelf<R>>) {
    let delay = lock(shelf).faults.delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

/// Fault injection shared by both repositories.
macro_rules! fault_controls {
    () => {
        /// Fail the next `n` attachment uploads with a transient error.
        pub fn fail_next_uploads(&self, n: usize) {
            lock(&self.shelf).faults.fail_uploads = n;
        }

        /// Fail the next `n` note creations with a transient error.
        pub fn fail_next_note_creates(&self, n: usize) {
            lock(&self.shelf).faults.fail_note_creates = n;
        }

        /// Fail the next `n` extension field updates with a transient error.
        pub fn fail_next_extension_updates(&self, n: usize) {
            lock(&self.shelf).faults.fail_updates = n;
        }

        /// Make `list_open` fail until switched off again.
        pub fn fail_listing(&self, fail: bool) {
            lock(&self.shelf).faults.fail_listing = fail;
        }

        /// Delay every call by `delay`.
        pub fn set_delay(&self, delay: Option<Duration>) {
            lock(&self.shelf).faults.delay = delay;
        }

        /// Report `None` from `create_note`, like adapters that cannot learn
        /// the created id.
        pub fn hide_created_note_ids(&self, hide: bool) {
            lock(&self.shelf).faults.hide_note_ids = hide;
        }

        /// Include terminal items in `list_open`, like a lagging open filter.
        pub fn list_terminal(&self, include: bool) {
            lock(&self.shelf).faults.list_terminal = include;
        }

        pub fn mutations(&self) -> Vec<Mutation> {
            lock(&self.shelf).log.clone()
        }

        pub fn clear_mutations(&self) {
            lock(&self.shelf).log.clear();
        }

        /// Bytes of attachment `id`.
        pub fn attachment_bytes(&self, id: &str) -> Option<Vec<u8>> {
            lock(&self.shelf).bytes(id)
        }
    };
}

// ---------------------------------------------------------------------------
// System A
// ---------------------------------------------------------------------------

/// In-memory System A.
pub struct InMemoryTickets {
    account_id: String,
    shelf: Mutex<Shelf<TicketRecord>>,
    contacts: Mutex<HashMap<String, String>>,
}

impl InMemoryTickets {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            shelf: Mutex::new(Shelf::new(System::A, "ticket")),
            contacts: Mutex::new(HashMap::new()),
        }
    }

    fault_controls!();

    /// Seed a ticket belonging to this repository's account.
    pub fn insert(&self, record: TicketRecord) -> TicketId {
        let id = TicketId(record.id.clone());
        lock(&self.shelf).insert(record, Some(self.account_id.clone()));
        id
    }

    /// Seed a ticket belonging to another account.
    pub fn insert_for_account(&self, record: TicketRecord, account: &str) -> TicketId {
        let id = TicketId(record.id.clone());
        lock(&self.shelf).insert(record, Some(account.to_owned()));
        id
    }

    pub fn add_attachment(&self, parent: &TicketId, file_name: &str, bytes: &[u8]) -> AttachmentId {
        let upload = AttachmentUpload {
            file_name: file_name.to_owned(),
            content_type: "application/octet-stream".to_owned(),
            bytes: bytes.to_vec(),
            description: String::new(),
        };
        AttachmentId(lock(&self.shelf).add_attachment(parent.as_str(), "α", upload))
    }

    pub fn add_note(&self, parent: &TicketId, text: &str) -> NoteId {
        NoteId(lock(&self.shelf).add_note(parent.as_str(), "n", text))
    }

    /// Register a caller (B) to contact (A) mapping.
    pub fn map_contact(&self, caller_id: &str, contact_id: &str) {
        lock(&self.contacts).insert(caller_id.to_owned(), contact_id.to_owned());
    }

    /// Change a ticket the way a user of System A would; not logged.
    pub fn edit(&self, number: &str, change: impl FnOnce(&mut TicketRecord)) -> bool {
        let mut shelf = lock(&self.shelf);
        let now = shelf.tick();
        match shelf.by_number_mut(number) {
            Some(stored) => {
                change(&mut stored.record);
                stored.modified_at = now;
                true
            }
            None => false,
        }
    }

    /// Pretend the ticket was last modified at `at`.
    pub fn touch_at(&self, number: &str, at: DateTime<Utc>) -> bool {
        match lock(&self.shelf).by_number_mut(number) {
            Some(stored) => {
                stored.modified_at = at;
                true
            }
            None => false,
        }
    }

    pub fn ticket(&self, number: &str) -> Option<TicketRecord> {
        lock(&self.shelf)
            .items
            .iter()
            .find(|s| s.record.number == number)
            .map(|s| s.record.clone())
    }

    pub fn tickets(&self) -> Vec<TicketRecord> {
        lock(&self.shelf)
            .items
            .iter()
            .map(|s| s.record.clone())
            .collect()
    }

    pub fn attachments_of(&self, id: &TicketId) -> Vec<AttachmentRecord> {
        lock(&self.shelf)
            .list_attachments(id.as_str())
            .unwrap_or_default()
    }

    pub fn notes_of(&self, id: &TicketId) -> Vec<NoteRecord> {
        lock(&self.shelf).list_notes(id.as_str()).unwrap_or_default()
    }
}

#[async_trait]
impl TicketRepository for InMemoryTickets {
    async fn list_open(&self, query: &OpenQuery) -> Result<Vec<TicketRecord>, RepoError> {
        pause(&self.shelf).await;
        let shelf = lock(&self.shelf);
        shelf.check_listing()?;
        Ok(shelf.list_open(query, |s| {
            let account_ok = match (&query.account_id, &s.account) {
                (Some(wanted), Some(account)) => wanted == account,
                _ => true,
            };
            let queue_ok = s
                .record
                .queue_id
                .map_or(true, |q| !query.excluded_queues.contains(&q));
            account_ok && queue_ok
        }))
    }

    async fn get(&self, id: &TicketId) -> Result<TicketRecord, RepoError> {
        pause(&self.shelf).await;
        Ok(lock(&self.shelf).by_id(id.as_str())?.record.clone())
    }

    async fn get_by_key(&self, number: &TicketNumber) -> Result<Option<TicketRecord>, RepoError> {
        pause(&self.shelf).await;
        Ok(self.ticket(number.as_str()))
    }

    async fn create(&self, draft: TicketDraft) -> Result<TicketRecord, RepoError> {
        pause(&self.shelf).await;
        let mut shelf = lock(&self.shelf);
        let id = shelf.fresh_id(|n| n.to_string());
        let number = shelf.fresh_number(|n| format!("T200 {n:03}"));
        let mut record = TicketRecord::new(id, number.clone(), draft.status);
        record.title = draft.title;
        record.description = draft.description;
        record.contact_id = draft.contact_id;
        record.ref_b = draft
            .ref_b
            .unwrap_or_else(|| NO_COUNTERPART.to_owned());
        shelf.insert(record.clone(), Some(self.account_id.clone()));
        shelf.log("create", number);
        Ok(record)
    }

    async fn update_extension(
        &self,
        id: &TicketId,
        field: TicketField,
        value: String,
    ) -> Result<(), RepoError> {
        pause(&self.shelf).await;
        let mut shelf = lock(&self.shelf);
        shelf.check_update()?;
        shelf.modify(
            id.as_str(),
            "update_extension",
            Some(field.wire_name()),
            |record| match field {
                TicketField::RefB => record.ref_b = value,
                TicketField::AttachMap => record.attach_map = value,
                TicketField::NoteMap => record.note_map = value,
                TicketField::StatusMirror => record.status_mirror = value,
            },
        )
    }

    async fn list_attachments(
        &self,
        parent: &TicketId,
    ) -> Result<Vec<AttachmentRecord>, RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).list_attachments(parent.as_str())
    }

    async fn get_attachment_bytes(
        &self,
        id: &AttachmentId,
    ) -> Result<AttachmentEnvelope, RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).envelope(id.as_str())
    }

    async fn create_attachment(
        &self,
        parent: &TicketId,
        upload: AttachmentUpload,
    ) -> Result<AttachmentId, RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).upload(parent.as_str(), "α", upload)
    }

    async fn list_notes(&self, parent: &TicketId) -> Result<Vec<NoteRecord>, RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).list_notes(parent.as_str())
    }

    async fn create_note(
        &self,
        parent: &TicketId,
        text: &str,
    ) -> Result<Option<NoteId>, RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).create_note(parent.as_str(), "n", text)
    }

    async fn set_status(&self, id: &TicketId, status: TicketStatus) -> Result<(), RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).modify(id.as_str(), "set_status", None, |record| {
            record.status = status.as_token().to_owned();
        })
    }

    async fn contact_for_caller(&self, caller_id: &str) -> Result<Option<String>, RepoError> {
        Ok(lock(&self.contacts).get(caller_id).cloned())
    }

    async fn caller_for_contact(&self, contact_id: &str) -> Result<Option<String>, RepoError> {
        Ok(lock(&self.contacts)
            .iter()
            .find(|(_, contact)| contact.as_str() == contact_id)
            .map(|(caller, _)| caller.clone()))
    }
}

// ---------------------------------------------------------------------------
// System B
// ---------------------------------------------------------------------------

/// In-memory System B.
pub struct InMemoryIncidents {
    shelf: Mutex<Shelf<IncidentRecord>>,
}

impl Default for InMemoryIncidents {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIncidents {
    pub fn new() -> Self {
        Self {
            shelf: Mutex::new(Shelf::new(System::B, "incident")),
        }
    }

    fault_controls!();

    pub fn insert(&self, record: IncidentRecord) -> IncidentId {
        let id = IncidentId(record.id.clone());
        lock(&self.shelf).insert(record, None);
        id
    }

    pub fn add_attachment(
        &self,
        parent: &IncidentId,
        file_name: &str,
        bytes: &[u8],
    ) -> AttachmentId {
        let upload = AttachmentUpload {
            file_name: file_name.to_owned(),
            content_type: "application/octet-stream".to_owned(),
            bytes: bytes.to_vec(),
            description: String::new(),
        };
        AttachmentId(lock(&self.shelf).add_attachment(parent.as_str(), "β", upload))
    }

    pub fn add_action(&self, parent: &IncidentId, text: &str) -> NoteId {
        NoteId(lock(&self.shelf).add_note(parent.as_str(), "act", text))
    }

    /// Change an incident the way a user of System B would; not logged.
    pub fn edit(&self, number: &str, change: impl FnOnce(&mut IncidentRecord)) -> bool {
        let mut shelf = lock(&self.shelf);
        let now = shelf.tick();
        match shelf.by_number_mut(number) {
            Some(stored) => {
                change(&mut stored.record);
                stored.modified_at = now;
                true
            }
            None => false,
        }
    }

    pub fn touch_at(&self, number: &str, at: DateTime<Utc>) -> bool {
        match lock(&self.shelf).by_number_mut(number) {
            Some(stored) => {
                stored.modified_at = at;
                true
            }
            None => false,
        }
    }

    pub fn incident(&self, number: &str) -> Option<IncidentRecord> {
        lock(&self.shelf)
            .items
            .iter()
            .find(|s| s.record.number == number)
            .map(|s| s.record.clone())
    }

    pub fn incidents(&self) -> Vec<IncidentRecord> {
        lock(&self.shelf)
            .items
            .iter()
            .map(|s| s.record.clone())
            .collect()
    }

    pub fn attachments_of(&self, id: &IncidentId) -> Vec<AttachmentRecord> {
        lock(&self.shelf)
            .list_attachments(id.as_str())
            .unwrap_or_default()
    }

    pub fn actions_of(&self, id: &IncidentId) -> Vec<NoteRecord> {
        lock(&self.shelf).list_notes(id.as_str()).unwrap_or_default()
    }
}

#[async_trait]
impl IncidentRepository for InMemoryIncidents {
    async fn list_open(&self, query: &OpenQuery) -> Result<Vec<IncidentRecord>, RepoError> {
        pause(&self.shelf).await;
        let shelf = lock(&self.shelf);
        shelf.check_listing()?;
        Ok(shelf.list_open(query, |_| true))
    }

    async fn get(&self, id: &IncidentId) -> Result<IncidentRecord, RepoError> {
        pause(&self.shelf).await;
        Ok(lock(&self.shelf).by_id(id.as_str())?.record.clone())
    }

    async fn get_by_key(
        &self,
        number: &IncidentNumber,
    ) -> Result<Option<IncidentRecord>, RepoError> {
        pause(&self.shelf).await;
        Ok(self.incident(number.as_str()))
    }

    async fn create(&self, draft: IncidentDraft) -> Result<IncidentRecord, RepoError> {
        pause(&self.shelf).await;
        let mut shelf = lock(&self.shelf);
        let id = shelf.fresh_id(|n| format!("inc-{n}"));
        let number = shelf.fresh_number(|n| format!("I100-{n}"));
        let mut record = IncidentRecord::new(id.clone(), number.clone(), draft.status);
        record.brief_description = draft.brief_description;
        record.request = draft.request;
        record.caller_id = draft.caller_id;
        record.ext_a = draft.ext_a;
        shelf.insert(record.clone(), None);
        shelf.add_note(&id, "act", &format!("{INITIAL_ACTION}: {}", record.request));
        shelf.log("create", number);
        Ok(record)
    }

    async fn update_extension(
        &self,
        id: &IncidentId,
        field: IncidentField,
        value: String,
    ) -> Result<(), RepoError> {
        pause(&self.shelf).await;
        let mut shelf = lock(&self.shelf);
        shelf.check_update()?;
        shelf.modify(
            id.as_str(),
            "update_extension",
            Some(field.wire_name()),
            |record| match field {
                IncidentField::ExtA => record.ext_a = value,
            },
        )
    }

    async fn list_attachments(
        &self,
        parent: &IncidentId,
    ) -> Result<Vec<AttachmentRecord>, RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).list_attachments(parent.as_str())
    }

    async fn get_attachment_bytes(
        &self,
        id: &AttachmentId,
    ) -> Result<AttachmentEnvelope, RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).envelope(id.as_str())
    }

    async fn create_attachment(
        &self,
        parent: &IncidentId,
        upload: AttachmentUpload,
    ) -> Result<AttachmentId, RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).upload(parent.as_str(), "β", upload)
    }

    async fn list_notes(&self, parent: &IncidentId) -> Result<Vec<NoteRecord>, RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).list_notes(parent.as_str())
    }

    async fn create_note(
        &self,
        parent: &IncidentId,
        text: &str,
    ) -> Result<Option<NoteId>, RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).create_note(parent.as_str(), "act", text)
    }

    async fn set_status(&self, id: &IncidentId, status: IncidentStatus) -> Result<(), RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).modify(id.as_str(), "set_status", None, |record| {
            record.processing_status_id = status.as_token().to_owned();
        })
    }

    async fn set_marker(
        &self,
        id: &IncidentId,
        field: MarkerField,
        value: &str,
    ) -> Result<(), RepoError> {
        pause(&self.shelf).await;
        lock(&self.shelf).modify(
            id.as_str(),
            "set_marker",
            Some(field.wire_name()),
            |record| match field {
                MarkerField::Reopen => record.reopen_marker = value.to_owned(),
            },
        )
    }
}
