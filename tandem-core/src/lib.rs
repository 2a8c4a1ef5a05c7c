//! Tandem core library: domain model, wire records, bookkeeping codec, config.
//!
//! - [`types`]: newtypes, status vocabulary, bookkeeping field names
//! - [`wire`]: records exchanged with repository adapters
//! - [`model`]: typed views of those records
//! - [`ext`]: codec for the bookkeeping fields stored on A-side tickets
//! - [`config`]: [`SyncConfig`] loading and validation
//! - [`error`]: [`ModelError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod ext;
pub mod model;
pub mod types;
pub mod wire;

pub use config::{Credentials, KeyFilter, SyncConfig};
pub use error::{ConfigError, ModelError};
pub use ext::{ExtField, MirrorMap, MirrorSlot};
pub use model::{Attachment, Incident, Note, Ticket};
pub use types::{
    AttachmentId, IncidentField, IncidentId, IncidentNumber, IncidentStatus, MarkerField, NoteId,
    System, TicketField, TicketId, TicketNumber, TicketStatus,
};
