//! Domain vocabulary shared by both sides of the bridge.
//!
//! Identifiers are opaque strings on both systems, so every id and human key
//! gets its own newtype to keep A-side and B-side values from being mixed up.
//! Status values are abstract tokens; adapters map them to whatever the
//! external system stores.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sentinels
// ---------------------------------------------------------------------------

/// Value of `ref_B` / `status_mirror` / the maps when nothing was recorded yet.
pub const NO_COUNTERPART: &str = "No";

/// Map value recorded when mirroring an entry failed; retried every cycle.
pub const MIRROR_ERROR: &str = "error";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Internal id of an A-side ticket.
    TicketId
);
string_newtype!(
    /// Human key of an A-side ticket, e.g. `T200 001`.
    TicketNumber
);
string_newtype!(
    /// Internal id of a B-side incident.
    IncidentId
);
string_newtype!(
    /// Human key of a B-side incident, e.g. `I100-1`.
    IncidentNumber
);
string_newtype!(
    /// Attachment id on either system.
    AttachmentId
);
string_newtype!(
    /// Note id (A) or action id (B).
    NoteId
);

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Which of the two reconciled systems a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum System {
    /// The service-desk backend holding tickets and all bookkeeping fields.
    A,
    /// The customer-facing incident tracker.
    B,
}

impl System {
    pub fn other(self) -> Self {
        match self {
            System::A => System::B,
            System::B => System::A,
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            System::A => write!(f, "A"),
            System::B => write!(f, "B"),
        }
    }
}

// ---------------------------------------------------------------------------
// Status vocabulary
// ---------------------------------------------------------------------------

/// Error returned when a status token is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownToken(pub String);

impl fmt::Display for UnknownToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status token '{}'", self.0)
    }
}

impl std::error::Error for UnknownToken {}

/// Lifecycle status of an A-side ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    #[default]
    New,
    InProgress,
    CustomerNoteAdded,
    Complete,
    Cancelled,
}

impl TicketStatus {
    pub fn all() -> &'static [TicketStatus] {
        &[
            TicketStatus::New,
            TicketStatus::InProgress,
            TicketStatus::CustomerNoteAdded,
            TicketStatus::Complete,
            TicketStatus::Cancelled,
        ]
    }

    pub fn as_token(self) -> &'static str {
        match self {
            TicketStatus::New => "new",
            TicketStatus::InProgress => "in-progress",
            TicketStatus::CustomerNoteAdded => "customer-note-added",
            TicketStatus::Complete => "complete",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    /// `complete` and `cancelled` end the ticket's participation.
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Complete | TicketStatus::Cancelled)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for TicketStatus {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketStatus::all()
            .iter()
            .copied()
            .find(|status| status.as_token() == s.trim())
            .ok_or_else(|| UnknownToken(s.to_owned()))
    }
}

/// Processing status of a B-side incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IncidentStatus {
    #[default]
    New,
    InProgress,
    ResponseReceived,
    Done,
}

impl IncidentStatus {
    pub fn all() -> &'static [IncidentStatus] {
        &[
            IncidentStatus::New,
            IncidentStatus::InProgress,
            IncidentStatus::ResponseReceived,
            IncidentStatus::Done,
        ]
    }

    pub fn as_token(self) -> &'static str {
        match self {
            IncidentStatus::New => "new",
            IncidentStatus::InProgress => "in-progress",
            IncidentStatus::ResponseReceived => "response-received",
            IncidentStatus::Done => "done",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == IncidentStatus::Done
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for IncidentStatus {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IncidentStatus::all()
            .iter()
            .copied()
            .find(|status| status.as_token() == s.trim())
            .ok_or_else(|| UnknownToken(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Bookkeeping fields
// ---------------------------------------------------------------------------

/// Extension scalars on an A-side ticket that this crate owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketField {
    RefB,
    AttachMap,
    NoteMap,
    StatusMirror,
}

impl TicketField {
    /// Field name as it appears in the wire record.
    pub fn wire_name(self) -> &'static str {
        match self {
            TicketField::RefB => "ref_B",
            TicketField::AttachMap => "attach_map",
            TicketField::NoteMap => "note_map",
            TicketField::StatusMirror => "status_mirror",
        }
    }
}

impl fmt::Display for TicketField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Extension scalar on a B-side incident that this crate owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentField {
    ExtA,
}

impl IncidentField {
    pub fn wire_name(self) -> &'static str {
        match self {
            IncidentField::ExtA => "ext_A",
        }
    }
}

impl fmt::Display for IncidentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Marker fields on a B-side incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerField {
    /// Written `done` on closure; `ready` (or `done` on an active incident)
    /// signals that the customer reopened the incident.
    Reopen,
}

impl MarkerField {
    pub fn wire_name(self) -> &'static str {
        match self {
            MarkerField::Reopen => "reopen_marker",
        }
    }
}

/// Values written to / read from [`MarkerField::Reopen`].
pub mod marker {
    pub const READY: &str = "ready";
    pub const DONE: &str = "done";
    pub const CLEARED: &str = "";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
