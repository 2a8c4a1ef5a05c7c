//! # tandem-sync
//!
//! Bidirectional reconciliation between a ticket system (A) and an incident
//! system (B).
//!
//! Build an [`Orchestrator`] over a [`TicketRepository`] and an
//! [`IncidentRepository`] and call [`Orchestrator::run_cycle`] periodically.
//! [`memory`] provides in-process implementations of both repositories.

mod attachments;
mod closure;
mod context;
pub mod correlate;
mod cycle;
pub mod error;
mod linker;
pub mod memory;
mod notes;
pub mod report;
pub mod repo;
mod status;

pub use correlate::{correlate, Correlation, Orphan, OrphanReason, Pair};
pub use cycle::{Orchestrator, Progress};
pub use error::{ErrorKind, RepoError, SyncError};
pub use memory::{InMemoryIncidents, InMemoryTickets, Mutation};
pub use report::{Anomaly, Counters, CycleReport, ItemFailure, Phase};
pub use repo::{IncidentRepository, OpenQuery, TicketRepository};
