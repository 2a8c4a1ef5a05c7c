//! The orchestrator: one reconciliation cycle, end to end.
//!
//! ```text
//! list_open(A), list_open(B)
//!   -> correlate
//!   -> link (repair half-linked pairs, create missing counterparts)
//!   -> attachments, notes        (pairs known at enumeration)
//!   -> reopen, status mirror     (whole working set)
//!   -> closure                   (fresh unbounded enumeration)
//! ```
//!
//! Per-item errors are recorded in the [`CycleReport`] and never abort the
//! cycle. Only enumeration failures do.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use tandem_core::{Incident, SyncConfig, System, Ticket};

use crate::context::Ctx;
use crate::correlate::correlate;
use crate::error::SyncError;
use crate::report::{CycleReport, Phase};
use crate::repo::{IncidentRepository, OpenQuery, TicketRepository};
use crate::{attachments, closure, linker, notes, status};

/// A ticket as tracked through one cycle, with its counterpart if known.
#[derive(Debug, Clone)]
pub(crate) struct WorkItem {
    pub ticket: Ticket,
    pub incident: Option<Incident>,
    /// Paired at enumeration; only these get attachments and notes mirrored.
    pub mirror: bool,
}

impl WorkItem {
    pub fn new(ticket: Ticket) -> Self {
        Self {
            ticket,
            incident: None,
            mirror: false,
        }
    }
}

/// Timestamps of the most recent cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub last_started: Option<DateTime<Utc>>,
    /// Start of the last cycle that ran to completion.
    pub last_success: Option<DateTime<Utc>>,
}

/// Drives reconciliation cycles between a ticket and an incident repository.
pub struct Orchestrator<A, B> {
    tickets: Arc<A>,
    incidents: Arc<B>,
    config: SyncConfig,
    run_lock: Mutex<Progress>,
}

impl<A, B> Orchestrator<A, B>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    pub fn new(tickets: Arc<A>, incidents: Arc<B>, config: SyncConfig) -> Self {
        Self {
            tickets,
            incidents,
            config,
            run_lock: Mutex::new(Progress::default()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn tickets(&self) -> &Arc<A> {
        &self.tickets
    }

    pub fn incidents(&self) -> &Arc<B> {
        &self.incidents
    }

    /// Waits for a running cycle to finish.
    pub async fn progress(&self) -> Progress {
        *self.run_lock.lock().await
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as if it started at `now` (drives the lookback bound).
    ///
    /// Fails fast with [`SyncError::CycleInProgress`] if another cycle holds
    /// the run lock.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, SyncError> {
        let mut progress = self
            .run_lock
            .try_lock()
            .map_err(|_| SyncError::CycleInProgress)?;
        progress.last_started = Some(now);

        let ctx = Ctx::new(self.tickets.as_ref(), self.incidents.as_ref(), &self.config);
        let report = run(&ctx, now).await?;
        progress.last_success = Some(now);

        tracing::info!(
            "cycle done: {} tickets, {} incidents, {} pairs, {} mutations, {} failures, {} anomalies",
            report.tickets_seen,
            report.incidents_seen,
            report.pairs,
            report.counters.mutations(),
            report.failures.len(),
            report.anomalies.len()
        );
        Ok(report)
    }
}

async fn run<A, B>(ctx: &Ctx<'_, A, B>, now: DateTime<Utc>) -> Result<CycleReport, SyncError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    let mut report = CycleReport::new(now);
    let query = OpenQuery {
        since: Some(ctx.config.since(now)),
        account_id: Some(ctx.config.account_id.clone()),
        excluded_queues: ctx.config.excluded_queues.clone(),
    };

    // Enumerate. Losing either side aborts the cycle.
    let listed_a = ctx.on_a("list_open", ctx.tickets.list_open(&query)).await;
    let listed_b = ctx.on_b("list_open", ctx.incidents.list_open(&query)).await;
    let (records_a, records_b) = match (listed_a, listed_b) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(a), Err(b)) => {
            tracing::error!("both systems unreachable");
            return Err(SyncError::Unreachable {
                a: Box::new(a),
                b: Box::new(b),
            });
        }
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => {
            tracing::error!("enumeration failed, skipping cycle: {e}");
            return Err(e);
        }
    };

    let mut tickets = Vec::with_capacity(records_a.len());
    for record in records_a {
        let key = record.number.clone();
        match Ticket::try_from(record) {
            Ok(ticket) => tickets.push(ticket),
            Err(e) => report.fail(System::A, key, Phase::Enumerate, &e.into()),
        }
    }
    let mut incidents = Vec::with_capacity(records_b.len());
    for record in records_b {
        let key = record.number.clone();
        match Incident::try_from(record) {
            Ok(incident) => incidents.push(incident),
            Err(e) => report.fail(System::B, key, Phase::Enumerate, &e.into()),
        }
    }
    report.tickets_seen = tickets.len();
    report.incidents_seen = incidents.len();

    let correlation = correlate(&tickets, &incidents, &ctx.config.key_filter);
    report.pairs = correlation.pairs.len();
    for anomaly in correlation.anomalies.iter().cloned() {
        report.anomaly(anomaly);
    }

    let mut work: Vec<WorkItem> = tickets.iter().cloned().map(WorkItem::new).collect();
    for pair in &correlation.pairs {
        let item = &mut work[pair.ticket];
        item.incident = Some(incidents[pair.incident].clone());
        item.mirror = true;
    }

    // Link.
    for pair in &correlation.pairs {
        let Some(missing) = pair.missing else { continue };
        let item = &mut work[pair.ticket];
        let Some(incident) = item.incident.as_mut() else { continue };
        if let Err(e) =
            linker::repair(ctx, &mut item.ticket, incident, missing, &mut report.counters).await
        {
            match e.system() {
                Some(System::B) => {
                    report.fail(System::B, incident.number.as_str(), Phase::Link, &e)
                }
                _ => report.fail(System::A, item.ticket.number.as_str(), Phase::Link, &e),
            }
        }
    }
    for i in correlation.unlinked_tickets() {
        let item = &mut work[i];
        match linker::link_ticket(ctx, &item.ticket, &mut report.counters).await {
            Ok(incident) => {
                item.ticket.ref_b = Some(incident.number.clone());
                item.incident = Some(incident);
            }
            Err(e) => report.fail(System::A, item.ticket.number.as_str(), Phase::Link, &e),
        }
    }
    let mut linked_now = HashSet::new();
    for j in correlation.unlinked_incidents() {
        let incident = &incidents[j];
        match linker::link_incident(ctx, incident, &mut report.counters).await {
            Ok(ticket) => {
                linked_now.insert(incident.id.clone());
                let mut counterpart = incident.clone();
                counterpart.ext_a = Some(ticket.number.to_string());
                work.push(WorkItem {
                    ticket,
                    incident: Some(counterpart),
                    mirror: false,
                });
            }
            Err(e) => report.fail(System::B, incident.number.as_str(), Phase::Link, &e),
        }
    }

    // Mirror content of pairs seen at enumeration.
    for item in work.iter_mut().filter(|w| w.mirror) {
        if let Err(e) = attachments::mirror_pair(ctx, item, &mut report).await {
            report.fail(System::A, item.ticket.number.as_str(), Phase::Attachments, &e);
        }
    }
    for item in work.iter_mut().filter(|w| w.mirror) {
        if let Err(e) = notes::mirror_pair(ctx, item, &mut report).await {
            report.fail(System::A, item.ticket.number.as_str(), Phase::Notes, &e);
        }
    }

    // State.
    status::reopen(ctx, &incidents, &linked_now, &mut work, &mut report).await;
    status::reconcile(ctx, &mut work, &mut report).await;

    closure::close(ctx, &mut report).await;

    report.finished_at = Utc::now();
    Ok(report)
}
