//! State reconciler: status bumps, `status_mirror` tracking, and reopen.

use std::collections::HashSet;

use tandem_core::ext::encode_status_mirror;
use tandem_core::types::marker;
use tandem_core::{
    ExtField, Incident, IncidentId, IncidentStatus, MarkerField, System, Ticket, TicketField,
    TicketStatus,
};

use crate::context::Ctx;
use crate::cycle::WorkItem;
use crate::error::SyncError;
use crate::report::{Anomaly, CycleReport, Phase};
use crate::repo::{IncidentRepository, TicketRepository};

/// Move a ticket to `target` unless it is already there.
pub(crate) async fn bump_ticket<A, B>(
    ctx: &Ctx<'_, A, B>,
    ticket: &mut Ticket,
    target: TicketStatus,
    report: &mut CycleReport,
) -> Result<(), SyncError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    if ticket.status == target {
        return Ok(());
    }
    ctx.on_a("set_status", ctx.tickets.set_status(&ticket.id, target))
        .await?;
    tracing::info!("ticket {}: {} -> {}", ticket.number, ticket.status, target);
    ticket.status = target;
    report.counters.statuses_propagated += 1;
    Ok(())
}

/// Move an incident to `target` unless it is already there.
pub(crate) async fn bump_incident<A, B>(
    ctx: &Ctx<'_, A, B>,
    incident: &mut Incident,
    target: IncidentStatus,
    report: &mut CycleReport,
) -> Result<(), SyncError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    if incident.status == target {
        return Ok(());
    }
    ctx.on_b("set_status", ctx.incidents.set_status(&incident.id, target))
        .await?;
    tracing::info!(
        "incident {}: {} -> {}",
        incident.number,
        incident.status,
        target
    );
    incident.status = target;
    report.counters.statuses_propagated += 1;
    Ok(())
}

/// What the mirror rule asks for, given the current status and mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MirrorAction {
    Nothing,
    /// Record the status; B is left alone.
    Record,
    /// Record the status and drive B to in-progress.
    Reengage,
    /// Re-engagement without a counterpart; wait until linked.
    Defer,
}

pub(crate) fn mirror_action(
    status: TicketStatus,
    mirror: Option<TicketStatus>,
    reengagement: bool,
    has_counterpart: bool,
) -> MirrorAction {
    match mirror {
        Some(seen) if seen == status => MirrorAction::Nothing,
        None if status == TicketStatus::New => MirrorAction::Record,
        _ if reengagement && has_counterpart => MirrorAction::Reengage,
        _ if reengagement => MirrorAction::Defer,
        _ => MirrorAction::Record,
    }
}

/// Apply the `status_mirror` rule to every ticket in the working set.
pub(crate) async fn reconcile<A, B>(
    ctx: &Ctx<'_, A, B>,
    work: &mut [WorkItem],
    report: &mut CycleReport,
) where
    A: TicketRepository,
    B: IncidentRepository,
{
    for item in work.iter_mut() {
        if let Err(e) = reconcile_one(ctx, item, report).await {
            report.fail(System::A, item.ticket.number.as_str(), Phase::Status, &e);
        }
    }
}

async fn reconcile_one<A, B>(
    ctx: &Ctx<'_, A, B>,
    item: &mut WorkItem,
    report: &mut CycleReport,
) -> Result<(), SyncError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    let ticket = &mut item.ticket;
    let mirror = ticket.status_mirror.clone().into_result("status_mirror")?;
    let action = mirror_action(
        ticket.status,
        mirror,
        ctx.config.is_reengagement(ticket.status),
        item.incident.is_some(),
    );

    match action {
        MirrorAction::Nothing => return Ok(()),
        MirrorAction::Defer => {
            tracing::debug!(
                "ticket {} is {} but has no counterpart yet",
                ticket.number,
                ticket.status
            );
            return Ok(());
        }
        MirrorAction::Reengage => {
            if let Some(incident) = item.incident.as_mut() {
                bump_incident(ctx, incident, IncidentStatus::InProgress, report).await?;
            }
        }
        MirrorAction::Record => {}
    }

    ctx.on_a(
        "update_extension",
        ctx.tickets.update_extension(
            &ticket.id,
            TicketField::StatusMirror,
            encode_status_mirror(Some(ticket.status)),
        ),
    )
    .await?;
    tracing::debug!("ticket {} status_mirror := {}", ticket.number, ticket.status);
    ticket.status_mirror = ExtField::Set(ticket.status);
    report.counters.mirrors_updated += 1;
    Ok(())
}

/// Whether the incident's marker asks for its ticket to be reactivated.
pub(crate) fn wants_reopen(incident: &Incident) -> bool {
    let value = incident.reopen_marker.trim();
    (value == marker::READY || value == marker::DONE) && !incident.status.is_terminal()
}

/// B-side reopen: push the paired ticket back to customer-note-added and
/// reset the marker. Incidents linked in this cycle wait for the next one.
pub(crate) async fn reopen<A, B>(
    ctx: &Ctx<'_, A, B>,
    incidents: &[Incident],
    linked_now: &HashSet<IncidentId>,
    work: &mut Vec<WorkItem>,
    report: &mut CycleReport,
) where
    A: TicketRepository,
    B: IncidentRepository,
{
    let pending = incidents
        .iter()
        .filter(|b| wants_reopen(b) && !linked_now.contains(&b.id));
    for incident in pending {
        if let Err(e) = reopen_one(ctx, incident, work, report).await {
            report.fail(System::B, incident.number.as_str(), Phase::Reopen, &e);
        }
    }
}

async fn reopen_one<A, B>(
    ctx: &Ctx<'_, A, B>,
    incident: &Incident,
    work: &mut Vec<WorkItem>,
    report: &mut CycleReport,
) -> Result<(), SyncError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    let raw = incident.ext_a.as_deref().unwrap_or_default();
    let unresolvable = || Anomaly::UnresolvableReopen {
        incident: incident.number.to_string(),
        ext_a: raw.to_owned(),
    };
    let Some(key) = ctx.config.key_filter.normalize(raw) else {
        report.anomaly(unresolvable());
        return Ok(());
    };

    let index = match work.iter().position(|w| w.ticket.number == key) {
        Some(index) => index,
        None => {
            let Some(record) = ctx
                .on_a("get_by_key", ctx.tickets.get_by_key(&key))
                .await?
            else {
                report.anomaly(unresolvable());
                return Ok(());
            };
            work.push(WorkItem::new(Ticket::try_from(record)?));
            work.len() - 1
        }
    };

    let item = &mut work[index];
    if item.incident.is_none() && item.ticket.ref_b.as_ref() == Some(&incident.number) {
        item.incident = Some(incident.clone());
    }
    bump_ticket(ctx, &mut item.ticket, TicketStatus::CustomerNoteAdded, report).await?;

    ctx.on_b(
        "set_marker",
        ctx.incidents
            .set_marker(&incident.id, MarkerField::Reopen, marker::CLEARED),
    )
    .await?;
    tracing::info!("incident {} reopened ticket {key}", incident.number);
    report.counters.reopened += 1;
    Ok(())
}
