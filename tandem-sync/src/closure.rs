//! Closure: finish pairs whose other side is no longer open.
//!
//! Works on a fresh, unbounded enumeration of both sides so that pairs
//! linked earlier in the cycle and items outside the lookback window count
//! as open. Records that fail typed conversion still count as open.

use std::collections::HashSet;

use tandem_core::ext::parse_ref;
use tandem_core::types::marker;
use tandem_core::wire::{IncidentRecord, TicketRecord};
use tandem_core::{
    IncidentId, IncidentStatus, KeyFilter, MarkerField, System, TicketId, TicketNumber,
    TicketStatus,
};

use crate::context::Ctx;
use crate::error::SyncError;
use crate::report::{CycleReport, Phase};
use crate::repo::{IncidentRepository, OpenQuery, TicketRepository};

/// Closure decisions derived from the two open sets.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ClosurePlan {
    /// Tickets whose counterpart is gone.
    pub tickets: Vec<(TicketId, String)>,
    /// Incidents whose counterpart is gone; `bool` is whether the status
    /// still has to be set (the marker is always written).
    pub incidents: Vec<(IncidentId, String, bool)>,
}

pub(crate) fn plan(
    tickets: &[TicketRecord],
    incidents: &[IncidentRecord],
    filter: &KeyFilter,
) -> ClosurePlan {
    let open_b_numbers: HashSet<&str> = incidents
        .iter()
        .filter(|b| !is_terminal_incident(b))
        .map(|b| b.number.trim())
        .collect();
    let open_b_refs: HashSet<TicketNumber> = incidents
        .iter()
        .filter(|b| !is_terminal_incident(b))
        .filter_map(|b| filter.normalize(&b.ext_a))
        .collect();
    let open_a_numbers: HashSet<&str> = tickets.iter().map(|a| a.number.trim()).collect();
    let open_a_refs: HashSet<String> = tickets
        .iter()
        .filter_map(|a| parse_ref(&a.ref_b))
        .map(|r| r.to_string())
        .collect();

    let mut out = ClosurePlan::default();

    for ticket in tickets {
        let Some(ref_b) = parse_ref(&ticket.ref_b) else {
            continue;
        };
        let number = TicketNumber::from(ticket.number.trim());
        if !open_b_numbers.contains(ref_b.as_str()) && !open_b_refs.contains(&number) {
            out.tickets
                .push((TicketId::from(ticket.id.as_str()), ticket.number.clone()));
        }
    }

    for incident in incidents {
        if incident.ext_a.trim().is_empty() {
            continue;
        }
        let Some(key) = filter.normalize(&incident.ext_a) else {
            tracing::warn!(
                "closure: skipping incident {} with unusable ext_A '{}'",
                incident.number,
                incident.ext_a
            );
            continue;
        };
        if open_a_numbers.contains(key.as_str()) || open_a_refs.contains(incident.number.trim()) {
            continue;
        }
        let terminal = is_terminal_incident(incident);
        if terminal && incident.reopen_marker.trim() == marker::DONE {
            continue;
        }
        out.incidents.push((
            IncidentId::from(incident.id.as_str()),
            incident.number.clone(),
            !terminal,
        ));
    }

    out
}

fn is_terminal_incident(record: &IncidentRecord) -> bool {
    record
        .processing_status_id
        .parse::<IncidentStatus>()
        .is_ok_and(IncidentStatus::is_terminal)
}

/// Re-enumerate both sides and close whatever lost its counterpart.
pub(crate) async fn close<A, B>(ctx: &Ctx<'_, A, B>, report: &mut CycleReport)
where
    A: TicketRepository,
    B: IncidentRepository,
{
    let query = OpenQuery {
        since: None,
        account_id: Some(ctx.config.account_id.clone()),
        excluded_queues: ctx.config.excluded_queues.clone(),
    };
    let tickets = match ctx.on_a("list_open", ctx.tickets.list_open(&query)).await {
        Ok(tickets) => tickets,
        Err(e) => {
            report.fail(System::A, "*", Phase::Closure, &e);
            return;
        }
    };
    let incidents = match ctx.on_b("list_open", ctx.incidents.list_open(&query)).await {
        Ok(incidents) => incidents,
        Err(e) => {
            report.fail(System::B, "*", Phase::Closure, &e);
            return;
        }
    };

    let plan = plan(&tickets, &incidents, &ctx.config.key_filter);

    for (id, number) in plan.tickets {
        match ctx
            .on_a("set_status", ctx.tickets.set_status(&id, TicketStatus::Complete))
            .await
        {
            Ok(()) => {
                tracing::info!("closed ticket {number}: counterpart no longer open");
                report.counters.closed_on_a += 1;
            }
            Err(e) => report.fail(System::A, number, Phase::Closure, &e),
        }
    }

    for (id, number, set_status) in plan.incidents {
        match close_incident(ctx, &id, set_status).await {
            Ok(()) => {
                tracing::info!("closed incident {number}: counterpart no longer open");
                report.counters.closed_on_b += 1;
            }
            Err(e) => report.fail(System::B, number, Phase::Closure, &e),
        }
    }
}

async fn close_incident<A, B>(
    ctx: &Ctx<'_, A, B>,
    id: &IncidentId,
    set_status: bool,
) -> Result<(), SyncError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    if set_status {
        ctx.on_b("set_status", ctx.incidents.set_status(id, IncidentStatus::Done))
            .await?;
    }
    ctx.on_b(
        "set_marker",
        ctx.incidents.set_marker(id, MarkerField::Reopen, marker::DONE),
    )
    .await
}
