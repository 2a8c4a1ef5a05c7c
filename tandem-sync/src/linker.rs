//! Linker: create missing counterparts and write cross-references.
//!
//! Two symmetric paths, one per direction. In both the remote create is
//! acknowledged before the back-reference is written on the origin side; a
//! lost back-reference write is repaired by [`repair`] on the next cycle,
//! because the created item already names its origin.

use tandem_core::ext::encode_ref;
use tandem_core::wire::{IncidentDraft, TicketDraft};
use tandem_core::{
    Incident, IncidentField, IncidentStatus, Ticket, TicketField, TicketStatus, SyncConfig,
};

use crate::context::{truncate, Ctx};
use crate::correlate::BackRef;
use crate::error::SyncError;
use crate::report::Counters;
use crate::repo::{IncidentRepository, TicketRepository};

fn text_or(text: &str, fallback: &str, limit: usize) -> String {
    let text = text.trim();
    if text.is_empty() {
        truncate(fallback, limit)
    } else {
        truncate(text, limit)
    }
}

pub(crate) fn incident_draft(ticket: &Ticket, config: &SyncConfig) -> IncidentDraft {
    IncidentDraft {
        brief_description: text_or(&ticket.title, &config.default_title, config.title_limit),
        request: text_or(&ticket.description, &config.default_body, config.body_limit),
        status: IncidentStatus::New,
        ext_a: ticket.number.to_string(),
        caller_id: None,
    }
}

pub(crate) fn ticket_draft(incident: &Incident, config: &SyncConfig) -> TicketDraft {
    TicketDraft {
        title: text_or(
            &incident.brief_description,
            &config.default_title,
            config.title_limit,
        ),
        description: text_or(&incident.request, &config.default_body, config.body_limit),
        status: TicketStatus::New,
        ref_b: Some(incident.number.to_string()),
        contact_id: None,
    }
}

/// A ticket without counterpart: create the incident, then write `ref_B`.
pub(crate) async fn link_ticket<A, B>(
    ctx: &Ctx<'_, A, B>,
    ticket: &Ticket,
    counters: &mut Counters,
) -> Result<Incident, SyncError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    let mut draft = incident_draft(ticket, ctx.config);
    if let Some(contact) = &ticket.contact_id {
        draft.caller_id = match ctx
            .on_a("caller_for_contact", ctx.tickets.caller_for_contact(contact))
            .await
        {
            Ok(caller) => caller,
            Err(e) => {
                tracing::warn!("no caller for contact {contact} of {}: {e}", ticket.number);
                None
            }
        };
    }

    let record = ctx.on_b("create", ctx.incidents.create(draft)).await?;
    counters.incidents_created += 1;
    tracing::info!("created incident {} for ticket {}", record.number, ticket.number);

    let incident = Incident::try_from(record)?;
    ctx.on_a(
        "update_extension",
        ctx.tickets.update_extension(
            &ticket.id,
            TicketField::RefB,
            encode_ref(Some(&incident.number)),
        ),
    )
    .await?;
    counters.back_refs_written += 1;
    Ok(incident)
}

/// An incident without counterpart: create the ticket, then write `ext_A`.
pub(crate) async fn link_incident<A, B>(
    ctx: &Ctx<'_, A, B>,
    incident: &Incident,
    counters: &mut Counters,
) -> Result<Ticket, SyncError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    let mut draft = ticket_draft(incident, ctx.config);
    if let Some(caller) = &incident.caller_id {
        draft.contact_id = match ctx
            .on_a("contact_for_caller", ctx.tickets.contact_for_caller(caller))
            .await
        {
            Ok(contact) => contact,
            Err(e) => {
                tracing::warn!("no contact for caller {caller} of {}: {e}", incident.number);
                None
            }
        };
    }

    let record = ctx.on_a("create", ctx.tickets.create(draft)).await?;
    counters.tickets_created += 1;
    tracing::info!("created ticket {} for incident {}", record.number, incident.number);

    let ticket = Ticket::try_from(record)?;
    ctx.on_b(
        "update_extension",
        ctx.incidents
            .update_extension(&incident.id, IncidentField::ExtA, ticket.number.to_string()),
    )
    .await?;
    counters.back_refs_written += 1;
    Ok(ticket)
}

/// Complete a half-linked pair by writing the missing reference.
pub(crate) async fn repair<A, B>(
    ctx: &Ctx<'_, A, B>,
    ticket: &mut Ticket,
    incident: &mut Incident,
    missing: BackRef,
    counters: &mut Counters,
) -> Result<(), SyncError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    match missing {
        BackRef::OnTicket => {
            ctx.on_a(
                "update_extension",
                ctx.tickets.update_extension(
                    &ticket.id,
                    TicketField::RefB,
                    encode_ref(Some(&incident.number)),
                ),
            )
            .await?;
            ticket.ref_b = Some(incident.number.clone());
        }
        BackRef::OnIncident => {
            ctx.on_b(
                "update_extension",
                ctx.incidents.update_extension(
                    &incident.id,
                    IncidentField::ExtA,
                    ticket.number.to_string(),
                ),
            )
            .await?;
            incident.ext_a = Some(ticket.number.to_string());
        }
    }
    tracing::info!(
        "repaired back-reference {} <-> {} ({missing:?})",
        ticket.number,
        incident.number
    );
    counters.back_refs_written += 1;
    Ok(())
}
