//! Attachment mirror.
//!
//! `attach_map` on the ticket is the source of truth for what has been
//! copied. Each successful upload is written through to the map before the
//! status bump that goes with it, so a crash mid-pair never loses a copy.

use tandem_core::wire::AttachmentUpload;
use tandem_core::{Attachment, ExtField, IncidentStatus, System, TicketField, TicketStatus};

use crate::context::Ctx;
use crate::cycle::WorkItem;
use crate::error::SyncError;
use crate::report::{CycleReport, Phase};
use crate::repo::{IncidentRepository, TicketRepository};
use crate::status;

/// Mirror attachments of one pair in both directions.
pub(crate) async fn mirror_pair<A, B>(
    ctx: &Ctx<'_, A, B>,
    item: &mut WorkItem,
    report: &mut CycleReport,
) -> Result<(), SyncError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    let WorkItem {
        ticket,
        incident: Some(incident),
        ..
    } = item
    else {
        return Ok(());
    };

    let mut map = ticket.attach_map.clone().or_default("attach_map")?;
    let mut persisted = map.clone();

    let on_a: Vec<Attachment> = ctx
        .on_a("list_attachments", ctx.tickets.list_attachments(&ticket.id))
        .await?
        .into_iter()
        .map(Attachment::from)
        .collect();
    let on_b: Vec<Attachment> = ctx
        .on_b("list_attachments", ctx.incidents.list_attachments(&incident.id))
        .await?
        .into_iter()
        .map(Attachment::from)
        .filter(|att| !ctx.config.excluded_attachment_names.contains(&att.file_name))
        .collect();

    for att in &on_a {
        if map.register(att.id.as_str()) {
            tracing::debug!("registered attachment {} on {}", att.id, ticket.number);
        }
    }

    let incoming: Vec<&Attachment> = on_b
        .iter()
        .filter(|att| !map.contains_remote(att.id.as_str()))
        .collect();

    // B -> A
    for att in incoming {
        let copied = async {
            let envelope = ctx
                .on_b("get_attachment_bytes", ctx.incidents.get_attachment_bytes(&att.id))
                .await?;
            let upload = AttachmentUpload {
                file_name: att.file_name.clone(),
                content_type: att.content_type.clone(),
                bytes: envelope.decode()?,
                description: att.description.clone(),
            };
            ctx.on_a(
                "create_attachment",
                ctx.tickets.create_attachment(&ticket.id, upload),
            )
            .await
        }
        .await;

        match copied {
            Ok(alpha) => {
                tracing::info!(
                    "copied attachment {} ({}) from {} to {} as {alpha}",
                    att.id,
                    att.file_name,
                    incident.number,
                    ticket.number
                );
                map.set_mirrored(alpha.as_str(), att.id.as_str());
                ctx.persist_map(&ticket.id, TicketField::AttachMap, &map, &mut persisted)
                    .await?;
                report.counters.attachments_to_a += 1;
                status::bump_ticket(ctx, ticket, TicketStatus::CustomerNoteAdded, report).await?;
            }
            Err(e) => report.fail(System::B, incident.number.as_str(), Phase::Attachments, &e),
        }
    }

    // A -> B, including earlier failures.
    for key in map.unmirrored() {
        let Some(att) = on_a.iter().find(|att| att.id.as_str() == key) else {
            tracing::debug!("attachment {key} on {} is gone; retrying later", ticket.number);
            continue;
        };
        let copied = async {
            let envelope = ctx
                .on_a("get_attachment_bytes", ctx.tickets.get_attachment_bytes(&att.id))
                .await?;
            let upload = AttachmentUpload {
                file_name: att.file_name.clone(),
                content_type: att.content_type.clone(),
                bytes: envelope.decode()?,
                description: att.description.clone(),
            };
            ctx.on_b(
                "create_attachment",
                ctx.incidents.create_attachment(&incident.id, upload),
            )
            .await
        }
        .await;

        match copied {
            Ok(beta) => {
                tracing::info!(
                    "copied attachment {key} ({}) from {} to {} as {beta}",
                    att.file_name,
                    ticket.number,
                    incident.number
                );
                map.set_mirrored(key, beta.as_str());
                ctx.persist_map(&ticket.id, TicketField::AttachMap, &map, &mut persisted)
                    .await?;
                report.counters.attachments_to_b += 1;
                status::bump_incident(ctx, incident, IncidentStatus::ResponseReceived, report)
                    .await?;
            }
            Err(e) => {
                map.set_failed(key.as_str());
                report.fail(System::A, format!("{}/{key}", ticket.number), Phase::Attachments, &e);
            }
        }
    }

    ctx.persist_map(&ticket.id, TicketField::AttachMap, &map, &mut persisted)
        .await?;
    ticket.attach_map = ExtField::Set(map);
    Ok(())
}
