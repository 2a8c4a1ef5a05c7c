//! Note mirror: ticket notes and incident actions, tracked in `note_map`.

use tandem_core::{
    ExtField, IncidentStatus, Note, NoteId, System, TicketField, TicketStatus,
};

use crate::context::Ctx;
use crate::cycle::WorkItem;
use crate::error::SyncError;
use crate::report::{CycleReport, Phase};
use crate::repo::{IncidentRepository, TicketRepository};
use crate::status;

/// Id of the most recent note, for adapters that do not report created ids.
fn newest(notes: Vec<Note>) -> Option<NoteId> {
    notes
        .into_iter()
        .max_by(|x, y| x.created_at.cmp(&y.created_at))
        .map(|note| note.id)
}

/// Mirror notes of one pair in both directions.
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

    let mut map = ticket.note_map.clone().or_default("note_map")?;
    let mut persisted = map.clone();

    let on_a: Vec<Note> = ctx
        .on_a("list_notes", ctx.tickets.list_notes(&ticket.id))
        .await?
        .into_iter()
        .map(Note::from)
        .collect();
    let on_b: Vec<Note> = ctx
        .on_b("list_notes", ctx.incidents.list_notes(&incident.id))
        .await?
        .into_iter()
        .map(Note::from)
        .filter(|note| !note.text.starts_with(ctx.config.initial_action_prefix.as_str()))
        .collect();

    for note in &on_a {
        map.register(note.id.as_str());
    }

    let incoming: Vec<&Note> = on_b
        .iter()
        .filter(|note| !map.contains_remote(note.id.as_str()))
        .collect();

    // B -> A
    for note in incoming {
        let copied = async {
            let created = ctx
                .on_a("create_note", ctx.tickets.create_note(&ticket.id, &note.text))
                .await?;
            match created {
                Some(id) => Ok(id),
                None => {
                    let listed = ctx
                        .on_a("list_notes", ctx.tickets.list_notes(&ticket.id))
                        .await?;
                    newest(listed.into_iter().map(Note::from).collect()).ok_or_else(|| {
                        SyncError::item(ticket.number.as_str(), "created note not listed")
                    })
                }
            }
        }
        .await;

        match copied {
            Ok(alpha) => {
                tracing::info!(
                    "copied action {} from {} to {} as note {alpha}",
                    note.id,
                    incident.number,
                    ticket.number
                );
                map.set_mirrored(alpha.as_str(), note.id.as_str());
                ctx.persist_map(&ticket.id, TicketField::NoteMap, &map, &mut persisted)
                    .await?;
                report.counters.notes_to_a += 1;
                let target = if incident.status.is_terminal() {
                    TicketStatus::Complete
                } else {
                    TicketStatus::CustomerNoteAdded
                };
                status::bump_ticket(ctx, ticket, target, report).await?;
            }
            Err(e) => report.fail(System::B, incident.number.as_str(), Phase::Notes, &e),
        }
    }

    // A -> B, including earlier failures.
    for key in map.unmirrored() {
        let Some(note) = on_a.iter().find(|note| note.id.as_str() == key) else {
            tracing::debug!("note {key} on {} is gone; retrying later", ticket.number);
            continue;
        };
        let copied = async {
            let created = ctx
                .on_b("create_note", ctx.incidents.create_note(&incident.id, &note.text))
                .await?;
            match created {
                Some(id) => Ok(id),
                None => {
                    let listed = ctx
                        .on_b("list_notes", ctx.incidents.list_notes(&incident.id))
                        .await?;
                    newest(listed.into_iter().map(Note::from).collect()).ok_or_else(|| {
                        SyncError::item(incident.number.as_str(), "created action not listed")
                    })
                }
            }
        }
        .await;

        match copied {
            Ok(beta) => {
                tracing::info!(
                    "copied note {key} from {} to {} as action {beta}",
                    ticket.number,
                    incident.number
                );
                map.set_mirrored(key, beta.as_str());
                ctx.persist_map(&ticket.id, TicketField::NoteMap, &map, &mut persisted)
                    .await?;
                report.counters.notes_to_b += 1;
                status::bump_incident(ctx, incident, IncidentStatus::ResponseReceived, report)
                    .await?;
            }
            Err(e) => {
                map.set_failed(key.as_str());
                report.fail(System::A, format!("{}/{key}", ticket.number), Phase::Notes, &e);
            }
        }
    }

    ctx.persist_map(&ticket.id, TicketField::NoteMap, &map, &mut persisted)
        .await?;
    ticket.note_map = ExtField::Set(map);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn note(id: &str, minute: u32) -> Note {
        Note {
            id: NoteId::from(id),
            text: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
        }
    }

    #[test]
    fn newest_picks_latest_entry_date() {
        let notes = vec![note("act1", 5), note("act3", 30), note("act2", 10)];
        assert_eq!(newest(notes), Some(NoteId::from("act3")));
        assert_eq!(newest(Vec::new()), None);
    }
}
