use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rstest::rstest;
use tandem_core::wire::{IncidentRecord, TicketRecord};
use tandem_core::{
    IncidentId, IncidentStatus, KeyFilter, MirrorMap, MirrorSlot, SyncConfig, System,
    TicketId, TicketStatus,
};
use tandem_sync::{
    Anomaly, ErrorKind, InMemoryIncidents, InMemoryTickets, Orchestrator, Phase, SyncError,
};

type Bridge = Orchestrator<InMemoryTickets, InMemoryIncidents>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn bridge_with(config: SyncConfig) -> (Arc<InMemoryTickets>, Arc<InMemoryIncidents>, Bridge) {
    init_logging();
    let tickets = Arc::new(InMemoryTickets::new("294"));
    let incidents = Arc::new(InMemoryIncidents::new());
    let bridge = Orchestrator::new(Arc::clone(&tickets), Arc::clone(&incidents), config);
    (tickets, incidents, bridge)
}

fn bridge() -> (Arc<InMemoryTickets>, Arc<InMemoryIncidents>, Bridge) {
    bridge_with(SyncConfig::for_account("294"))
}

fn ticket(id: &str, number: &str, ref_b: &str, status: TicketStatus) -> TicketRecord {
    let mut record = TicketRecord::new(id, number, status);
    record.title = format!("Ticket {number}");
    record.description = "Printer on floor 3 is jammed".to_owned();
    record.ref_b = ref_b.to_owned();
    record
}

fn incident(id: &str, number: &str, ext_a: &str, status: IncidentStatus) -> IncidentRecord {
    let mut record = IncidentRecord::new(id, number, status);
    record.brief_description = format!("Incident {number}");
    record.request = "Customer cannot print".to_owned();
    record.ext_a = ext_a.to_owned();
    record
}

fn attach_map(tickets: &InMemoryTickets, number: &str) -> MirrorMap {
    let record = tickets.ticket(number).expect("ticket present");
    MirrorMap::parse(&record.attach_map).expect("attach_map parses")
}

fn note_map(tickets: &InMemoryTickets, number: &str) -> MirrorMap {
    let record = tickets.ticket(number).expect("ticket present");
    MirrorMap::parse(&record.note_map).expect("note_map parses")
}

fn clear_logs(tickets: &InMemoryTickets, incidents: &InMemoryIncidents) {
    tickets.clear_mutations();
    incidents.clear_mutations();
}

fn assert_quiet(tickets: &InMemoryTickets, incidents: &InMemoryIncidents) {
    assert_eq!(tickets.mutations(), Vec::new(), "unexpected mutations on A");
    assert_eq!(incidents.mutations(), Vec::new(), "unexpected mutations on B");
}

// ---------------------------------------------------------------------------
// Core flows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_ticket_creates_linked_incident() {
    let (tickets, incidents, bridge) = bridge();
    tickets.insert(ticket("1", "T200 001", "No", TicketStatus::New));

    let report = bridge.run_cycle().await.expect("cycle");

    let created = incidents.incident("I100-1").expect("incident created");
    assert_eq!(created.ext_a, "T200 001");
    assert_eq!(created.brief_description, "Ticket T200 001");
    assert_eq!(tickets.ticket("T200 001").expect("ticket").ref_b, "I100-1");
    assert_eq!(report.counters.incidents_created, 1);
    assert_eq!(report.counters.back_refs_written, 1);
    assert!(report.is_clean(), "{:?}", report.failures);

    clear_logs(&tickets, &incidents);
    bridge.run_cycle().await.expect("second cycle");
    assert_quiet(&tickets, &incidents);
}

#[tokio::test]
async fn unlinked_items_on_both_sides_each_get_a_counterpart() {
    let (tickets, incidents, bridge) = bridge();
    tickets.insert(ticket("1", "T200 001", "No", TicketStatus::New));
    incidents.insert(incident("u1", "I100-1", "", IncidentStatus::New));

    let report = bridge.run_cycle().await.expect("cycle");
    assert_eq!(report.counters.incidents_created, 1);
    assert_eq!(report.counters.tickets_created, 1);

    assert_eq!(tickets.tickets().len(), 2);
    assert_eq!(incidents.incidents().len(), 2);
    assert_eq!(tickets.ticket("T200 001").expect("a").ref_b, "I100-2");
    assert_eq!(incidents.incident("I100-2").expect("b").ext_a, "T200 001");
    assert_eq!(tickets.ticket("T200 002").expect("a").ref_b, "I100-1");
    assert_eq!(incidents.incident("I100-1").expect("b").ext_a, "T200 002");

    clear_logs(&tickets, &incidents);
    let report = bridge.run_cycle().await.expect("second cycle");
    assert_eq!(report.pairs, 2);
    assert_quiet(&tickets, &incidents);
}

#[tokio::test]
async fn attachment_from_incident_is_copied_to_ticket() {
    let (tickets, incidents, bridge) = bridge();
    let mut record = ticket("1", "T200 001", "I100-1", TicketStatus::New);
    record.attach_map = "{}".to_owned();
    let a = tickets.insert(record);
    let b = incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::New));
    incidents.add_attachment(&b, "x.pdf", b"%PDF-1.4 scanned form");
    incidents.add_attachment(&b, "Oorspronkelijke aanvraag.pdf", b"generated");

    let report = bridge.run_cycle().await.expect("cycle");
    assert!(report.is_clean(), "{:?}", report.failures);

    let copied = tickets.attachments_of(&a);
    assert_eq!(copied.len(), 1);
    assert_eq!(copied[0].id, "α1");
    assert_eq!(copied[0].file_name, "x.pdf");
    assert_eq!(
        tickets.attachment_bytes("α1").expect("bytes"),
        b"%PDF-1.4 scanned form".to_vec()
    );

    let map = attach_map(&tickets, "T200 001");
    assert_eq!(map.len(), 1);
    assert_eq!(map.get("α1"), Some(&MirrorSlot::Mirrored("β1".to_owned())));
    assert_eq!(
        tickets.ticket("T200 001").expect("ticket").status,
        "customer-note-added"
    );
    assert_eq!(report.counters.attachments_to_a, 1);

    clear_logs(&tickets, &incidents);
    bridge.run_cycle().await.expect("second cycle");
    assert_quiet(&tickets, &incidents);
}

#[tokio::test]
async fn failed_upload_is_marked_and_retried() {
    let (tickets, incidents, bridge) = bridge();
    let mut record = ticket("1", "T200 001", "I100-1", TicketStatus::InProgress);
    record.status_mirror = "in-progress".to_owned();
    let a = tickets.insert(record);
    let b = incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::New));
    let alpha = tickets.add_attachment(&a, "invoice.pdf", b"invoice");
    assert_eq!(alpha.as_str(), "α1");
    incidents.fail_next_uploads(1);

    let report = bridge.run_cycle().await.expect("first cycle");
    let map = attach_map(&tickets, "T200 001");
    assert_eq!(map.get("α1"), Some(&MirrorSlot::Failed));
    assert!(tickets
        .ticket("T200 001")
        .expect("ticket")
        .attach_map
        .contains("'error'"));
    assert!(incidents.attachments_of(&b).is_empty());
    assert_eq!(
        incidents.incident("I100-1").expect("incident").processing_status_id,
        "new"
    );
    let failure = report
        .failures
        .iter()
        .find(|f| f.phase == Phase::Attachments)
        .expect("upload failure reported");
    assert_eq!(failure.kind, ErrorKind::Transient);

    let report = bridge.run_cycle().await.expect("second cycle");
    assert!(report.is_clean(), "{:?}", report.failures);
    let map = attach_map(&tickets, "T200 001");
    assert_eq!(map.get("α1"), Some(&MirrorSlot::Mirrored("β1".to_owned())));
    assert_eq!(
        incidents.attachment_bytes("β1").expect("uploaded"),
        b"invoice".to_vec()
    );
    assert_eq!(
        incidents.incident("I100-1").expect("incident").processing_status_id,
        "response-received"
    );
}

#[tokio::test]
async fn failed_copy_to_ticket_leaves_its_status_alone() {
    let (tickets, incidents, bridge) = bridge();
    let mut record = ticket("1", "T200 001", "I100-1", TicketStatus::InProgress);
    record.status_mirror = "in-progress".to_owned();
    let a = tickets.insert(record);
    let b = incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::InProgress));
    incidents.add_attachment(&b, "photo.jpg", b"jpeg");
    incidents.add_action(&b, "Customer replied");
    tickets.fail_next_uploads(1);
    tickets.fail_next_note_creates(1);

    let report = bridge.run_cycle().await.expect("first cycle");

    assert!(tickets.attachments_of(&a).is_empty());
    assert!(tickets.notes_of(&a).is_empty());
    assert_eq!(tickets.ticket("T200 001").expect("ticket").status, "in-progress");
    assert_eq!(report.counters.statuses_propagated, 0);
    let phases: Vec<Phase> = report.failures.iter().map(|f| f.phase).collect();
    assert_eq!(phases, vec![Phase::Attachments, Phase::Notes]);
    assert!(report.failures.iter().all(|f| f.key == "I100-1"));

    let report = bridge.run_cycle().await.expect("second cycle");
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(tickets.attachments_of(&a).len(), 1);
    assert_eq!(tickets.notes_of(&a).len(), 1);
    assert_eq!(
        tickets.ticket("T200 001").expect("ticket").status,
        "customer-note-added"
    );
}

#[tokio::test]
async fn incident_action_is_mirrored_and_bumps_ticket() {
    let (tickets, incidents, bridge) = bridge();
    let a = tickets.insert(ticket("1", "T200 001", "I100-1", TicketStatus::InProgress));
    let b = incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::InProgress));
    incidents.add_action(&b, "Initial action: Customer cannot print");
    let act = incidents.add_action(&b, "Customer replied");

    let report = bridge.run_cycle().await.expect("cycle");
    assert!(report.is_clean(), "{:?}", report.failures);

    let notes = tickets.notes_of(&a);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].text, "Customer replied");
    assert_eq!(
        note_map(&tickets, "T200 001").get(notes[0].id.as_str()),
        Some(&MirrorSlot::Mirrored(act.to_string()))
    );
    assert_eq!(
        tickets.ticket("T200 001").expect("ticket").status,
        "customer-note-added"
    );
    assert_eq!(report.counters.notes_to_a, 1);
}

#[tokio::test]
async fn action_on_finished_incident_completes_ticket() {
    let (tickets, incidents, bridge) = bridge();
    let a = tickets.insert(ticket("1", "T200 001", "I100-1", TicketStatus::InProgress));
    let b = incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::Done));
    incidents.add_action(&b, "Customer replied");
    incidents.list_terminal(true);

    bridge.run_cycle().await.expect("cycle");

    assert_eq!(tickets.notes_of(&a).len(), 1);
    assert_eq!(tickets.ticket("T200 001").expect("ticket").status, "complete");

    clear_logs(&tickets, &incidents);
    bridge.run_cycle().await.expect("second cycle");
    assert_quiet(&tickets, &incidents);
}

#[tokio::test]
async fn incident_without_open_ticket_is_closed() {
    let (tickets, incidents, bridge) = bridge();
    incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::New));

    let report = bridge.run_cycle().await.expect("cycle");

    let closed = incidents.incident("I100-1").expect("incident");
    assert_eq!(closed.processing_status_id, "done");
    assert_eq!(closed.reopen_marker, "done");
    assert_eq!(report.counters.closed_on_b, 1);
    assert!(tickets.tickets().is_empty());

    clear_logs(&tickets, &incidents);
    bridge.run_cycle().await.expect("second cycle");
    assert_quiet(&tickets, &incidents);
}

// ---------------------------------------------------------------------------
// Linking details
// ---------------------------------------------------------------------------

#[tokio::test]
async fn half_linked_pair_gets_its_back_reference() {
    let (tickets, incidents, bridge) = bridge();
    tickets.insert(ticket("1", "T200 001", "No", TicketStatus::New));
    incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::New));

    let report = bridge.run_cycle().await.expect("cycle");

    assert_eq!(report.counters.incidents_created, 0);
    assert_eq!(report.counters.back_refs_written, 1);
    assert_eq!(tickets.ticket("T200 001").expect("ticket").ref_b, "I100-1");
    assert_eq!(incidents.incidents().len(), 1);
}

#[tokio::test]
async fn failed_ext_a_repair_is_reported_against_the_incident() {
    let (tickets, incidents, bridge) = bridge();
    let mut record = ticket("1", "T200 001", "I100-1", TicketStatus::InProgress);
    record.status_mirror = "in-progress".to_owned();
    tickets.insert(record);
    incidents.insert(incident("u1", "I100-1", "", IncidentStatus::InProgress));
    incidents.fail_next_extension_updates(1);

    let report = bridge.run_cycle().await.expect("first cycle");

    let failure = report
        .failures
        .iter()
        .find(|f| f.phase == Phase::Link)
        .expect("repair failure reported");
    assert_eq!(failure.system, System::B);
    assert_eq!(failure.key, "I100-1");
    assert_eq!(failure.kind, ErrorKind::Transient);
    assert_eq!(incidents.incident("I100-1").expect("b").ext_a, "");

    let report = bridge.run_cycle().await.expect("second cycle");
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(report.counters.back_refs_written, 1);
    assert_eq!(incidents.incident("I100-1").expect("b").ext_a, "T200 001");
}

#[tokio::test]
async fn conflicting_references_are_left_alone() {
    let (tickets, incidents, bridge) = bridge();
    tickets.insert(ticket("1", "T200 001", "I100-1", TicketStatus::InProgress));
    tickets.insert(ticket("2", "T200 002", "I100-2", TicketStatus::InProgress));
    incidents.insert(incident("u1", "I100-1", "T200 002", IncidentStatus::New));
    incidents.insert(incident("u2", "I100-2", "T200 002", IncidentStatus::New));

    let report = bridge.run_cycle().await.expect("cycle");

    assert_eq!(report.pairs, 1);
    assert!(!report.anomalies.is_empty());
    assert_eq!(report.counters.incidents_created, 0);
    assert_eq!(report.counters.back_refs_written, 0);
    assert_eq!(tickets.ticket("T200 001").expect("a").ref_b, "I100-1");
    assert_eq!(incidents.incident("I100-1").expect("b").ext_a, "T200 002");
    assert_eq!(
        incidents.incident("I100-1").expect("b").processing_status_id,
        "new"
    );
}

#[tokio::test]
async fn contact_mapping_is_applied_when_linking() {
    let (tickets, incidents, bridge) = bridge();
    let mut record = ticket("1", "T200 001", "No", TicketStatus::New);
    record.contact_id = Some("contact-3".to_owned());
    tickets.insert(record);
    let mut record = incident("u1", "I100-7", "", IncidentStatus::New);
    record.caller_id = Some("caller-9".to_owned());
    incidents.insert(record);
    tickets.map_contact("caller-9", "contact-3");

    bridge.run_cycle().await.expect("cycle");

    let created = incidents.incident("I100-1").expect("created incident");
    assert_eq!(created.caller_id.as_deref(), Some("caller-9"));
    let created = tickets.ticket("T200 002").expect("created ticket");
    assert_eq!(created.contact_id.as_deref(), Some("contact-3"));
    assert_eq!(created.ref_b, "I100-7");
}

#[tokio::test]
async fn items_outside_lookback_are_not_linked() {
    let (tickets, incidents, bridge) = bridge();
    tickets.insert(ticket("1", "T200 001", "No", TicketStatus::New));
    tickets.touch_at("T200 001", Utc::now() - chrono::Duration::hours(72));

    let report = bridge.run_cycle().await.expect("cycle");

    assert_eq!(report.tickets_seen, 0);
    assert!(incidents.incidents().is_empty());
}

// ---------------------------------------------------------------------------
// Notes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ticket_note_reaches_incident_via_newest_action_fallback() {
    let (tickets, incidents, bridge) = bridge();
    let mut record = ticket("1", "T200 001", "I100-1", TicketStatus::InProgress);
    record.status_mirror = "in-progress".to_owned();
    let a = tickets.insert(record);
    let b = incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::New));
    let note = tickets.add_note(&a, "We replaced the fuser");
    incidents.hide_created_note_ids(true);

    let report = bridge.run_cycle().await.expect("cycle");
    assert!(report.is_clean(), "{:?}", report.failures);

    let actions = incidents.actions_of(&b);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].text, "We replaced the fuser");
    assert_eq!(
        note_map(&tickets, "T200 001").get(note.as_str()),
        Some(&MirrorSlot::Mirrored(actions[0].id.clone()))
    );
    assert_eq!(
        incidents.incident("I100-1").expect("b").processing_status_id,
        "response-received"
    );
}

#[tokio::test]
async fn failed_note_is_marked_and_retried() {
    let (tickets, incidents, bridge) = bridge();
    let a = tickets.insert(ticket("1", "T200 001", "I100-1", TicketStatus::InProgress));
    let b = incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::New));
    let note = tickets.add_note(&a, "Technician scheduled");
    incidents.fail_next_note_creates(1);

    bridge.run_cycle().await.expect("first cycle");
    assert_eq!(
        note_map(&tickets, "T200 001").get(note.as_str()),
        Some(&MirrorSlot::Failed)
    );

    bridge.run_cycle().await.expect("second cycle");
    assert_eq!(incidents.actions_of(&b).len(), 1);
    assert!(note_map(&tickets, "T200 001")
        .get(note.as_str())
        .is_some_and(MirrorSlot::is_mirrored));
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reopen_marker_reactivates_ticket() {
    let (tickets, incidents, bridge) = bridge();
    let mut record = ticket("1", "T200 001", "I100-1", TicketStatus::InProgress);
    record.status_mirror = "in-progress".to_owned();
    tickets.insert(record);
    let mut record = incident("u1", "I100-1", "T200 001", IncidentStatus::New);
    record.reopen_marker = "ready".to_owned();
    incidents.insert(record);

    let report = bridge.run_cycle().await.expect("cycle");

    assert_eq!(report.counters.reopened, 1);
    let a = tickets.ticket("T200 001").expect("ticket");
    assert_eq!(a.status, "customer-note-added");
    assert_eq!(a.status_mirror, "customer-note-added");
    let b = incidents.incident("I100-1").expect("incident");
    assert_eq!(b.reopen_marker, "");
    assert_eq!(b.processing_status_id, "in-progress");

    clear_logs(&tickets, &incidents);
    bridge.run_cycle().await.expect("second cycle");
    assert_quiet(&tickets, &incidents);
}

#[tokio::test]
async fn reactivated_incident_reopens_completed_ticket() {
    let (tickets, incidents, bridge) = bridge();
    let mut record = ticket("1", "T200 001", "I100-1", TicketStatus::Complete);
    record.status_mirror = "complete".to_owned();
    tickets.insert(record);
    let mut record = incident("u1", "I100-1", "T200 001", IncidentStatus::InProgress);
    record.reopen_marker = "done".to_owned();
    incidents.insert(record);

    bridge.run_cycle().await.expect("cycle");

    assert_eq!(
        tickets.ticket("T200 001").expect("ticket").status,
        "customer-note-added"
    );
    let b = incidents.incident("I100-1").expect("incident");
    assert_eq!(b.reopen_marker, "");
    assert_eq!(b.processing_status_id, "in-progress");
}

#[tokio::test]
async fn reopen_marker_on_new_incident_waits_for_link() {
    let (tickets, incidents, bridge) = bridge();
    let mut record = incident("u1", "I100-1", "", IncidentStatus::InProgress);
    record.reopen_marker = "ready".to_owned();
    incidents.insert(record);

    let report = bridge.run_cycle().await.expect("first cycle");
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(report.counters.tickets_created, 1);
    assert_eq!(report.counters.reopened, 0);
    assert_eq!(incidents.incident("I100-1").expect("b").reopen_marker, "ready");

    let report = bridge.run_cycle().await.expect("second cycle");
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(report.counters.reopened, 1);
    assert_eq!(
        tickets.ticket("T200 001").expect("ticket").status,
        "customer-note-added"
    );
    assert_eq!(incidents.incident("I100-1").expect("b").reopen_marker, "");
}

#[tokio::test]
async fn reopen_marker_without_resolvable_ticket_is_an_anomaly() {
    let config = SyncConfig {
        key_filter: KeyFilter {
            ignored_keys: vec!["T200 200 200".to_owned()],
            ..KeyFilter::default()
        },
        ..SyncConfig::for_account("294")
    };
    let (_tickets, incidents, bridge) = bridge_with(config);
    let mut record = incident("u1", "I100-1", "T200 200 200", IncidentStatus::New);
    record.reopen_marker = "ready".to_owned();
    incidents.insert(record);

    for _ in 0..2 {
        let report = bridge.run_cycle().await.expect("cycle");
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert!(report.anomalies.iter().any(|a| matches!(
            a,
            Anomaly::UnresolvableReopen { incident, .. } if incident == "I100-1"
        )));
        assert_eq!(report.counters.reopened, 0);
    }
    assert_eq!(incidents.incident("I100-1").expect("b").reopen_marker, "ready");
}

#[tokio::test]
async fn reengagement_status_drives_incident_in_progress() {
    let (tickets, incidents, bridge) = bridge();
    let mut record = ticket("1", "T200 001", "I100-1", TicketStatus::CustomerNoteAdded);
    record.status_mirror = "new".to_owned();
    tickets.insert(record);
    incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::ResponseReceived));

    bridge.run_cycle().await.expect("cycle");

    assert_eq!(
        incidents.incident("I100-1").expect("b").processing_status_id,
        "in-progress"
    );
    assert_eq!(
        tickets.ticket("T200 001").expect("a").status_mirror,
        "customer-note-added"
    );
}

#[tokio::test]
async fn other_transitions_only_update_the_mirror() {
    let config = SyncConfig {
        reengagement_statuses: vec![TicketStatus::CustomerNoteAdded],
        ..SyncConfig::for_account("294")
    };
    let (tickets, incidents, bridge) = bridge_with(config);
    let mut record = ticket("1", "T200 001", "I100-1", TicketStatus::InProgress);
    record.status_mirror = "new".to_owned();
    tickets.insert(record);
    incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::ResponseReceived));

    let report = bridge.run_cycle().await.expect("cycle");

    assert_eq!(
        tickets.ticket("T200 001").expect("a").status_mirror,
        "in-progress"
    );
    assert_eq!(
        incidents.incident("I100-1").expect("b").processing_status_id,
        "response-received"
    );
    assert_eq!(report.counters.mirrors_updated, 1);
    assert_eq!(report.counters.statuses_propagated, 0);
}

#[rstest]
#[case("complete")]
#[case("cancelled")]
#[tokio::test]
async fn finished_ticket_closes_its_incident(#[case] finished: &str) {
    let (tickets, incidents, bridge) = bridge();
    tickets.insert(ticket("1", "T200 001", "I100-1", TicketStatus::InProgress));
    incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::InProgress));
    bridge.run_cycle().await.expect("settle");

    tickets.edit("T200 001", |t| t.status = finished.to_owned());
    let report = bridge.run_cycle().await.expect("cycle");

    let b = incidents.incident("I100-1").expect("incident");
    assert_eq!(b.processing_status_id, "done");
    assert_eq!(b.reopen_marker, "done");
    assert_eq!(report.counters.closed_on_b, 1);
    assert_eq!(tickets.ticket("T200 001").expect("ticket").status, finished);
}

#[tokio::test]
async fn closing_ticket_side_closes_incident_and_vice_versa() {
    let (tickets, incidents, bridge) = bridge();
    tickets.insert(ticket("1", "T200 001", "I100-1", TicketStatus::InProgress));
    incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::InProgress));
    tickets.insert(ticket("2", "T200 002", "I100-2", TicketStatus::InProgress));
    incidents.insert(incident("u2", "I100-2", "T200 002", IncidentStatus::InProgress));
    bridge.run_cycle().await.expect("settle");

    tickets.edit("T200 001", |t| t.status = "complete".to_owned());
    incidents.edit("I100-2", |b| b.processing_status_id = "done".to_owned());
    let report = bridge.run_cycle().await.expect("cycle");

    let b1 = incidents.incident("I100-1").expect("b1");
    assert_eq!(b1.processing_status_id, "done");
    assert_eq!(b1.reopen_marker, "done");
    assert_eq!(tickets.ticket("T200 002").expect("a2").status, "complete");
    assert_eq!(report.counters.closed_on_a, 1);
    assert_eq!(report.counters.closed_on_b, 1);
}

#[tokio::test]
async fn filtered_keys_are_never_closed() {
    let config = SyncConfig {
        key_filter: KeyFilter {
            ignored_keys: vec!["T200 200 200".to_owned()],
            ..KeyFilter::default()
        },
        ..SyncConfig::for_account("294")
    };
    let (_tickets, incidents, bridge) = bridge_with(config);
    incidents.insert(incident("u1", "I100-1", "T200 200 200", IncidentStatus::New));

    let report = bridge.run_cycle().await.expect("cycle");

    assert_eq!(
        incidents.incident("I100-1").expect("b").processing_status_id,
        "new"
    );
    assert_eq!(report.counters.closed_on_b, 0);
    assert!(!report.anomalies.is_empty());
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_map_skips_only_that_pair() {
    let (tickets, incidents, bridge) = bridge();
    let mut broken = ticket("1", "T200 001", "I100-1", TicketStatus::InProgress);
    broken.attach_map = "{4711: 'β".to_owned();
    tickets.insert(broken);
    let b1 = incidents.insert(incident("u1", "I100-1", "T200 001", IncidentStatus::New));
    incidents.add_attachment(&b1, "a.txt", b"a");

    let a2 = tickets.insert(ticket("2", "T200 002", "I100-2", TicketStatus::InProgress));
    let b2 = incidents.insert(incident("u2", "I100-2", "T200 002", IncidentStatus::New));
    incidents.add_attachment(&b2, "b.txt", b"b");

    let report = bridge.run_cycle().await.expect("cycle");

    let failure = report
        .failures
        .iter()
        .find(|f| f.key == "T200 001")
        .expect("broken pair reported");
    assert_eq!(failure.kind, ErrorKind::PermanentOnItem);
    assert_eq!(failure.phase, Phase::Attachments);
    assert_eq!(tickets.attachments_of(&a2).len(), 1);
    assert!(tickets.attachments_of(&TicketId::from("1")).is_empty());
    assert_eq!(
        tickets.ticket("T200 001").expect("a").attach_map,
        "{4711: 'β"
    );
}

#[tokio::test]
async fn unknown_status_is_a_schema_violation_for_that_item() {
    let (tickets, incidents, bridge) = bridge();
    tickets.insert(ticket("1", "T200 001", "No", TicketStatus::New));
    let mut odd = incident("u1", "I100-1", "T200 001", IncidentStatus::New);
    odd.processing_status_id = "escalated".to_owned();
    incidents.insert(odd);

    let report = bridge.run_cycle().await.expect("cycle");

    let failure = &report.failures[0];
    assert_eq!(failure.phase, Phase::Enumerate);
    assert_eq!(failure.kind, ErrorKind::SchemaViolation);
    assert_eq!(report.incidents_seen, 0);
    // The ticket is still linked; the odd incident is not closed.
    assert_eq!(report.counters.incidents_created, 1);
    assert_eq!(
        incidents.incident("I100-1").expect("b").processing_status_id,
        "escalated"
    );
}

#[tokio::test]
async fn both_sides_down_is_fatal() {
    let (tickets, incidents, bridge) = bridge();
    tickets.fail_listing(true);
    incidents.fail_listing(true);

    let err = bridge.run_cycle().await.expect_err("cycle must abort");
    assert!(matches!(err, SyncError::Unreachable { .. }));
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert_eq!(bridge.progress().await.last_success, None);
}

#[tokio::test]
async fn one_side_down_aborts_without_closing_anything() {
    let (tickets, incidents, bridge) = bridge();
    tickets.insert(ticket("1", "T200 001", "I100-1", TicketStatus::InProgress));
    incidents.fail_listing(true);

    let err = bridge.run_cycle().await.expect_err("cycle must abort");
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(
        tickets.ticket("T200 001").expect("ticket").status,
        "in-progress"
    );
    assert!(tickets.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_backend_times_out() {
    let config = SyncConfig {
        call_timeout_secs: 30,
        ..SyncConfig::for_account("294")
    };
    let (_tickets, incidents, bridge) = bridge_with(config);
    incidents.set_delay(Some(Duration::from_secs(120)));

    let err = bridge.run_cycle().await.expect_err("timeout");
    assert!(matches!(err, SyncError::Timeout { .. }));
    assert_eq!(err.kind(), ErrorKind::Transient);
}

#[tokio::test(start_paused = true)]
async fn overlapping_cycles_are_rejected() {
    let (tickets, incidents, bridge) = bridge();
    tickets.insert(ticket("1", "T200 001", "No", TicketStatus::New));
    incidents.set_delay(Some(Duration::from_secs(1)));

    let (first, second) = tokio::join!(bridge.run_cycle(), bridge.run_cycle());

    assert!(first.is_ok());
    assert!(matches!(second, Err(SyncError::CycleInProgress)));
    assert!(bridge.progress().await.last_success.is_some());
}

#[tokio::test]
async fn progress_tracks_last_success() {
    let (_tickets, _incidents, bridge) = bridge();
    let now = Utc::now();
    bridge.run_cycle_at(now).await.expect("cycle");
    let progress = bridge.progress().await;
    assert_eq!(progress.last_started, Some(now));
    assert_eq!(progress.last_success, Some(now));
}

#[tokio::test]
async fn unused_incident_id_is_reported_not_found() {
    let (_tickets, incidents, _bridge) = bridge();
    let err = tandem_sync::IncidentRepository::get(incidents.as_ref(), &IncidentId::from("nope"))
        .await
        .expect_err("missing");
    assert!(matches!(err, tandem_sync::RepoError::NotFound { .. }));
}
