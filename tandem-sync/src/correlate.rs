//! Correlation map: classify open tickets and incidents into pairs and orphans.
//!
//! Pure; no remote calls. Indices in the output refer to the input slices.

use std::collections::{HashMap, HashSet};

use tandem_core::{Incident, KeyFilter, Ticket};

use crate::report::Anomaly;

/// Side of a pair whose back-reference is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackRef {
    /// Ticket has `ref_B = "No"` but the incident names it in `ext_A`.
    OnTicket,
    /// Incident has an empty `ext_A` but the ticket names it in `ref_B`.
    OnIncident,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    pub ticket: usize,
    pub incident: usize,
    pub missing: Option<BackRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanReason {
    /// No reference at all; the linker creates a counterpart.
    Unlinked,
    /// The referenced counterpart is not among the open items.
    Stale,
    /// Both sides reference something and they disagree.
    Conflict,
    /// `ext_A` was rejected by the key filter.
    Filtered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orphan {
    pub index: usize,
    pub reason: OrphanReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    pub pairs: Vec<Pair>,
    pub orphan_tickets: Vec<Orphan>,
    pub orphan_incidents: Vec<Orphan>,
    pub anomalies: Vec<Anomaly>,
}

impl Correlation {
    pub fn unlinked_tickets(&self) -> impl Iterator<Item = usize> + '_ {
        unlinked(&self.orphan_tickets)
    }

    pub fn unlinked_incidents(&self) -> impl Iterator<Item = usize> + '_ {
        unlinked(&self.orphan_incidents)
    }
}

fn unlinked(orphans: &[Orphan]) -> impl Iterator<Item = usize> + '_ {
    orphans
        .iter()
        .filter(|o| o.reason == OrphanReason::Unlinked)
        .map(|o| o.index)
}

/// Build the pairing between `tickets` and `incidents`.
///
/// Every ticket and every incident lands in exactly one of `pairs`,
/// `orphan_tickets` or `orphan_incidents`.
pub fn correlate(tickets: &[Ticket], incidents: &[Incident], filter: &KeyFilter) -> Correlation {
    let ticket_by_number: HashMap<&str, usize> = tickets
        .iter()
        .enumerate()
        .map(|(i, t)| (t.number.as_str(), i))
        .collect();
    let incident_by_number: HashMap<&str, usize> = incidents
        .iter()
        .enumerate()
        .map(|(j, b)| (b.number.as_str(), j))
        .collect();

    let mut out = Correlation::default();
    let mut ticket_done: HashSet<usize> = HashSet::new();
    let mut incident_done: HashSet<usize> = HashSet::new();

    // Mutual references pair first, so input order cannot demote them.
    for (i, ticket) in tickets.iter().enumerate() {
        let Some(ref_b) = &ticket.ref_b else { continue };
        let Some(&j) = incident_by_number.get(ref_b.as_str()) else {
            continue;
        };
        let mutual = incidents[j]
            .ext_a
            .as_deref()
            .and_then(|raw| filter.normalize(raw))
            .is_some_and(|key| key == ticket.number);
        if mutual && !incident_done.contains(&j) {
            ticket_done.insert(i);
            incident_done.insert(j);
            out.pairs.push(Pair {
                ticket: i,
                incident: j,
                missing: None,
            });
        }
    }

    // Remaining ticket-side references: `by_number[a.ref_B]`.
    for (i, ticket) in tickets.iter().enumerate() {
        if ticket_done.contains(&i) {
            continue;
        }
        let Some(ref_b) = &ticket.ref_b else { continue };
        ticket_done.insert(i);

        let Some(&j) = incident_by_number.get(ref_b.as_str()) else {
            out.orphan_tickets.push(Orphan {
                index: i,
                reason: OrphanReason::Stale,
            });
            out.anomalies.push(Anomaly::StaleReference {
                ticket: ticket.number.to_string(),
                ref_b: ref_b.to_string(),
            });
            continue;
        };

        let incident = &incidents[j];
        let claimed = incident_done.contains(&j);
        if incident.ext_a.is_none() && !claimed {
            incident_done.insert(j);
            out.pairs.push(Pair {
                ticket: i,
                incident: j,
                missing: Some(BackRef::OnIncident),
            });
            continue;
        }

        out.orphan_tickets.push(Orphan {
            index: i,
            reason: OrphanReason::Conflict,
        });
        if !claimed {
            incident_done.insert(j);
            out.orphan_incidents.push(Orphan {
                index: j,
                reason: OrphanReason::Conflict,
            });
        }
        out.anomalies.push(Anomaly::ConflictingReferences {
            ticket: ticket.number.to_string(),
            ref_b: ref_b.to_string(),
            incident: incident.number.to_string(),
            ext_a: incident.ext_a.clone().unwrap_or_default(),
        });
    }

    // Then incident-side references for whatever is left.
    for (j, incident) in incidents.iter().enumerate() {
        if incident_done.contains(&j) {
            continue;
        }
        let Some(raw) = &incident.ext_a else {
            out.orphan_incidents.push(Orphan {
                index: j,
                reason: OrphanReason::Unlinked,
            });
            continue;
        };
        let Some(key) = filter.normalize(raw) else {
            out.orphan_incidents.push(Orphan {
                index: j,
                reason: OrphanReason::Filtered,
            });
            out.anomalies.push(Anomaly::FilteredKey {
                incident: incident.number.to_string(),
                raw: raw.clone(),
            });
            continue;
        };
        let Some(&i) = ticket_by_number.get(key.as_str()) else {
            out.orphan_incidents.push(Orphan {
                index: j,
                reason: OrphanReason::Stale,
            });
            out.anomalies.push(Anomaly::DanglingExtA {
                incident: incident.number.to_string(),
                ext_a: key.to_string(),
            });
            continue;
        };

        let ticket = &tickets[i];
        if ticket.ref_b.is_none() && !ticket_done.contains(&i) {
            ticket_done.insert(i);
            out.pairs.push(Pair {
                ticket: i,
                incident: j,
                missing: Some(BackRef::OnTicket),
            });
        } else {
            out.orphan_incidents.push(Orphan {
                index: j,
                reason: OrphanReason::Conflict,
            });
            out.anomalies.push(Anomaly::ConflictingReferences {
                ticket: ticket.number.to_string(),
                ref_b: ticket
                    .ref_b
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                incident: incident.number.to_string(),
                ext_a: raw.clone(),
            });
        }
    }

    for (i, ticket) in tickets.iter().enumerate() {
        if !ticket_done.contains(&i) {
            debug_assert!(ticket.ref_b.is_none());
            out.orphan_tickets.push(Orphan {
                index: i,
                reason: OrphanReason::Unlinked,
            });
        }
    }

    out
}
