// Property-based tests for the day grid layout
// Random interval sets checked against brute-force references

use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};

use physio_schedule::models::appointment::Appointment;
use physio_schedule::services::layout::{compute_position, group_overlaps, GridConfig};

#[path = "../fixtures/mod.rs"]
mod fixtures;

use fixtures::{appointment_at_offset, monday};

/// (start offset in minutes after 07:00, duration in minutes)
fn interval_set() -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec((0u32..600, 5u32..120), 1..25)
}

fn build(intervals: &[(u32, u32)]) -> Vec<Appointment> {
    intervals
        .iter()
        .enumerate()
        .map(|(i, &(offset, minutes))| {
            appointment_at_offset(&format!("apt-{:02}", i), monday(), offset, minutes)
        })
        .collect()
}

fn overlaps(a: &Appointment, b: &Appointment) -> bool {
    a.start() < b.end() && b.start() < a.end()
}

/// Connected components of the overlap graph, by breadth-first search.
fn reference_components(appointments: &[Appointment]) -> Vec<BTreeSet<String>> {
    let mut seen = vec![false; appointments.len()];
    let mut components = Vec::new();

    for root in 0..appointments.len() {
        if seen[root] {
            continue;
        }
        seen[root] = true;
        let mut queue = vec![root];
        let mut component = BTreeSet::new();

        while let Some(current) = queue.pop() {
            component.insert(appointments[current].id.clone());
            for next in 0..appointments.len() {
                if !seen[next] && overlaps(&appointments[current], &appointments[next]) {
                    seen[next] = true;
                    queue.push(next);
                }
            }
        }
        components.push(component);
    }

    components
}

/// Largest number of appointments running at the same instant. For
/// interval graphs this equals the chromatic number.
fn reference_max_clique(members: &[&Appointment]) -> usize {
    members
        .iter()
        .map(|probe| {
            members
                .iter()
                .filter(|other| other.start() <= probe.start() && probe.start() < other.end())
                .count()
        })
        .max()
        .unwrap_or(0)
}

proptest! {
    /// Strictly overlapping appointments share a group and never a column.
    #[test]
    fn prop_overlapping_appointments_never_collide(intervals in interval_set()) {
        let appointments = build(&intervals);
        let slots = group_overlaps(&appointments, monday());

        for a in &appointments {
            for b in &appointments {
                if a.id == b.id || !overlaps(a, b) {
                    continue;
                }
                let (slot_a, slot_b) = (slots[&a.id], slots[&b.id]);
                prop_assert_eq!(slot_a.group_id, slot_b.group_id);
                prop_assert_ne!(slot_a.column_index, slot_b.column_index);
            }
        }
    }

    /// Groups are exactly the overlap components and use no more columns
    /// than the busiest instant needs.
    #[test]
    fn prop_groups_use_minimal_columns(intervals in interval_set()) {
        let appointments = build(&intervals);
        let slots = group_overlaps(&appointments, monday());

        let mut groups: HashMap<usize, Vec<&Appointment>> = HashMap::new();
        for appointment in &appointments {
            groups.entry(slots[&appointment.id].group_id).or_default().push(appointment);
        }

        let mut actual: Vec<BTreeSet<String>> = groups
            .values()
            .map(|members| members.iter().map(|a| a.id.clone()).collect())
            .collect();
        let mut expected = reference_components(&appointments);
        actual.sort();
        expected.sort();
        prop_assert_eq!(actual, expected);

        for members in groups.values() {
            let column_count = slots[&members[0].id].column_count;
            prop_assert!(members.iter().all(|a| slots[&a.id].column_count == column_count));
            prop_assert!(members.iter().all(|a| slots[&a.id].column_index < column_count));
            prop_assert_eq!(column_count, reference_max_clique(members));
        }
    }

    /// Longer appointments are taller once past the height floor; more
    /// columns make every card narrower.
    #[test]
    fn prop_position_is_monotonic(
        minutes in 31u32..400,
        extra in 1u32..60,
        columns in 1usize..8,
        multiplier in 0.5f64..=2.0,
    ) {
        let config = GridConfig::default().with_multiplier(multiplier);
        let short = appointment_at_offset("short", monday(), 60, minutes);
        let long = appointment_at_offset("long", monday(), 60, minutes + extra);

        let short_pos = compute_position(&short, 0, columns, &config);
        let long_pos = compute_position(&long, 0, columns, &config);
        prop_assert!(long_pos.height_px > short_pos.height_px);

        let narrow = compute_position(&short, 0, columns + 1, &config);
        prop_assert!(narrow.width_percent < short_pos.width_percent);
    }
}
