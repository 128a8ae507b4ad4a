//! Overlap grouping for the day grid.
//!
//! Appointments whose time ranges transitively intersect form one cluster.
//! Every member of a cluster gets a column via first-fit and the cluster's
//! column count, so concurrent appointments render side by side at equal
//! width. Back-to-back appointments (one ends when the next starts) do not
//! overlap.

use chrono::{NaiveDate, NaiveDateTime};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use super::union_find::UnionFind;
use crate::models::appointment::Appointment;

/// Placement of one appointment inside its overlap cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSlot {
    pub group_id: usize,
    pub column_index: usize,
    pub column_count: usize,
}

/// A maximal set of transitively overlapping appointments. Derived on
/// every call, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapGroup {
    pub id: usize,
    /// Member ids in sweep order (start, longest first, id).
    pub members: Vec<String>,
    pub column_count: usize,
}

struct Interval<'a> {
    id: &'a str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    duration_minutes: u32,
}

/// Assign every appointment on `day` a column index and column count.
pub fn group_overlaps(appointments: &[Appointment], day: NaiveDate) -> HashMap<String, GroupSlot> {
    let (groups, slots) = build_groups(appointments, day);
    log::debug!(
        "Grouped {} appointments on {} into {} clusters",
        slots.len(),
        day,
        groups.len()
    );
    slots
}

/// Same computation as [`group_overlaps`], also returning the clusters.
pub fn overlap_groups(
    appointments: &[Appointment],
    day: NaiveDate,
) -> (Vec<OverlapGroup>, HashMap<String, GroupSlot>) {
    build_groups(appointments, day)
}

fn build_groups(
    appointments: &[Appointment],
    day: NaiveDate,
) -> (Vec<OverlapGroup>, HashMap<String, GroupSlot>) {
    let intervals = collect_intervals(appointments, day);
    if intervals.is_empty() {
        return (Vec::new(), HashMap::new());
    }

    // Sweep in start order. Everything still running when an appointment
    // starts is already one cluster, so joining its first member is enough.
    let mut sets = UnionFind::new(intervals.len());
    let mut cluster: Option<(usize, NaiveDateTime)> = None;
    for (index, interval) in intervals.iter().enumerate() {
        cluster = match cluster {
            Some((anchor, reach)) if reach > interval.start => {
                sets.union(anchor, index);
                Some((anchor, reach.max(interval.end)))
            }
            _ => Some((index, interval.end)),
        };
    }

    // Clusters in order of their earliest member.
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for index in 0..intervals.len() {
        let root = sets.find(index);
        let group_id = *group_of_root.entry(root).or_insert_with(|| {
            members.push(Vec::new());
            members.len() - 1
        });
        members[group_id].push(index);
    }

    let mut groups = Vec::with_capacity(members.len());
    let mut slots = HashMap::with_capacity(intervals.len());

    for (group_id, group_members) in members.into_iter().enumerate() {
        let columns = assign_columns(&intervals, &group_members);
        let column_count = columns.iter().copied().max().map_or(1, |max| max + 1);

        for (&index, &column_index) in group_members.iter().zip(columns.iter()) {
            slots.insert(
                intervals[index].id.to_string(),
                GroupSlot {
                    group_id,
                    column_index,
                    column_count,
                },
            );
        }

        groups.push(OverlapGroup {
            id: group_id,
            members: group_members
                .iter()
                .map(|&index| intervals[index].id.to_string())
                .collect(),
            column_count,
        });
    }

    (groups, slots)
}

/// Appointments on `day` that occupy the grid, in sweep order.
fn collect_intervals(appointments: &[Appointment], day: NaiveDate) -> Vec<Interval<'_>> {
    let mut seen = HashSet::new();
    let mut intervals = Vec::new();

    for appointment in appointments {
        if appointment.date != day || !appointment.status.occupies_slot() {
            continue;
        }

        if !seen.insert(appointment.id.as_str()) {
            log::warn!(
                "Duplicate appointment id {} on {}; keeping the first",
                appointment.id,
                day
            );
            continue;
        }

        intervals.push(Interval {
            id: appointment.id.as_str(),
            start: appointment.start(),
            end: appointment.end(),
            duration_minutes: appointment.duration_minutes,
        });
    }

    intervals.sort_by(|a, b| {
        (a.start, Reverse(a.duration_minutes), a.id).cmp(&(b.start, Reverse(b.duration_minutes), b.id))
    });
    intervals
}

/// First-fit: reuse the lowest column whose last occupant has ended.
fn assign_columns(intervals: &[Interval<'_>], group_members: &[usize]) -> Vec<usize> {
    let mut column_ends: Vec<NaiveDateTime> = Vec::new();
    let mut assigned = Vec::with_capacity(group_members.len());

    for &index in group_members {
        let interval = &intervals[index];
        let column = match column_ends.iter().position(|&end| end <= interval.start) {
            Some(column) => {
                column_ends[column] = interval.end;
                column
            }
            None => {
                column_ends.push(interval.end);
                column_ends.len() - 1
            }
        };
        assigned.push(column);
    }

    assigned
}
