// Layout service module
// Turns a day's appointments into side-by-side grid placements

mod grouping;
mod position;
mod union_find;

pub use grouping::{group_overlaps, overlap_groups, GroupSlot, OverlapGroup};
pub use position::{compute_position, pixels_per_minute, GridConfig, Position};

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

use crate::models::appointment::{normalize_records, Appointment, AppointmentRecord, SkippedRecord};
use crate::models::tenant::TenantId;

/// One appointment ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedAppointment {
    pub appointment_id: String,
    pub group_id: usize,
    pub column_index: usize,
    pub column_count: usize,
    pub position: Position,
}

/// Everything the day grid needs for one render pass.
#[derive(Debug, Clone, Default)]
pub struct DayLayout {
    pub date: Option<NaiveDate>,
    pub placed: Vec<PlacedAppointment>,
    pub skipped: Vec<SkippedRecord>,
}

impl DayLayout {
    pub fn get(&self, appointment_id: &str) -> Option<&PlacedAppointment> {
        self.placed
            .iter()
            .find(|placed| placed.appointment_id == appointment_id)
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }
}

/// Normalize raw records and lay out those falling on `day`.
pub fn layout_day(
    records: impl IntoIterator<Item = AppointmentRecord>,
    tenant_id: &TenantId,
    day: NaiveDate,
    config: &GridConfig,
) -> DayLayout {
    let (appointments, skipped) = normalize_records(records, tenant_id);
    let mut layout = layout_appointments(&appointments, day, config);
    layout.skipped = skipped;
    layout
}

/// Lay out already-normalized appointments.
pub fn layout_appointments(
    appointments: &[Appointment],
    day: NaiveDate,
    config: &GridConfig,
) -> DayLayout {
    let slots = group_overlaps(appointments, day);
    let mut seen = HashSet::new();
    let mut placed = Vec::new();

    for appointment in appointments {
        if appointment.date != day || !appointment.status.occupies_slot() {
            continue;
        }
        if !seen.insert(appointment.id.as_str()) {
            continue;
        }

        let slot = match slots.get(&appointment.id) {
            Some(slot) if slot.column_index < slot.column_count => *slot,
            _ => {
                log::warn!(
                    "No consistent column for appointment {}; placing it full width",
                    appointment.id
                );
                GroupSlot {
                    group_id: usize::MAX,
                    column_index: 0,
                    column_count: 1,
                }
            }
        };

        placed.push(PlacedAppointment {
            appointment_id: appointment.id.clone(),
            group_id: slot.group_id,
            column_index: slot.column_index,
            column_count: slot.column_count,
            position: compute_position(appointment, slot.column_index, slot.column_count, config),
        });
    }

    placed.sort_by(|a, b| {
        a.position
            .top_px
            .total_cmp(&b.position.top_px)
            .then(a.position.left_percent.total_cmp(&b.position.left_percent))
            .then_with(|| a.appointment_id.cmp(&b.appointment_id))
    });

    DayLayout {
        date: Some(day),
        placed,
        skipped: Vec::new(),
    }
}
