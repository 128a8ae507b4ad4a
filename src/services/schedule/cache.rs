use chrono::NaiveDate;
use std::collections::HashMap;

use crate::models::appointment::Appointment;
use crate::models::tenant::TenantId;

/// A change that has been shown but not yet confirmed by the store.
#[derive(Debug, Clone)]
struct PendingChange {
    previous: Option<Appointment>,
    optimistic: Appointment,
}

/// Client-side copy of one tenant's appointments for a date range.
///
/// Optimistic changes are visible immediately and survive a reload until
/// they are confirmed or rolled back. The cache only goes stale when told
/// to; nothing expires on its own.
#[derive(Debug)]
pub struct AppointmentCache {
    tenant_id: TenantId,
    range: Option<(NaiveDate, NaiveDate)>,
    entries: HashMap<String, Appointment>,
    pending: HashMap<String, PendingChange>,
    stale: bool,
    generation: u64,
}

impl AppointmentCache {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            range: None,
            entries: HashMap::new(),
            pending: HashMap::new(),
            stale: true,
            generation: 0,
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.range
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn invalidate(&mut self) {
        self.stale = true;
        self.generation += 1;
    }

    /// Bumped by every [`invalidate`](Self::invalidate). A load records it
    /// before reading so a signal that lands mid-read is not lost.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Appointment> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached appointments ordered by date, start time and id.
    pub fn appointments(&self) -> Vec<Appointment> {
        let mut all: Vec<Appointment> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| {
            (a.date, a.start_time, &a.id).cmp(&(b.date, b.start_time, &b.id))
        });
        all
    }

    pub fn appointments_on(&self, date: NaiveDate) -> Vec<Appointment> {
        self.appointments()
            .into_iter()
            .filter(|a| a.date == date)
            .collect()
    }

    /// Swap in a fresh read of `range`. In-flight optimistic changes are
    /// laid back on top; their rollback target becomes the fresh value.
    pub fn replace_all(&mut self, range: (NaiveDate, NaiveDate), appointments: Vec<Appointment>) {
        let generation = self.generation;
        self.replace_read_at(generation, range, appointments);
    }

    /// Like [`replace_all`](Self::replace_all) for a read that started at
    /// `generation`. The cache stays stale if it was invalidated since.
    pub fn replace_read_at(
        &mut self,
        generation: u64,
        range: (NaiveDate, NaiveDate),
        appointments: Vec<Appointment>,
    ) {
        self.range = Some(range);
        self.entries = appointments
            .into_iter()
            .filter(|a| a.tenant_id == self.tenant_id)
            .map(|a| (a.id.clone(), a))
            .collect();

        for (id, change) in self.pending.iter_mut() {
            change.previous = self.entries.remove(id);
            if in_range(self.range, &change.optimistic) {
                self.entries.insert(id.clone(), change.optimistic.clone());
            }
        }

        self.stale = self.generation != generation;
    }

    pub fn apply_optimistic(&mut self, appointment: Appointment) {
        let id = appointment.id.clone();
        let shown = self.entries.get(&id).cloned();
        self.place(appointment.clone());

        match self.pending.get_mut(&id) {
            Some(change) => change.optimistic = appointment,
            None => {
                self.pending.insert(
                    id,
                    PendingChange {
                        previous: shown,
                        optimistic: appointment,
                    },
                );
            }
        }
    }

    /// Replace the optimistic value with what the store returned.
    pub fn confirm(&mut self, stored: Appointment) {
        self.pending.remove(&stored.id);
        self.place(stored);
    }

    /// Undo the optimistic change for `id`. Returns whether there was one.
    pub fn rollback(&mut self, id: &str) -> bool {
        let Some(change) = self.pending.remove(id) else {
            return false;
        };

        match change.previous {
            Some(previous) => {
                self.entries.insert(id.to_string(), previous);
            }
            None => {
                self.entries.remove(id);
            }
        }
        true
    }

    fn place(&mut self, appointment: Appointment) {
        if in_range(self.range, &appointment) {
            self.entries.insert(appointment.id.clone(), appointment);
        } else {
            self.entries.remove(&appointment.id);
        }
    }
}

fn in_range(range: Option<(NaiveDate, NaiveDate)>, appointment: &Appointment) -> bool {
    range.map_or(true, |(from, to)| appointment.date >= from && appointment.date <= to)
}
