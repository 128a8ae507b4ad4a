// Appointment service module
// Tenant-scoped reads and writes of the shared appointment list

mod mapper;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::appointment::{normalize_records, Appointment, AppointmentRecord, SkippedRecord};
use crate::models::tenant::TenantId;
use crate::services::database::Database;

use mapper::{row_to_appointment, APPOINTMENT_COLUMNS};

/// Read and write access to stored appointments. Each call is atomic.
pub trait AppointmentStore: Send + 'static {
    /// Appointments of `tenant_id` dated `from..=to`.
    fn fetch_appointments(
        &self,
        tenant_id: &TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Appointment>>;

    /// Insert or replace; last write wins.
    fn save_appointment(&mut self, appointment: &Appointment) -> Result<Appointment>;
}

/// Outcome of a bulk import.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: Vec<SkippedRecord>,
}

pub struct AppointmentService<'a> {
    conn: &'a Connection,
}

impl<'a> AppointmentService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Appointments dated `from..=to`. Rows that no longer map to a valid
    /// appointment are logged and left out.
    pub fn fetch_appointments(
        &self,
        tenant_id: &TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Appointment>> {
        let (appointments, skipped) = self.fetch_appointments_with_skipped(tenant_id, from, to)?;
        for record in &skipped {
            log::warn!("Stored {}", record);
        }
        Ok(appointments)
    }

    /// Like [`fetch_appointments`](Self::fetch_appointments), also returning
    /// the rows that were left out.
    pub fn fetch_appointments_with_skipped(
        &self,
        tenant_id: &TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(Vec<Appointment>, Vec<SkippedRecord>)> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM appointments
                 WHERE tenant_id = ?1 AND appointment_date BETWEEN ?2 AND ?3
                 ORDER BY appointment_date, start_time, id",
                APPOINTMENT_COLUMNS
            ))
            .context("Failed to prepare appointment query")?;

        let mut rows = stmt
            .query(params![tenant_id.as_str(), from, to])
            .context("Failed to query appointments")?;

        let mut appointments = Vec::new();
        let mut skipped = Vec::new();
        while let Some(row) = rows.next().context("Failed to read appointment row")? {
            let mapped = row_to_appointment(row)
                .map_err(|e| e.to_string())
                .and_then(|appointment| appointment.validate().map(|_| appointment));

            match mapped {
                Ok(appointment) => appointments.push(appointment),
                Err(reason) => skipped.push(SkippedRecord {
                    record_id: row.get::<_, String>(0).ok(),
                    reason,
                }),
            }
        }

        Ok((appointments, skipped))
    }

    pub fn get(&self, tenant_id: &TenantId, id: &str) -> Result<Option<Appointment>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM appointments WHERE tenant_id = ?1 AND id = ?2",
                    APPOINTMENT_COLUMNS
                ),
                params![tenant_id.as_str(), id],
                row_to_appointment,
            )
            .optional()
            .with_context(|| format!("Failed to load appointment {}", id))
    }

    /// Upsert an appointment and return it as stored.
    pub fn save_appointment(&self, appointment: &Appointment) -> Result<Appointment> {
        appointment
            .validate()
            .map_err(|e| anyhow!("Invalid appointment {}: {}", appointment.id, e))?;

        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO appointments (
                    id, tenant_id, appointment_date, start_time, duration_minutes,
                    patient_id, therapist_id, status, appointment_type, notes, room,
                    series_id, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                ON CONFLICT (tenant_id, id) DO UPDATE SET
                    appointment_date = excluded.appointment_date,
                    start_time = excluded.start_time,
                    duration_minutes = excluded.duration_minutes,
                    patient_id = excluded.patient_id,
                    therapist_id = excluded.therapist_id,
                    status = excluded.status,
                    appointment_type = excluded.appointment_type,
                    notes = excluded.notes,
                    room = excluded.room,
                    series_id = excluded.series_id,
                    updated_at = excluded.updated_at",
                params![
                    appointment.id,
                    appointment.tenant_id.as_str(),
                    appointment.date,
                    appointment.start_time,
                    appointment.duration_minutes as i64,
                    appointment.patient_id,
                    appointment.therapist_id,
                    appointment.status.as_str(),
                    appointment.appointment_type,
                    appointment.notes,
                    appointment.room,
                    appointment.series_id,
                    &now,
                ],
            )
            .with_context(|| format!("Failed to save appointment {}", appointment.id))?;

        self.get(&appointment.tenant_id, &appointment.id)?
            .ok_or_else(|| anyhow!("Appointment {} vanished after save", appointment.id))
    }

    /// Cancel without deleting.
    pub fn cancel(&self, tenant_id: &TenantId, id: &str) -> Result<Appointment> {
        let mut appointment = self
            .get(tenant_id, id)?
            .ok_or_else(|| anyhow!("Appointment {} not found", id))?;

        appointment.cancel();
        self.save_appointment(&appointment)
    }

    /// Normalize and store raw platform records in one transaction.
    /// Malformed records are reported, not fatal.
    pub fn import_records(
        &self,
        tenant_id: &TenantId,
        records: Vec<AppointmentRecord>,
    ) -> Result<ImportReport> {
        let (appointments, skipped) = normalize_records(records, tenant_id);

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to start import")?;
        for appointment in &appointments {
            self.save_appointment(appointment)?;
        }
        tx.commit().context("Failed to commit import")?;

        log::info!(
            "Imported {} appointments for {} ({} skipped)",
            appointments.len(),
            tenant_id,
            skipped.len()
        );

        Ok(ImportReport {
            imported: appointments.len(),
            skipped,
        })
    }
}

impl AppointmentStore for Database {
    fn fetch_appointments(
        &self,
        tenant_id: &TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Appointment>> {
        AppointmentService::new(self.connection()).fetch_appointments(tenant_id, from, to)
    }

    fn save_appointment(&mut self, appointment: &Appointment) -> Result<Appointment> {
        AppointmentService::new(self.connection()).save_appointment(appointment)
    }
}
