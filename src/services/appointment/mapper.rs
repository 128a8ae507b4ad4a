use chrono::{NaiveDate, NaiveTime};
use rusqlite::{Error, Result, Row};

use crate::models::appointment::{Appointment, AppointmentStatus};
use crate::models::tenant::TenantId;
use crate::utils::date::parse_timestamp;

pub(super) const APPOINTMENT_COLUMNS: &str = "id, tenant_id, appointment_date, start_time, \
     duration_minutes, patient_id, therapist_id, status, appointment_type, notes, room, \
     series_id, created_at, updated_at";

pub(super) fn row_to_appointment(row: &Row) -> Result<Appointment> {
    let tenant_id = TenantId::new(row.get::<_, String>(1)?).map_err(|e| conversion_error(1, e))?;
    let status = row
        .get::<_, String>(7)?
        .parse::<AppointmentStatus>()
        .map_err(|e| conversion_error(7, e))?;
    let created_at: Option<String> = row.get(12)?;
    let updated_at: Option<String> = row.get(13)?;

    Ok(Appointment {
        id: row.get(0)?,
        tenant_id,
        date: row.get::<_, NaiveDate>(2)?,
        start_time: row.get::<_, NaiveTime>(3)?,
        duration_minutes: row.get::<_, i64>(4)?.max(0) as u32,
        patient_id: row.get(5)?,
        therapist_id: row.get(6)?,
        status,
        appointment_type: row.get(8)?,
        notes: row.get(9)?,
        room: row.get(10)?,
        series_id: row.get(11)?,
        created_at: created_at.as_deref().and_then(parse_timestamp),
        updated_at: updated_at.as_deref().and_then(parse_timestamp),
    })
}

fn conversion_error(index: usize, message: String) -> Error {
    Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, message.into())
}
