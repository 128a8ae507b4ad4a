use chrono::{NaiveDate, NaiveDateTime, Weekday};
use rusqlite::{Error, Result, Row};

use crate::models::recurrence::{
    EndCondition, RecurringOccurrence, RecurringSeries, SeriesTemplate,
};
use crate::models::tenant::TenantId;
use crate::utils::date::parse_timestamp;

pub(super) const SERIES_COLUMNS: &str = "id, tenant_id, patient_id, therapist_id, duration_minutes, \
     appointment_type, room, notes, start_datetime, frequency, interval, weekdays, \
     end_type, end_count, end_until, skipped_dates, created_at, cancelled_at";

pub(super) const OCCURRENCE_COLUMNS: &str = "id, tenant_id, series_id, occurrence_date, \
     start_datetime, duration_minutes, state, is_exception";

pub(super) fn row_to_series(row: &Row) -> Result<RecurringSeries> {
    let end_type: String = row.get(12)?;
    let end = match end_type.as_str() {
        "count" => EndCondition::Count(row.get::<_, i64>(13)?.max(0) as u32),
        "until" => EndCondition::Until(row.get(14)?),
        _ => EndCondition::Never,
    };

    let created_at: Option<String> = row.get(16)?;

    Ok(RecurringSeries {
        id: row.get(0)?,
        tenant_id: tenant_from_row(row, 1)?,
        template: SeriesTemplate {
            patient_id: row.get(2)?,
            therapist_id: row.get(3)?,
            duration_minutes: row.get::<_, i64>(4)?.max(0) as u32,
            appointment_type: row.get(5)?,
            room: row.get(6)?,
            notes: row.get(7)?,
        },
        start: row.get::<_, NaiveDateTime>(8)?,
        frequency: row
            .get::<_, String>(9)?
            .parse()
            .map_err(|e: String| conversion_error(9, e))?,
        interval: row.get::<_, i64>(10)?.max(0) as u32,
        weekdays: decode_weekdays(row.get(11)?).map_err(|e| conversion_error(11, e))?,
        end,
        skipped_dates: decode_dates(row.get(15)?).map_err(|e| conversion_error(15, e))?,
        created_at: created_at.as_deref().and_then(parse_timestamp),
        cancelled_at: row.get(17)?,
    })
}

pub(super) fn row_to_occurrence(row: &Row) -> Result<RecurringOccurrence> {
    Ok(RecurringOccurrence {
        id: row.get(0)?,
        tenant_id: tenant_from_row(row, 1)?,
        series_id: row.get(2)?,
        occurrence_date: row.get::<_, NaiveDate>(3)?,
        start: row.get::<_, NaiveDateTime>(4)?,
        duration_minutes: row.get::<_, i64>(5)?.max(0) as u32,
        state: row
            .get::<_, String>(6)?
            .parse()
            .map_err(|e: String| conversion_error(6, e))?,
        exception: row.get::<_, i32>(7)? != 0,
    })
}

pub(super) fn end_columns(end: &EndCondition) -> (&'static str, Option<i64>, Option<NaiveDate>) {
    match *end {
        EndCondition::Count(count) => ("count", Some(count as i64), None),
        EndCondition::Until(until) => ("until", None, Some(until)),
        EndCondition::Never => ("never", None, None),
    }
}

pub(super) fn encode_weekdays(weekdays: &[Weekday]) -> Option<String> {
    if weekdays.is_empty() {
        return None;
    }
    let names: Vec<String> = weekdays.iter().map(|day| day.to_string()).collect();
    serde_json::to_string(&names).ok()
}

pub(super) fn encode_dates(dates: &[NaiveDate]) -> Option<String> {
    if dates.is_empty() {
        return None;
    }
    let values: Vec<String> = dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect();
    serde_json::to_string(&values).ok()
}

fn decode_weekdays(json: Option<String>) -> std::result::Result<Vec<Weekday>, String> {
    let Some(json) = json else {
        return Ok(Vec::new());
    };

    let names: Vec<String> = serde_json::from_str(&json).map_err(|e| e.to_string())?;
    names
        .iter()
        .map(|name| {
            name.parse::<Weekday>()
                .map_err(|_| format!("Unknown weekday '{}'", name))
        })
        .collect()
}

fn decode_dates(json: Option<String>) -> std::result::Result<Vec<NaiveDate>, String> {
    let Some(json) = json else {
        return Ok(Vec::new());
    };

    let values: Vec<String> = serde_json::from_str(&json).map_err(|e| e.to_string())?;
    values
        .iter()
        .map(|value| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map_err(|_| format!("Malformed skipped date '{}'", value))
        })
        .collect()
}

fn tenant_from_row(row: &Row, index: usize) -> Result<TenantId> {
    TenantId::new(row.get::<_, String>(index)?).map_err(|e| conversion_error(index, e))
}

fn conversion_error(index: usize, message: String) -> Error {
    Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        message.into(),
    )
}
