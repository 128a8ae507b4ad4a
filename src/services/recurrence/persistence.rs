use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::recurrence::{RecurringOccurrence, RecurringSeries};
use crate::models::tenant::TenantId;
use crate::services::database::Database;

use super::error::RecurrenceError;
use super::expander::OccurrenceStore;
use super::mapper::{
    encode_dates, encode_weekdays, end_columns, row_to_occurrence, row_to_series,
    OCCURRENCE_COLUMNS, SERIES_COLUMNS,
};

/// Stored series definitions.
pub struct SeriesService<'a> {
    conn: &'a Connection,
}

impl<'a> SeriesService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Store a new series. Definitions that cannot generate occurrences are
    /// rejected here, before anything is expanded.
    pub fn create(&self, mut series: RecurringSeries) -> Result<RecurringSeries> {
        series
            .validate()
            .map_err(RecurrenceError::InvalidSeries)?;

        let created_at = Local::now();
        let (end_type, end_count, end_until) = end_columns(&series.end);

        self.conn
            .execute(
                &format!(
                    "INSERT INTO recurring_series ({}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                    SERIES_COLUMNS
                ),
                params![
                    series.id,
                    series.tenant_id.as_str(),
                    series.template.patient_id,
                    series.template.therapist_id,
                    series.template.duration_minutes as i64,
                    series.template.appointment_type,
                    series.template.room,
                    series.template.notes,
                    series.start,
                    series.frequency.as_str(),
                    series.interval as i64,
                    encode_weekdays(&series.weekdays),
                    end_type,
                    end_count,
                    end_until,
                    encode_dates(&series.skipped_dates),
                    created_at.to_rfc3339(),
                    series.cancelled_at,
                ],
            )
            .with_context(|| format!("Failed to insert recurring series {}", series.id))?;

        series.created_at = Some(created_at);
        Ok(series)
    }

    pub fn get(&self, tenant_id: &TenantId, id: &str) -> Result<Option<RecurringSeries>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM recurring_series WHERE tenant_id = ?1 AND id = ?2",
                    SERIES_COLUMNS
                ),
                params![tenant_id.as_str(), id],
                row_to_series,
            )
            .optional()
            .with_context(|| format!("Failed to load recurring series {}", id))
    }

    pub fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<RecurringSeries>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM recurring_series WHERE tenant_id = ?1 ORDER BY start_datetime, id",
                SERIES_COLUMNS
            ))
            .context("Failed to prepare series query")?;

        let series = stmt
            .query_map([tenant_id.as_str()], row_to_series)
            .context("Failed to query recurring series")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to map recurring series")?;

        Ok(series)
    }

    /// Persist a series edit (start time, duration, skip list).
    pub fn update(&self, series: &RecurringSeries) -> Result<()> {
        series
            .validate()
            .map_err(RecurrenceError::InvalidSeries)?;

        let (end_type, end_count, end_until) = end_columns(&series.end);
        let affected = self
            .conn
            .execute(
                "UPDATE recurring_series
                 SET patient_id = ?3, therapist_id = ?4, duration_minutes = ?5,
                     appointment_type = ?6, room = ?7, notes = ?8, start_datetime = ?9,
                     frequency = ?10, interval = ?11, weekdays = ?12, end_type = ?13,
                     end_count = ?14, end_until = ?15, skipped_dates = ?16, cancelled_at = ?17
                 WHERE tenant_id = ?1 AND id = ?2",
                params![
                    series.tenant_id.as_str(),
                    series.id,
                    series.template.patient_id,
                    series.template.therapist_id,
                    series.template.duration_minutes as i64,
                    series.template.appointment_type,
                    series.template.room,
                    series.template.notes,
                    series.start,
                    series.frequency.as_str(),
                    series.interval as i64,
                    encode_weekdays(&series.weekdays),
                    end_type,
                    end_count,
                    end_until,
                    encode_dates(&series.skipped_dates),
                    series.cancelled_at,
                ],
            )
            .with_context(|| format!("Failed to update recurring series {}", series.id))?;

        if affected == 0 {
            return Err(anyhow!("Recurring series {} not found", series.id));
        }
        Ok(())
    }

    pub fn mark_cancelled(&self, tenant_id: &TenantId, id: &str, at: NaiveDateTime) -> Result<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE recurring_series SET cancelled_at = ?3 WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id.as_str(), id, at],
            )
            .with_context(|| format!("Failed to cancel recurring series {}", id))?;

        if affected == 0 {
            return Err(anyhow!("Recurring series {} not found", id));
        }
        Ok(())
    }
}

/// Materialized occurrences.
pub struct OccurrenceService<'a> {
    conn: &'a Connection,
}

impl<'a> OccurrenceService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn list_for_series(
        &self,
        tenant_id: &TenantId,
        series_id: &str,
    ) -> Result<Vec<RecurringOccurrence>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM recurring_occurrences
                 WHERE tenant_id = ?1 AND series_id = ?2
                 ORDER BY occurrence_date",
                OCCURRENCE_COLUMNS
            ))
            .context("Failed to prepare occurrence query")?;

        let occurrences = stmt
            .query_map(params![tenant_id.as_str(), series_id], row_to_occurrence)
            .context("Failed to query occurrences")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to map occurrences")?;

        Ok(occurrences)
    }

    /// Occurrences of any series whose start falls on `from..=to`.
    pub fn list_in_range(
        &self,
        tenant_id: &TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RecurringOccurrence>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM recurring_occurrences
                 WHERE tenant_id = ?1 AND date(start_datetime) BETWEEN ?2 AND ?3
                 ORDER BY start_datetime, id",
                OCCURRENCE_COLUMNS
            ))
            .context("Failed to prepare occurrence range query")?;

        let occurrences = stmt
            .query_map(params![tenant_id.as_str(), from, to], row_to_occurrence)
            .context("Failed to query occurrences in range")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to map occurrences")?;

        Ok(occurrences)
    }

    /// Upsert all occurrences in a single transaction.
    pub fn batch_save_occurrences(&self, occurrences: &[RecurringOccurrence]) -> Result<()> {
        if occurrences.is_empty() {
            return Ok(());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to start occurrence batch")?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO recurring_occurrences (
                        id, tenant_id, series_id, occurrence_date, start_datetime,
                        duration_minutes, state, is_exception, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT (tenant_id, id) DO UPDATE SET
                        start_datetime = excluded.start_datetime,
                        duration_minutes = excluded.duration_minutes,
                        state = excluded.state,
                        is_exception = excluded.is_exception,
                        updated_at = excluded.updated_at",
                )
                .context("Failed to prepare occurrence upsert")?;

            let now = Local::now().to_rfc3339();
            for occurrence in occurrences {
                stmt.execute(params![
                    occurrence.id,
                    occurrence.tenant_id.as_str(),
                    occurrence.series_id,
                    occurrence.occurrence_date,
                    occurrence.start,
                    occurrence.duration_minutes as i64,
                    occurrence.state.as_str(),
                    occurrence.exception as i32,
                    &now,
                ])
                .with_context(|| format!("Failed to save occurrence {}", occurrence.id))?;
            }
        }

        tx.commit().context("Failed to commit occurrence batch")?;
        log::debug!("Saved {} occurrences in one batch", occurrences.len());
        Ok(())
    }

    pub fn update(&self, occurrence: &RecurringOccurrence) -> Result<()> {
        self.batch_save_occurrences(std::slice::from_ref(occurrence))
    }
}

impl OccurrenceStore for Database {
    fn list_for_series(
        &self,
        tenant_id: &TenantId,
        series_id: &str,
    ) -> Result<Vec<RecurringOccurrence>> {
        OccurrenceService::new(self.connection()).list_for_series(tenant_id, series_id)
    }

    fn batch_save_occurrences(&mut self, occurrences: &[RecurringOccurrence]) -> Result<()> {
        OccurrenceService::new(self.connection()).batch_save_occurrences(occurrences)
    }
}
