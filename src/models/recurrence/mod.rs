// Recurrence module
// Recurring series definitions and their materialized occurrences

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::appointment::{
    Appointment, AppointmentStatus, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
};
use crate::models::tenant::TenantId;
use crate::utils::date::{minutes_of_day, MINUTES_PER_DAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "daily" | "diario" => Ok(Frequency::Daily),
            "weekly" | "semanal" => Ok(Frequency::Weekly),
            "monthly" | "mensal" => Ok(Frequency::Monthly),
            "yearly" | "anual" => Ok(Frequency::Yearly),
            other => Err(format!("Unknown recurrence frequency '{}'", other)),
        }
    }
}

/// When a series stops generating occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EndCondition {
    /// Fixed number of occurrences.
    Count(u32),
    /// Last date (inclusive) an occurrence may fall on.
    Until(NaiveDate),
    /// Open-ended; bounded only by the materialization horizon.
    Never,
}

/// Fields copied onto every occurrence of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesTemplate {
    pub patient_id: String,
    pub therapist_id: Option<String>,
    pub duration_minutes: u32,
    pub appointment_type: Option<String>,
    pub room: Option<String>,
    pub notes: Option<String>,
}

/// A rule that generates many appointment occurrences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringSeries {
    pub id: String,
    pub tenant_id: TenantId,
    pub template: SeriesTemplate,
    pub start: NaiveDateTime,
    pub frequency: Frequency,
    pub interval: u32,
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    pub end: EndCondition,
    /// Slots removed from the series; they never materialize.
    #[serde(default)]
    pub skipped_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub created_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub cancelled_at: Option<NaiveDateTime>,
}

impl RecurringSeries {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Series id cannot be empty".to_string());
        }

        if self.template.patient_id.trim().is_empty() {
            return Err("Series patient cannot be empty".to_string());
        }

        if self.interval < 1 {
            return Err("Recurrence interval must be at least 1".to_string());
        }

        if self.template.duration_minutes < MIN_DURATION_MINUTES
            || self.template.duration_minutes > MAX_DURATION_MINUTES
        {
            return Err(format!(
                "Series duration must be between {} and {} minutes",
                MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
            ));
        }

        let end_minute = minutes_of_day(self.start.time()) + self.template.duration_minutes as i64;
        if end_minute > MINUTES_PER_DAY {
            return Err("Series sessions must end on the day they start".to_string());
        }

        match self.end {
            EndCondition::Count(0) => {
                return Err("Occurrence count must be at least 1".to_string());
            }
            EndCondition::Until(until) if until < self.start.date() => {
                return Err("Series end date cannot be before its start date".to_string());
            }
            _ => {}
        }

        if !self.weekdays.is_empty() && self.frequency != Frequency::Weekly {
            return Err("Weekdays can only be set on weekly series".to_string());
        }

        Ok(())
    }

    /// Weekdays for a weekly series, Monday first, without duplicates.
    /// Falls back to the weekday of the series start.
    pub fn effective_weekdays(&self) -> Vec<Weekday> {
        use chrono::Datelike;

        let mut days = if self.weekdays.is_empty() {
            vec![self.start.weekday()]
        } else {
            self.weekdays.clone()
        };
        days.sort_by_key(|day| day.num_days_from_monday());
        days.dedup();
        days
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    pub fn is_skipped(&self, date: NaiveDate) -> bool {
        self.skipped_dates.contains(&date)
    }
}

/// Lifecycle of one materialized occurrence.
///
/// `Pending -> Materialized -> {Completed | Cancelled | ExceptionEdited}`;
/// an exception-edited occurrence can still be completed or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceState {
    Pending,
    Materialized,
    ExceptionEdited,
    Completed,
    Cancelled,
}

impl OccurrenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccurrenceState::Pending => "pending",
            OccurrenceState::Materialized => "materialized",
            OccurrenceState::ExceptionEdited => "exception_edited",
            OccurrenceState::Completed => "completed",
            OccurrenceState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OccurrenceState::Completed | OccurrenceState::Cancelled)
    }

    pub fn can_transition_to(&self, next: OccurrenceState) -> bool {
        use OccurrenceState::*;

        matches!(
            (self, next),
            (Pending, Materialized)
                | (Materialized, Completed)
                | (Materialized, Cancelled)
                | (Materialized, ExceptionEdited)
                | (ExceptionEdited, ExceptionEdited)
                | (ExceptionEdited, Completed)
                | (ExceptionEdited, Cancelled)
        )
    }
}

impl fmt::Display for OccurrenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OccurrenceState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(OccurrenceState::Pending),
            "materialized" => Ok(OccurrenceState::Materialized),
            "exception_edited" => Ok(OccurrenceState::ExceptionEdited),
            "completed" => Ok(OccurrenceState::Completed),
            "cancelled" => Ok(OccurrenceState::Cancelled),
            other => Err(format!("Unknown occurrence state '{}'", other)),
        }
    }
}

/// One concrete dated instance of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringOccurrence {
    pub id: String,
    pub series_id: String,
    pub tenant_id: TenantId,
    /// Slot date produced by the rule. Identity of the occurrence within its
    /// series; it does not move when the occurrence is rescheduled.
    pub occurrence_date: NaiveDate,
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    pub state: OccurrenceState,
    /// Set once the occurrence was manually overridden; survives completion
    /// and cancellation so later series edits keep skipping it.
    pub exception: bool,
}

impl RecurringOccurrence {
    pub fn occurrence_id(series_id: &str, date: NaiveDate) -> String {
        format!("{}:{}", series_id, date.format("%Y-%m-%d"))
    }

    /// A freshly generated occurrence that has not been written yet.
    pub fn pending(series: &RecurringSeries, start: NaiveDateTime) -> Self {
        let occurrence_date = start.date();
        Self {
            id: Self::occurrence_id(&series.id, occurrence_date),
            series_id: series.id.clone(),
            tenant_id: series.tenant_id.clone(),
            occurrence_date,
            start,
            duration_minutes: series.template.duration_minutes,
            state: OccurrenceState::Pending,
            exception: false,
        }
    }

    pub fn is_exception(&self) -> bool {
        self.exception || self.state == OccurrenceState::ExceptionEdited
    }

    pub fn end(&self) -> NaiveDateTime {
        self.start + chrono::Duration::minutes(self.duration_minutes as i64)
    }

    /// Appointment status shown on the grid for this occurrence.
    pub fn status(&self) -> AppointmentStatus {
        match self.state {
            OccurrenceState::Completed => AppointmentStatus::Completed,
            OccurrenceState::Cancelled => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Scheduled,
        }
    }

    /// Build the appointment this occurrence stands for.
    pub fn to_appointment(&self, series: &RecurringSeries) -> Appointment {
        Appointment {
            id: self.id.clone(),
            tenant_id: self.tenant_id.clone(),
            date: self.start.date(),
            start_time: self.start.time(),
            duration_minutes: self.duration_minutes,
            patient_id: series.template.patient_id.clone(),
            therapist_id: series.template.therapist_id.clone(),
            status: self.status(),
            appointment_type: series.template.appointment_type.clone(),
            notes: series.template.notes.clone(),
            room: series.template.room.clone(),
            series_id: Some(series.id.clone()),
            created_at: None,
            updated_at: None,
        }
    }
}
