// Appointment module
// One scheduled clinical encounter on a single calendar day

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::tenant::TenantId;
use crate::utils::date::{minutes_of_day, MINUTES_PER_DAY};

mod record;

pub use record::{normalize_records, AppointmentRecord, SkippedRecord};

/// Shortest and longest bookable session, in minutes.
pub const MIN_DURATION_MINUTES: u32 = 5;
pub const MAX_DURATION_MINUTES: u32 = 480;

/// Appointment status as tracked by the clinic front desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Confirmed,
    AwaitingConfirmation,
    InProgress,
    Waiting,
    Late,
    Completed,
    Rescheduled,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 10] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::AwaitingConfirmation,
        AppointmentStatus::InProgress,
        AppointmentStatus::Waiting,
        AppointmentStatus::Late,
        AppointmentStatus::Completed,
        AppointmentStatus::Rescheduled,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    /// Canonical storage code.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::AwaitingConfirmation => "awaiting_confirmation",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Waiting => "waiting",
            AppointmentStatus::Late => "late",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Rescheduled => "rescheduled",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    /// No further transitions are expected once an appointment reaches one
    /// of these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// Whether the appointment still takes up room on the grid. A
    /// rescheduled appointment is drawn at its new time.
    pub fn occupies_slot(&self) -> bool {
        *self != AppointmentStatus::Cancelled
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    /// Accepts the canonical codes plus the Portuguese codes the web and
    /// mobile apps still write.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace(['-', ' '], "_");
        let status = match normalized.as_str() {
            "scheduled" | "agendado" => AppointmentStatus::Scheduled,
            "confirmed" | "confirmado" => AppointmentStatus::Confirmed,
            "awaiting_confirmation" | "aguardando_confirmacao" => {
                AppointmentStatus::AwaitingConfirmation
            }
            "in_progress" | "em_andamento" | "em_atendimento" => AppointmentStatus::InProgress,
            "waiting" | "aguardando" => AppointmentStatus::Waiting,
            "late" | "atrasado" => AppointmentStatus::Late,
            "completed" | "concluido" | "realizado" => AppointmentStatus::Completed,
            "rescheduled" | "remarcado" | "reagendado" => AppointmentStatus::Rescheduled,
            "cancelled" | "canceled" | "cancelado" => AppointmentStatus::Cancelled,
            "no_show" | "noshow" | "falta" | "faltou" => AppointmentStatus::NoShow,
            _ => return Err(format!("Unknown appointment status '{}'", value)),
        };
        Ok(status)
    }
}

/// A scheduled clinical encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub tenant_id: TenantId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub patient_id: String,
    pub therapist_id: Option<String>,
    pub status: AppointmentStatus,
    pub appointment_type: Option<String>,
    pub notes: Option<String>,
    pub room: Option<String>,
    pub series_id: Option<String>,
    pub created_at: Option<DateTime<Local>>,
    pub updated_at: Option<DateTime<Local>>,
}

impl Appointment {
    /// Create a new appointment with required fields
    ///
    /// # Examples
    /// ```
    /// use physio_schedule::models::appointment::Appointment;
    /// use physio_schedule::models::tenant::TenantId;
    /// use chrono::{NaiveDate, NaiveTime};
    ///
    /// let tenant = TenantId::new("clinic-a").unwrap();
    /// let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
    /// let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    /// let appointment = Appointment::new("apt-1", tenant, "patient-1", date, time, 45).unwrap();
    /// assert_eq!(appointment.end().time(), NaiveTime::from_hms_opt(9, 45, 0).unwrap());
    /// ```
    pub fn new(
        id: impl Into<String>,
        tenant_id: TenantId,
        patient_id: impl Into<String>,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: u32,
    ) -> Result<Self, String> {
        let appointment = Self {
            id: id.into(),
            tenant_id,
            date,
            start_time,
            duration_minutes,
            patient_id: patient_id.into(),
            therapist_id: None,
            status: AppointmentStatus::Scheduled,
            appointment_type: None,
            notes: None,
            room: None,
            series_id: None,
            created_at: None,
            updated_at: None,
        };

        appointment.validate()?;
        Ok(appointment)
    }

    /// Create a builder for constructing appointments with optional fields
    pub fn builder() -> AppointmentBuilder {
        AppointmentBuilder::new()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Appointment id cannot be empty".to_string());
        }

        if self.patient_id.trim().is_empty() {
            return Err("Appointment patient cannot be empty".to_string());
        }

        if self.duration_minutes < MIN_DURATION_MINUTES
            || self.duration_minutes > MAX_DURATION_MINUTES
        {
            return Err(format!(
                "Appointment duration must be between {} and {} minutes",
                MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
            ));
        }

        if minutes_of_day(self.start_time) + self.duration_minutes as i64 > MINUTES_PER_DAY {
            return Err("Appointment must end on the day it starts".to_string());
        }

        if self.end() <= self.start() {
            return Err("Appointment end time must be after start time".to_string());
        }

        Ok(())
    }

    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn end(&self) -> NaiveDateTime {
        self.start() + self.duration()
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes as i64)
    }

    /// Strict overlap: back-to-back appointments do not overlap.
    pub fn overlaps(&self, other: &Appointment) -> bool {
        self.start() < other.end() && other.start() < self.end()
    }

    pub fn is_recurring(&self) -> bool {
        self.series_id.is_some()
    }

    /// Appointments are never deleted; cancelling keeps the record for audit.
    pub fn cancel(&mut self) {
        self.status = AppointmentStatus::Cancelled;
    }

    pub fn reschedule(
        &mut self,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: u32,
    ) -> Result<(), String> {
        let mut moved = self.clone();
        moved.date = date;
        moved.start_time = start_time;
        moved.duration_minutes = duration_minutes;
        moved.status = AppointmentStatus::Rescheduled;
        moved.validate()?;

        *self = moved;
        Ok(())
    }
}

/// Builder for creating appointments with optional fields
#[derive(Default)]
pub struct AppointmentBuilder {
    id: Option<String>,
    tenant_id: Option<TenantId>,
    date: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
    duration_minutes: Option<u32>,
    patient_id: Option<String>,
    therapist_id: Option<String>,
    status: AppointmentStatus,
    appointment_type: Option<String>,
    notes: Option<String>,
    room: Option<String>,
    series_id: Option<String>,
}

impl AppointmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn start_time(mut self, start_time: NaiveTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn duration_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn therapist(mut self, therapist_id: impl Into<String>) -> Self {
        self.therapist_id = Some(therapist_id.into());
        self
    }

    pub fn status(mut self, status: AppointmentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn appointment_type(mut self, appointment_type: impl Into<String>) -> Self {
        self.appointment_type = Some(appointment_type.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn series(mut self, series_id: impl Into<String>) -> Self {
        self.series_id = Some(series_id.into());
        self
    }

    pub fn build(self) -> Result<Appointment, String> {
        let id = self.id.ok_or("Appointment id is required")?;
        let tenant_id = self.tenant_id.ok_or("Appointment tenant is required")?;
        let date = self.date.ok_or("Appointment date is required")?;
        let start_time = self.start_time.ok_or("Appointment start time is required")?;
        let patient_id = self.patient_id.ok_or("Appointment patient is required")?;

        let appointment = Appointment {
            id,
            tenant_id,
            date,
            start_time,
            duration_minutes: self.duration_minutes.unwrap_or(60),
            patient_id,
            therapist_id: self.therapist_id,
            status: self.status,
            appointment_type: self.appointment_type,
            notes: self.notes,
            room: self.room,
            series_id: self.series_id,
            created_at: None,
            updated_at: None,
        };

        appointment.validate()?;
        Ok(appointment)
    }
}
