//! Persistence-boundary shape of an appointment.
//!
//! The web app, both mobile apps and the cloud functions have written
//! appointments with camelCase and snake_case field names over the years.
//! Everything is folded into [`Appointment`] here so nothing downstream
//! branches on field-name variants.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Appointment, AppointmentStatus};
use crate::models::tenant::TenantId;
use crate::utils::date::{minutes_since, parse_date, parse_time};

const DEFAULT_DURATION_MINUTES: u32 = 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "patientId")]
    pub patient_id: Option<String>,
    #[serde(default, alias = "therapistId", alias = "professional_id", alias = "professionalId")]
    pub therapist_id: Option<String>,
    #[serde(default, alias = "appointment_date", alias = "appointmentDate")]
    pub date: Option<String>,
    #[serde(default, alias = "startTime", alias = "time", alias = "appointment_time")]
    pub start_time: Option<String>,
    #[serde(default, alias = "endTime")]
    pub end_time: Option<String>,
    #[serde(default, alias = "duration", alias = "durationMinutes")]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "type", alias = "appointmentType", alias = "session_type")]
    pub appointment_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default, alias = "seriesId", alias = "recurring_series_id")]
    pub series_id: Option<String>,
}

/// A record that could not be turned into an appointment. Surfaced to the
/// caller instead of aborting the render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub record_id: Option<String>,
    pub reason: String,
}

impl fmt::Display for SkippedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record_id {
            Some(ref id) => write!(f, "appointment {} skipped: {}", id, self.reason),
            None => write!(f, "appointment without id skipped: {}", self.reason),
        }
    }
}

impl AppointmentRecord {
    fn skip(&self, reason: impl Into<String>) -> SkippedRecord {
        SkippedRecord {
            record_id: self.id.clone(),
            reason: reason.into(),
        }
    }

    /// Normalize into the canonical in-memory representation.
    pub fn into_appointment(self, tenant_id: &TenantId) -> Result<Appointment, SkippedRecord> {
        let id = non_blank(self.id.as_deref()).ok_or_else(|| self.skip("missing id"))?;
        let patient_id = non_blank(self.patient_id.as_deref())
            .ok_or_else(|| self.skip("missing patient"))?;
        let date = self
            .date
            .as_deref()
            .and_then(parse_date)
            .ok_or_else(|| self.skip("missing or malformed date"))?;
        let start_time = self
            .start_time
            .as_deref()
            .and_then(parse_time)
            .ok_or_else(|| self.skip("missing or malformed start time"))?;

        let duration_minutes = match (self.duration_minutes, self.end_time.as_deref().and_then(parse_time)) {
            (Some(minutes), _) => minutes,
            (None, Some(end)) if end > start_time => minutes_since(start_time, end) as u32,
            _ => DEFAULT_DURATION_MINUTES,
        };

        let status = match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(code) => code.parse::<AppointmentStatus>().map_err(|e| self.skip(e))?,
            None => AppointmentStatus::Scheduled,
        };

        let appointment = Appointment {
            id,
            tenant_id: tenant_id.clone(),
            date,
            start_time,
            duration_minutes,
            patient_id,
            therapist_id: non_blank(self.therapist_id.as_deref()),
            status,
            appointment_type: non_blank(self.appointment_type.as_deref()),
            notes: non_blank(self.notes.as_deref()),
            room: non_blank(self.room.as_deref()),
            series_id: non_blank(self.series_id.as_deref()),
            created_at: None,
            updated_at: None,
        };

        appointment.validate().map_err(|e| self.skip(e))?;
        Ok(appointment)
    }
}

impl From<&Appointment> for AppointmentRecord {
    fn from(appointment: &Appointment) -> Self {
        Self {
            id: Some(appointment.id.clone()),
            patient_id: Some(appointment.patient_id.clone()),
            therapist_id: appointment.therapist_id.clone(),
            date: Some(appointment.date.format("%Y-%m-%d").to_string()),
            start_time: Some(appointment.start_time.format("%H:%M:%S").to_string()),
            end_time: Some(appointment.end().time().format("%H:%M:%S").to_string()),
            duration_minutes: Some(appointment.duration_minutes),
            status: Some(appointment.status.as_str().to_string()),
            appointment_type: appointment.appointment_type.clone(),
            notes: appointment.notes.clone(),
            room: appointment.room.clone(),
            series_id: appointment.series_id.clone(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Split raw records into valid appointments and skip warnings.
pub fn normalize_records(
    records: impl IntoIterator<Item = AppointmentRecord>,
    tenant_id: &TenantId,
) -> (Vec<Appointment>, Vec<SkippedRecord>) {
    let mut appointments = Vec::new();
    let mut skipped = Vec::new();

    for record in records {
        match record.into_appointment(tenant_id) {
            Ok(appointment) => appointments.push(appointment),
            Err(skip) => {
                log::warn!("{}", skip);
                skipped.push(skip);
            }
        }
    }

    (appointments, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use pretty_assertions::assert_eq;

    fn tenant() -> TenantId {
        TenantId::new("clinic-a").unwrap()
    }

    #[test]
    fn test_camel_and_snake_case_records_normalize_identically() {
        let camel: AppointmentRecord = serde_json::from_str(
            r#"{"id":"a1","patientId":"p1","therapistId":"t1","date":"2024-01-08",
                "startTime":"09:00","duration":45,"status":"confirmado","type":"Avaliação"}"#,
        )
        .unwrap();
        let snake: AppointmentRecord = serde_json::from_str(
            r#"{"id":"a1","patient_id":"p1","therapist_id":"t1","date":"2024-01-08T00:00:00Z",
                "start_time":"09:00:00","duration_minutes":45,"status":"confirmed","appointment_type":"Avaliação"}"#,
        )
        .unwrap();

        let a = camel.into_appointment(&tenant()).unwrap();
        let b = snake.into_appointment(&tenant()).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.status, AppointmentStatus::Confirmed);
        assert_eq!(a.date, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert_eq!(a.start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    }

    #[test]
    fn test_duration_derived_from_end_time() {
        let record = AppointmentRecord {
            id: Some("a1".into()),
            patient_id: Some("p1".into()),
            date: Some("2024-01-08".into()),
            start_time: Some("09:15".into()),
            end_time: Some("10:00".into()),
            ..AppointmentRecord::default()
        };

        let appointment = record.into_appointment(&tenant()).unwrap();
        assert_eq!(appointment.duration_minutes, 45);
    }

    #[test]
    fn test_missing_start_time_is_skipped_with_reason() {
        let record = AppointmentRecord {
            id: Some("a1".into()),
            patient_id: Some("p1".into()),
            date: Some("2024-01-08".into()),
            start_time: Some("  ".into()),
            ..AppointmentRecord::default()
        };

        let skipped = record.into_appointment(&tenant()).unwrap_err();
        assert_eq!(skipped.record_id.as_deref(), Some("a1"));
        assert!(skipped.reason.contains("start time"));
    }

    #[test]
    fn test_normalize_records_partitions() {
        let good = AppointmentRecord {
            id: Some("a1".into()),
            patient_id: Some("p1".into()),
            date: Some("2024-01-08".into()),
            start_time: Some("09:00".into()),
            ..AppointmentRecord::default()
        };
        let bad_status = AppointmentRecord {
            id: Some("a2".into()),
            status: Some("lost".into()),
            ..good.clone()
        };
        let no_date = AppointmentRecord {
            id: Some("a3".into()),
            date: None,
            ..good.clone()
        };

        let (appointments, skipped) = normalize_records(vec![good, bad_status, no_date], &tenant());

        assert_eq!(appointments.len(), 1);
        assert_eq!(appointments[0].duration_minutes, 60);
        assert_eq!(skipped.len(), 2);
    }

    #[test]
    fn test_record_from_appointment_round_trips() {
        let appointment = Appointment::new(
            "a1",
            tenant(),
            "p1",
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            30,
        )
        .unwrap();

        let record = AppointmentRecord::from(&appointment);
        assert_eq!(record.end_time.as_deref(), Some("09:30:00"));
        assert_eq!(record.into_appointment(&tenant()).unwrap(), appointment);
    }

    #[test]
    fn test_record_keeps_seconds() {
        let appointment = Appointment::new(
            "a1",
            tenant(),
            "p1",
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 30).unwrap(),
            30,
        )
        .unwrap();

        let record = AppointmentRecord::from(&appointment);
        assert_eq!(record.start_time.as_deref(), Some("09:00:30"));
        assert_eq!(record.into_appointment(&tenant()).unwrap(), appointment);
    }
}
