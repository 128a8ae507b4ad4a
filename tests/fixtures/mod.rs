// Test fixtures - reusable test data
// Shared by the integration and property tests

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use physio_schedule::models::appointment::Appointment;
use physio_schedule::models::recurrence::{
    EndCondition, Frequency, RecurringSeries, SeriesTemplate,
};
use physio_schedule::models::tenant::TenantId;
use physio_schedule::services::database::Database;

pub fn tenant() -> TenantId {
    TenantId::new("clinic-a").unwrap()
}

pub fn other_tenant() -> TenantId {
    TenantId::new("clinic-b").unwrap()
}

/// Monday, Jan 1 2024.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(day: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    day.and_hms_opt(hour, minute, 0).unwrap()
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

pub fn appointment(id: &str, day: NaiveDate, start: NaiveTime, minutes: u32) -> Appointment {
    Appointment::builder()
        .id(id)
        .tenant(tenant())
        .patient(format!("patient-{}", id))
        .therapist("therapist-1")
        .date(day)
        .start_time(start)
        .duration_minutes(minutes)
        .build()
        .unwrap()
}

/// Appointment starting `offset` minutes after 07:00 on `day`.
pub fn appointment_at_offset(id: &str, day: NaiveDate, offset: u32, minutes: u32) -> Appointment {
    let start = time(7, 0) + chrono::Duration::minutes(offset as i64);
    appointment(id, day, start, minutes)
}

pub fn weekly_series(id: &str, weekdays: Vec<Weekday>, end: EndCondition) -> RecurringSeries {
    RecurringSeries {
        id: id.to_string(),
        tenant_id: tenant(),
        template: SeriesTemplate {
            patient_id: "patient-1".to_string(),
            therapist_id: Some("therapist-1".to_string()),
            duration_minutes: 45,
            appointment_type: Some("physio".to_string()),
            room: None,
            notes: None,
        },
        start: at(monday(), 9, 0),
        frequency: Frequency::Weekly,
        interval: 1,
        weekdays,
        end,
        skipped_dates: Vec::new(),
        created_at: None,
        cancelled_at: None,
    }
}

pub fn memory_db() -> Database {
    let db = Database::new(":memory:").unwrap();
    db.initialize_schema().unwrap();
    db
}
