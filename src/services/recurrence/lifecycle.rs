use chrono::{NaiveDateTime, NaiveTime};

use crate::models::appointment::{MAX_DURATION_MINUTES, MIN_DURATION_MINUTES};
use crate::models::recurrence::{OccurrenceState, RecurringOccurrence, RecurringSeries};

use super::error::RecurrenceError;

/// Series-wide change applied to the series and its upcoming occurrences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesEdit {
    pub start_time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
}

impl SeriesEdit {
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none() && self.duration_minutes.is_none()
    }
}

/// Move an occurrence to `next`, rejecting moves the lifecycle forbids.
pub fn transition(
    occurrence: &mut RecurringOccurrence,
    next: OccurrenceState,
) -> Result<(), RecurrenceError> {
    if !occurrence.state.can_transition_to(next) {
        return Err(RecurrenceError::InvalidTransition {
            occurrence_id: occurrence.id.clone(),
            from: occurrence.state,
            to: next,
        });
    }

    occurrence.state = next;
    if next == OccurrenceState::ExceptionEdited {
        occurrence.exception = true;
    }
    Ok(())
}

/// Manually override one occurrence. It keeps its slot date and from now on
/// is skipped by expansion and by series-wide edits.
pub fn mark_exception(
    occurrence: &mut RecurringOccurrence,
    new_start: NaiveDateTime,
    new_duration_minutes: u32,
) -> Result<(), RecurrenceError> {
    check_duration(new_duration_minutes)?;
    transition(occurrence, OccurrenceState::ExceptionEdited)?;

    occurrence.start = new_start;
    occurrence.duration_minutes = new_duration_minutes;
    Ok(())
}

/// Apply `edit` to the series and to every occurrence after `now` that is
/// neither an exception nor finished. Returns the ids of the occurrences
/// that changed.
pub fn apply_series_edit(
    series: &mut RecurringSeries,
    edit: SeriesEdit,
    occurrences: &mut [RecurringOccurrence],
    now: NaiveDateTime,
) -> Result<Vec<String>, RecurrenceError> {
    if let Some(minutes) = edit.duration_minutes {
        check_duration(minutes)?;
    }

    if let Some(time) = edit.start_time {
        series.start = series.start.date().and_time(time);
    }
    if let Some(minutes) = edit.duration_minutes {
        series.template.duration_minutes = minutes;
    }

    let mut changed = Vec::new();
    for occurrence in occurrences
        .iter_mut()
        .filter(|o| o.series_id == series.id && follows_series(o, now))
    {
        if let Some(time) = edit.start_time {
            occurrence.start = occurrence.start.date().and_time(time);
        }
        if let Some(minutes) = edit.duration_minutes {
            occurrence.duration_minutes = minutes;
        }
        changed.push(occurrence.id.clone());
    }

    log::info!(
        "Series {} edited; {} upcoming occurrences updated",
        series.id,
        changed.len()
    );
    Ok(changed)
}

/// Stop the series. Upcoming occurrences are cancelled, exceptions
/// included; past and finished ones are left as they are.
pub fn cancel_series(
    series: &mut RecurringSeries,
    occurrences: &mut [RecurringOccurrence],
    now: NaiveDateTime,
) -> Vec<String> {
    series.cancelled_at = Some(now);

    let mut cancelled = Vec::new();
    for occurrence in occurrences.iter_mut().filter(|o| {
        o.series_id == series.id
            && o.start > now
            && o.state.can_transition_to(OccurrenceState::Cancelled)
    }) {
        occurrence.state = OccurrenceState::Cancelled;
        cancelled.push(occurrence.id.clone());
    }

    log::info!(
        "Series {} cancelled; {} upcoming occurrences cancelled",
        series.id,
        cancelled.len()
    );
    cancelled
}

fn follows_series(occurrence: &RecurringOccurrence, now: NaiveDateTime) -> bool {
    occurrence.start > now && !occurrence.is_exception() && !occurrence.state.is_terminal()
}

fn check_duration(minutes: u32) -> Result<(), RecurrenceError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(RecurrenceError::InvalidEdit(format!(
            "duration must be between {} and {} minutes",
            MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::recurrence::{EndCondition, Frequency, SeriesTemplate};
    use crate::models::tenant::TenantId;
    use crate::services::recurrence::expand_occurrences;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (RecurringSeries, Vec<RecurringOccurrence>) {
        let series = RecurringSeries {
            id: "s1".to_string(),
            tenant_id: TenantId::new("clinic-a").unwrap(),
            template: SeriesTemplate {
                patient_id: "p1".to_string(),
                therapist_id: None,
                duration_minutes: 50,
                appointment_type: None,
                room: None,
                notes: None,
            },
            start: date(2024, 1, 1).and_hms_opt(9, 0, 0).unwrap(),
            frequency: Frequency::Weekly,
            interval: 1,
            weekdays: Vec::new(),
            end: EndCondition::Count(4),
            skipped_dates: Vec::new(),
            created_at: None,
            cancelled_at: None,
        };

        let mut occurrences = expand_occurrences(&series, &[], date(2024, 12, 31)).unwrap();
        for occurrence in &mut occurrences {
            transition(occurrence, OccurrenceState::Materialized).unwrap();
        }
        (series, occurrences)
    }

    #[test]
    fn test_terminal_states_reject_changes() {
        let (_, mut occurrences) = setup();
        let occurrence = &mut occurrences[0];

        transition(occurrence, OccurrenceState::Completed).unwrap();
        let error = transition(occurrence, OccurrenceState::Cancelled).unwrap_err();

        assert!(matches!(error, RecurrenceError::InvalidTransition { .. }));
        assert_eq!(occurrence.state, OccurrenceState::Completed);
    }

    #[test]
    fn test_pending_cannot_become_exception() {
        let (series, _) = setup();
        let mut pending = RecurringOccurrence::pending(&series, series.start);

        let result = mark_exception(&mut pending, series.start, 30);
        assert!(result.is_err());
        assert!(!pending.is_exception());
    }

    #[test]
    fn test_exception_can_still_complete() {
        let (_, mut occurrences) = setup();
        let occurrence = &mut occurrences[1];

        mark_exception(occurrence, date(2024, 1, 9).and_hms_opt(15, 0, 0).unwrap(), 30).unwrap();
        transition(occurrence, OccurrenceState::Completed).unwrap();

        assert!(occurrence.is_exception());
        assert_eq!(occurrence.occurrence_date, date(2024, 1, 8));
    }

    #[test]
    fn test_series_edit_skips_past_and_exceptions() {
        let (mut series, mut occurrences) = setup();
        mark_exception(
            &mut occurrences[2],
            date(2024, 1, 15).and_hms_opt(16, 0, 0).unwrap(),
            50,
        )
        .unwrap();

        let now = date(2024, 1, 5).and_hms_opt(0, 0, 0).unwrap();
        let edit = SeriesEdit {
            start_time: NaiveTime::from_hms_opt(10, 30, 0),
            duration_minutes: Some(40),
        };

        let changed = apply_series_edit(&mut series, edit, &mut occurrences, now).unwrap();

        assert_eq!(changed, vec!["s1:2024-01-08".to_string(), "s1:2024-01-22".to_string()]);
        assert_eq!(occurrences[0].start.time(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(occurrences[1].start.time(), NaiveTime::from_hms_opt(10, 30, 0).unwrap());
        assert_eq!(occurrences[1].duration_minutes, 40);
        assert_eq!(occurrences[2].start.time(), NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        assert_eq!(series.template.duration_minutes, 40);
    }

    #[test]
    fn test_series_edit_rejects_bad_duration() {
        let (mut series, mut occurrences) = setup();
        let edit = SeriesEdit {
            start_time: None,
            duration_minutes: Some(0),
        };

        let now = date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap();
        assert!(apply_series_edit(&mut series, edit, &mut occurrences, now).is_err());
        assert_eq!(series.template.duration_minutes, 50);
    }

    #[test]
    fn test_cancel_series_leaves_past_untouched() {
        let (mut series, mut occurrences) = setup();
        transition(&mut occurrences[0], OccurrenceState::Completed).unwrap();

        let now = date(2024, 1, 10).and_hms_opt(12, 0, 0).unwrap();
        let cancelled = cancel_series(&mut series, &mut occurrences, now);

        assert_eq!(cancelled.len(), 2);
        assert_eq!(occurrences[0].state, OccurrenceState::Completed);
        assert_eq!(occurrences[1].state, OccurrenceState::Materialized);
        assert_eq!(occurrences[2].state, OccurrenceState::Cancelled);
        assert_eq!(occurrences[3].state, OccurrenceState::Cancelled);
        assert!(series.is_cancelled());
    }
}
