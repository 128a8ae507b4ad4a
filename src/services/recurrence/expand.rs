use chrono::{Duration, NaiveDate};
use std::collections::HashSet;

use crate::models::recurrence::{RecurringOccurrence, RecurringSeries};

use super::dates::{generate_dates, next_slot_after};
use super::error::RecurrenceExpansionError;

/// Occurrences of `series` up to `horizon_end` that are not materialized yet.
///
/// Slots that already have an occurrence (in any state, edited or not) are
/// left alone, so running this twice never yields a duplicate and never
/// regenerates an exception. An empty result means there is nothing to do.
pub fn expand_occurrences(
    series: &RecurringSeries,
    existing: &[RecurringOccurrence],
    horizon_end: NaiveDate,
) -> Result<Vec<RecurringOccurrence>, RecurrenceExpansionError> {
    series
        .validate()
        .map_err(RecurrenceExpansionError::InvalidSeries)?;

    if series.is_cancelled() {
        log::debug!("Series {} is cancelled; nothing to expand", series.id);
        return Ok(Vec::new());
    }

    let taken: HashSet<NaiveDate> = existing
        .iter()
        .filter(|occurrence| occurrence.series_id == series.id)
        .map(|occurrence| occurrence.occurrence_date)
        .collect();

    let generated: Vec<RecurringOccurrence> = generate_dates(series, horizon_end)
        .into_iter()
        .filter(|start| !taken.contains(&start.date()))
        .map(|start| RecurringOccurrence::pending(series, start))
        .collect();

    log::debug!(
        "Series {}: {} new occurrences up to {} ({} already present)",
        series.id,
        generated.len(),
        horizon_end,
        taken.len()
    );

    Ok(generated)
}

/// Whether the materialized part of an open series is about to run out.
///
/// True when the series still has slots after its last materialized
/// occurrence and that occurrence is at most `within_days` away from
/// `today`.
pub fn needs_extension(
    series: &RecurringSeries,
    occurrences: &[RecurringOccurrence],
    today: NaiveDate,
    within_days: u32,
) -> bool {
    if series.is_cancelled() {
        return false;
    }

    let last = occurrences
        .iter()
        .filter(|occurrence| occurrence.series_id == series.id)
        .map(|occurrence| occurrence.occurrence_date)
        .max();

    let Some(last) = last else {
        return next_slot_after(series, today.pred_opt().unwrap_or(today)).is_some();
    };

    if last > today + Duration::days(within_days as i64) {
        return false;
    }

    next_slot_after(series, last).is_some()
}

/// Horizon for the next lazy extension run.
pub fn next_horizon(today: NaiveDate, horizon_days: u32) -> NaiveDate {
    today
        .checked_add_signed(Duration::days(horizon_days as i64))
        .unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::recurrence::{EndCondition, Frequency, OccurrenceState, SeriesTemplate};
    use crate::models::tenant::TenantId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn weekly_series(end: EndCondition) -> RecurringSeries {
        RecurringSeries {
            id: "s1".to_string(),
            tenant_id: TenantId::new("clinic-a").unwrap(),
            template: SeriesTemplate {
                patient_id: "p1".to_string(),
                therapist_id: Some("t1".to_string()),
                duration_minutes: 50,
                appointment_type: Some("Fisioterapia".to_string()),
                room: None,
                notes: None,
            },
            start: date(2024, 1, 1).and_hms_opt(9, 0, 0).unwrap(),
            frequency: Frequency::Weekly,
            interval: 1,
            weekdays: Vec::new(),
            end,
            skipped_dates: Vec::new(),
            created_at: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_second_expansion_is_empty() {
        let series = weekly_series(EndCondition::Count(4));
        let first = expand_occurrences(&series, &[], date(2024, 3, 1)).unwrap();
        assert_eq!(first.len(), 4);

        let second = expand_occurrences(&series, &first, date(2024, 3, 1)).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_exception_slot_is_not_regenerated() {
        let series = weekly_series(EndCondition::Count(3));
        let mut existing = expand_occurrences(&series, &[], date(2024, 3, 1)).unwrap();

        // Moved to Tuesday; the slot date stays Jan 8.
        let moved = &mut existing[1];
        moved.start = date(2024, 1, 9).and_hms_opt(14, 0, 0).unwrap();
        moved.state = OccurrenceState::ExceptionEdited;
        moved.exception = true;
        let kept = vec![moved.clone()];

        let regenerated = expand_occurrences(&series, &kept, date(2024, 3, 1)).unwrap();

        let dates: Vec<NaiveDate> = regenerated.iter().map(|o| o.occurrence_date).collect();
        assert_eq!(dates, vec![date(2024, 1, 1), date(2024, 1, 15)]);
    }

    #[test]
    fn test_generated_occurrences_copy_template() {
        let series = weekly_series(EndCondition::Count(1));
        let generated = expand_occurrences(&series, &[], date(2024, 3, 1)).unwrap();

        assert_eq!(generated[0].id, "s1:2024-01-01");
        assert_eq!(generated[0].duration_minutes, 50);
        assert_eq!(generated[0].state, OccurrenceState::Pending);
    }

    #[test]
    fn test_invalid_series_is_fatal() {
        let mut series = weekly_series(EndCondition::Never);
        series.interval = 0;

        let error = expand_occurrences(&series, &[], date(2024, 3, 1)).unwrap_err();
        assert!(matches!(error, RecurrenceExpansionError::InvalidSeries(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_cancelled_series_expands_to_nothing() {
        let mut series = weekly_series(EndCondition::Never);
        series.cancelled_at = Some(date(2024, 1, 2).and_hms_opt(0, 0, 0).unwrap());

        assert!(expand_occurrences(&series, &[], date(2024, 3, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_needs_extension_near_end_of_materialized_range() {
        let series = weekly_series(EndCondition::Never);
        let occurrences = expand_occurrences(&series, &[], date(2024, 1, 31)).unwrap();

        // Last occurrence is Jan 29.
        assert!(!needs_extension(&series, &occurrences, date(2024, 1, 1), 14));
        assert!(needs_extension(&series, &occurrences, date(2024, 1, 20), 14));
    }

    #[test]
    fn test_finished_series_never_needs_extension() {
        let series = weekly_series(EndCondition::Count(2));
        let occurrences = expand_occurrences(&series, &[], date(2024, 12, 31)).unwrap();

        assert!(!needs_extension(&series, &occurrences, date(2024, 1, 8), 14));
    }

    #[test]
    fn test_unexpanded_series_needs_extension() {
        let series = weekly_series(EndCondition::Never);
        assert!(needs_extension(&series, &[], date(2024, 1, 1), 14));
    }

    #[test]
    fn test_next_horizon() {
        assert_eq!(next_horizon(date(2024, 1, 1), 90), date(2024, 3, 31));
    }
}
