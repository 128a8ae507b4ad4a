// Property-based tests for recurrence expansion
// Random series definitions checked for ordering, bounds and idempotence

use chrono::{Datelike, NaiveDate, Weekday};
use proptest::prelude::*;

use physio_schedule::models::recurrence::{
    EndCondition, Frequency, OccurrenceState, RecurringOccurrence,
};
use physio_schedule::services::recurrence::{expand_occurrences, generate_dates, mark_exception};

#[path = "../fixtures/mod.rs"]
mod fixtures;

use fixtures::{date, monday, time, weekly_series};

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn frequency() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just(Frequency::Daily),
        Just(Frequency::Weekly),
        Just(Frequency::Monthly),
        Just(Frequency::Yearly),
    ]
}

fn weekday_set() -> impl Strategy<Value = Vec<Weekday>> {
    prop::collection::vec(0usize..7, 0..4)
        .prop_map(|indexes| indexes.into_iter().map(|i| WEEKDAYS[i]).collect())
}

fn end_condition() -> impl Strategy<Value = EndCondition> {
    prop_oneof![
        (1u32..40).prop_map(EndCondition::Count),
        (0i64..400).prop_map(|days| EndCondition::Until(monday() + chrono::Duration::days(days))),
        Just(EndCondition::Never),
    ]
}

fn horizon() -> impl Strategy<Value = NaiveDate> {
    (0i64..800).prop_map(|days| monday() + chrono::Duration::days(days))
}

proptest! {
    /// Generated slots are strictly increasing and respect every bound.
    #[test]
    fn prop_dates_ordered_and_bounded(
        frequency in frequency(),
        interval in 1u32..4,
        weekdays in weekday_set(),
        end in end_condition(),
        horizon in horizon(),
    ) {
        let mut series = weekly_series("s1", Vec::new(), end);
        series.frequency = frequency;
        series.interval = interval;
        if frequency == Frequency::Weekly {
            series.weekdays = weekdays;
        }

        let dates = generate_dates(&series, horizon);

        prop_assert!(dates.windows(2).all(|pair| pair[0] < pair[1]));
        prop_assert!(dates.iter().all(|start| start.date() <= horizon));
        prop_assert!(dates.iter().all(|start| *start >= series.start));
        prop_assert!(dates.iter().all(|start| start.time() == time(9, 0)));

        match end {
            EndCondition::Count(count) => prop_assert!(dates.len() <= count as usize),
            EndCondition::Until(until) => prop_assert!(dates.iter().all(|d| d.date() <= until)),
            EndCondition::Never => {}
        }

        if frequency == Frequency::Weekly {
            let allowed = series.effective_weekdays();
            prop_assert!(dates.iter().all(|d| allowed.contains(&d.weekday())));
        }
    }

    /// A second expansion over the same horizon adds nothing, and edited
    /// occurrences are never regenerated.
    #[test]
    fn prop_expansion_is_idempotent(
        weekdays in weekday_set(),
        end in end_condition(),
        horizon in horizon(),
        edit_index in 0usize..10,
    ) {
        let series = weekly_series("s1", weekdays, end);

        let mut first = expand_occurrences(&series, &[], horizon).unwrap();
        if let Some(occurrence) = first.get_mut(edit_index) {
            occurrence.state = OccurrenceState::Materialized;
            let moved = occurrence.start + chrono::Duration::hours(2);
            mark_exception(occurrence, moved, 30).unwrap();
        }

        let second = expand_occurrences(&series, &first, horizon).unwrap();
        prop_assert!(second.is_empty());

        let mut ids: Vec<&str> = first.iter().map(|o| o.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), first.len());
    }
}

#[test]
fn test_monthly_on_the_31st_clamps_every_short_month() {
    let mut series = weekly_series("s1", Vec::new(), EndCondition::Count(12));
    series.frequency = Frequency::Monthly;
    series.start = date(2024, 1, 31).and_time(time(9, 0));

    let days: Vec<u32> = generate_dates(&series, date(2025, 1, 31))
        .iter()
        .map(|start| start.day())
        .collect();

    assert_eq!(days, vec![31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]);
}

#[test]
fn test_occurrence_ids_are_stable_per_date() {
    assert_eq!(
        RecurringOccurrence::occurrence_id("s1", date(2024, 1, 8)),
        "s1:2024-01-08"
    );
}
