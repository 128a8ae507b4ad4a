use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::models::recurrence::{Frequency, RecurringSeries};

use super::utils::Collector;
use super::{daily, monthly, weekly, yearly};

/// Slot start times of `series` up to and including `horizon_end`, in
/// chronological order. Skipped slots are left out but still count toward
/// an occurrence limit.
pub fn generate_dates(series: &RecurringSeries, horizon_end: NaiveDate) -> Vec<NaiveDateTime> {
    let mut collector = Collector::new(series, horizon_end);
    let steps = run(series, &mut collector);
    collector.finish(steps)
}

/// First slot the rule produces strictly after `after`, if any.
pub fn next_slot_after(series: &RecurringSeries, after: NaiveDate) -> Option<NaiveDateTime> {
    // Wide enough to step over every skipped slot.
    let span = longest_gap_days(series).saturating_mul(series.skipped_dates.len() as i64 + 1);
    let horizon = Duration::try_days(span)
        .and_then(|window| after.checked_add_signed(window))
        .unwrap_or(NaiveDate::MAX);

    let mut collector = Collector::new(series, horizon).after(after, 1);
    let steps = run(series, &mut collector);
    collector.finish(steps).into_iter().next()
}

fn run(series: &RecurringSeries, collector: &mut Collector<'_>) -> usize {
    match series.frequency {
        Frequency::Daily => daily::generate(series, collector),
        Frequency::Weekly => weekly::generate(series, collector),
        Frequency::Monthly => monthly::generate(series, collector),
        Frequency::Yearly => yearly::generate(series, collector),
    }
}

fn longest_gap_days(series: &RecurringSeries) -> i64 {
    let interval = series.interval.max(1) as i64;
    match series.frequency {
        Frequency::Daily => interval,
        Frequency::Weekly => 7 * interval,
        Frequency::Monthly => 31 * interval,
        Frequency::Yearly => 366 * interval,
    }
}
