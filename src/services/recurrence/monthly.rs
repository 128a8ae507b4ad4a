use crate::models::recurrence::RecurringSeries;
use crate::utils::date::add_months_clamped;

use super::utils::{Collector, MAX_GENERATION_STEPS};

/// Every `interval` months on the start's day of month. Shorter months clamp
/// to their last day; the next month goes back to the anchored day.
pub(super) fn generate(series: &RecurringSeries, collector: &mut Collector<'_>) -> usize {
    months_from_anchor(series, series.interval as i64, collector)
}

/// Shared by monthly and yearly rules: slot `k` is the anchor plus
/// `k * months_per_step` months, always computed from the anchor so a clamp
/// never carries over to later slots.
pub(super) fn months_from_anchor(
    series: &RecurringSeries,
    months_per_step: i64,
    collector: &mut Collector<'_>,
) -> usize {
    let anchor = series.start.date();
    let time = series.start.time();
    let mut steps = 0usize;

    while steps < MAX_GENERATION_STEPS {
        let date = add_months_clamped(anchor, steps as i64 * months_per_step);
        steps += 1;

        if steps > 1 && date == anchor {
            // Out of the representable calendar range.
            break;
        }

        if !collector.offer(date.and_time(time)) {
            break;
        }
    }

    steps
}
