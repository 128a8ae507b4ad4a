use chrono::Duration;

use crate::models::recurrence::RecurringSeries;
use crate::utils::date::week_start;

use super::utils::{Collector, MAX_GENERATION_STEPS};

/// One slot per selected weekday per active week, Monday first. The
/// interval counts weeks; the end count counts individual slots.
pub(super) fn generate(series: &RecurringSeries, collector: &mut Collector<'_>) -> usize {
    let weekdays = series.effective_weekdays();
    let time = series.start.time();
    let step = Duration::weeks(series.interval as i64);

    let mut current_week = week_start(series.start.date());
    let mut steps = 0usize;

    'weeks: while steps < MAX_GENERATION_STEPS {
        steps += 1;

        for weekday in &weekdays {
            let date = current_week + Duration::days(weekday.num_days_from_monday() as i64);
            if !collector.offer(date.and_time(time)) {
                break 'weeks;
            }
        }

        match current_week.checked_add_signed(step) {
            Some(next) => current_week = next,
            None => break,
        }
    }

    steps
}
