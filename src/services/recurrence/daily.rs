use chrono::Duration;

use crate::models::recurrence::RecurringSeries;

use super::utils::{Collector, MAX_GENERATION_STEPS};

pub(super) fn generate(series: &RecurringSeries, collector: &mut Collector<'_>) -> usize {
    let step = Duration::days(series.interval as i64);
    let mut current = series.start;
    let mut steps = 0usize;

    while steps < MAX_GENERATION_STEPS {
        steps += 1;
        if !collector.offer(current) {
            break;
        }

        match current.checked_add_signed(step) {
            Some(next) => current = next,
            None => break,
        }
    }

    steps
}
