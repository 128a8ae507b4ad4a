use crate::models::recurrence::RecurringSeries;

use super::monthly::months_from_anchor;
use super::utils::Collector;

/// Every `interval` years on the start's month and day. A Feb 29 anchor
/// falls on Feb 28 in common years.
pub(super) fn generate(series: &RecurringSeries, collector: &mut Collector<'_>) -> usize {
    months_from_anchor(series, 12 * series.interval as i64, collector)
}
