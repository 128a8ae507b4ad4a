use chrono::{NaiveDate, NaiveDateTime};

use crate::models::recurrence::{EndCondition, RecurringSeries};

/// Upper bound on rule steps per generation run.
pub(super) const MAX_GENERATION_STEPS: usize = 5_000;

/// Accepts candidate slots in order and applies the end condition, the
/// horizon and the skip list.
///
/// Skipped dates still consume the count, so skipping a slot of a
/// ten-session series leaves nine sessions rather than moving the tenth.
pub(super) struct Collector<'a> {
    series: &'a RecurringSeries,
    horizon_end: NaiveDate,
    emit_after: Option<NaiveDate>,
    max_emitted: Option<usize>,
    consumed: u32,
    dates: Vec<NaiveDateTime>,
}

impl<'a> Collector<'a> {
    pub(super) fn new(series: &'a RecurringSeries, horizon_end: NaiveDate) -> Self {
        Self {
            series,
            horizon_end,
            emit_after: None,
            max_emitted: None,
            consumed: 0,
            dates: Vec::new(),
        }
    }

    /// Only emit slots strictly after `date`, and stop after `limit` of them.
    pub(super) fn after(mut self, date: NaiveDate, limit: usize) -> Self {
        self.emit_after = Some(date);
        self.max_emitted = Some(limit);
        self
    }

    /// Offer the next slot produced by the rule. Returns `false` once
    /// generation must stop.
    pub(super) fn offer(&mut self, candidate: NaiveDateTime) -> bool {
        // Weekly rules can produce slots earlier in the first week.
        if candidate < self.series.start {
            return true;
        }

        if self.is_exhausted() {
            return false;
        }

        let date = candidate.date();
        if let EndCondition::Until(until) = self.series.end {
            if date > until {
                return false;
            }
        }

        if date > self.horizon_end {
            return false;
        }

        self.consumed += 1;

        let wanted = self.emit_after.map_or(true, |after| date > after);
        if wanted && !self.series.is_skipped(date) {
            self.dates.push(candidate);
        }

        !self.is_exhausted()
    }

    fn is_exhausted(&self) -> bool {
        if let EndCondition::Count(count) = self.series.end {
            if self.consumed >= count {
                return true;
            }
        }

        self.max_emitted
            .map_or(false, |limit| self.dates.len() >= limit)
    }

    pub(super) fn finish(self, steps: usize) -> Vec<NaiveDateTime> {
        if steps >= MAX_GENERATION_STEPS {
            log::warn!(
                "Series {} hit the generation cap after {} steps",
                self.series.id,
                steps
            );
        }
        self.dates
    }
}
