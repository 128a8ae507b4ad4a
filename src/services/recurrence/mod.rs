// Recurrence service module
// Series expansion, occurrence lifecycle and their persistence

mod daily;
mod dates;
mod error;
mod expand;
mod expander;
mod lifecycle;
mod mapper;
mod monthly;
mod persistence;
mod utils;
mod weekly;
mod yearly;

pub use dates::{generate_dates, next_slot_after};
pub use error::{RecurrenceError, RecurrenceExpansionError};
pub use expand::{expand_occurrences, needs_extension, next_horizon};
pub use expander::{CancelToken, ExpansionReport, OccurrenceStore, RecurrenceExpander};
pub use lifecycle::{apply_series_edit, cancel_series, mark_exception, transition, SeriesEdit};
pub use persistence::{OccurrenceService, SeriesService};
