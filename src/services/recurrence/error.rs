use thiserror::Error;

use crate::models::recurrence::OccurrenceState;

/// Failures of a series definition or an occurrence lifecycle change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceError {
    #[error("Invalid recurring series: {0}")]
    InvalidSeries(String),

    #[error("Occurrence {occurrence_id} cannot move from {from} to {to}")]
    InvalidTransition {
        occurrence_id: String,
        from: OccurrenceState,
        to: OccurrenceState,
    },

    #[error("Invalid occurrence edit: {0}")]
    InvalidEdit(String),
}

/// Failures of an expansion run. An empty expansion is not an error.
#[derive(Error, Debug)]
pub enum RecurrenceExpansionError {
    /// The series definition cannot generate occurrences. Not retryable.
    #[error("Invalid recurring series: {0}")]
    InvalidSeries(String),

    /// The batched occurrence write failed. Retry the whole batch.
    #[error("Occurrence batch write failed: {0}")]
    WriteFailed(String),

    #[error("Occurrence batch write timed out after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// The caller went away before the result could be applied.
    #[error("Expansion of series {series_id} was cancelled")]
    Cancelled { series_id: String },
}

impl RecurrenceExpansionError {
    /// Whether backing off and retrying the same expansion can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecurrenceExpansionError::WriteFailed(_) | RecurrenceExpansionError::Timeout { .. }
        )
    }
}

impl From<RecurrenceError> for RecurrenceExpansionError {
    fn from(error: RecurrenceError) -> Self {
        match error {
            RecurrenceError::InvalidSeries(reason) => RecurrenceExpansionError::InvalidSeries(reason),
            other => RecurrenceExpansionError::InvalidSeries(other.to_string()),
        }
    }
}
