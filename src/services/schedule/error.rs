use thiserror::Error;

/// Why an optimistic schedule change did not stick. Every variant means
/// the cache was rolled back to its previous state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid appointment: {0}")]
    Validation(String),

    #[error("Failed to save appointment: {0}")]
    WriteFailed(String),

    #[error("Saving the appointment timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error("Failed to load the schedule: {0}")]
    LoadFailed(String),
}

impl ScheduleError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScheduleError::WriteFailed(_) | ScheduleError::Timeout { .. } | ScheduleError::LoadFailed(_)
        )
    }
}
