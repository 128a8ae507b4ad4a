use thiserror::Error;

/// Failures of the refresh signal. All of them are transient from the
/// caller's point of view: retry, or fall back to polling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("Failed to subscribe to refresh signals for {tenant}: {reason}")]
    SubscribeFailed { tenant: String, reason: String },

    #[error("Failed to publish refresh signal for {tenant}: {reason}")]
    PublishFailed { tenant: String, reason: String },

    #[error("Refresh channel for {0} is closed")]
    Closed(String),
}
