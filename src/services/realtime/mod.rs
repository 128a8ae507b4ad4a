// Realtime service module
// Per-tenant "schedule changed" signal: publish, subscribe, coalesce

mod coordinator;
mod error;
mod hub;
mod sqlite;
mod subscription;

pub use coordinator::{RefreshCoordinator, RefreshEvent, RefreshMode, RefreshSource};
pub use error::RealtimeError;
pub use hub::LocalRefreshHub;
pub use sqlite::SqliteRefreshChannel;
pub use subscription::{subscribe_to_refresh, RefreshSubscription};

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;

use crate::models::tenant::TenantId;

/// Receiver of a tenant's last signal timestamp (`None` until the first
/// publish).
pub type RefreshReceiver = watch::Receiver<Option<DateTime<Utc>>>;

/// A "watch a value, get told when it changes" transport. Delivery is
/// eventual and at-least-once; only the latest value matters.
pub trait RefreshChannel: Send + Sync + 'static {
    fn publish(&self, tenant_id: &TenantId, at: DateTime<Utc>) -> Result<(), RealtimeError>;

    fn watch(&self, tenant_id: &TenantId) -> Result<RefreshReceiver, RealtimeError>;

    fn latest(&self, tenant_id: &TenantId) -> Result<Option<DateTime<Utc>>, RealtimeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Window that folds a burst of signals into one refresh.
    pub debounce: Duration,
    /// Signals younger than this are announced to the user.
    pub recency_window: Duration,
    /// Refresh interval while the subscription is down.
    pub poll_interval: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            recency_window: Duration::from_secs(5),
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// Tell every client of `tenant` to re-read the schedule. Returns the
/// timestamp written.
pub fn publish_refresh<C>(channel: &C, tenant_id: &TenantId) -> Result<DateTime<Utc>, RealtimeError>
where
    C: RefreshChannel + ?Sized,
{
    let at = Utc::now();
    channel.publish(tenant_id, at)?;
    log::debug!("Published refresh signal for {} at {}", tenant_id, at);
    Ok(at)
}
