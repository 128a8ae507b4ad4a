use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

use super::{RealtimeError, RefreshChannel, RefreshReceiver};
use crate::models::tenant::TenantId;

/// In-process refresh channel: one watched value per tenant.
#[derive(Default)]
pub struct LocalRefreshHub {
    senders: Mutex<HashMap<TenantId, watch::Sender<Option<DateTime<Utc>>>>>,
}

impl LocalRefreshHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers for `tenant`.
    pub fn subscriber_count(&self, tenant_id: &TenantId) -> usize {
        self.senders
            .lock()
            .ok()
            .and_then(|senders| senders.get(tenant_id).map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }

    fn with_sender<T>(
        &self,
        tenant_id: &TenantId,
        f: impl FnOnce(&watch::Sender<Option<DateTime<Utc>>>) -> T,
    ) -> Option<T> {
        let mut senders = self.senders.lock().ok()?;
        let sender = senders
            .entry(tenant_id.clone())
            .or_insert_with(|| watch::channel(None).0);
        Some(f(sender))
    }
}

impl RefreshChannel for LocalRefreshHub {
    fn publish(&self, tenant_id: &TenantId, at: DateTime<Utc>) -> Result<(), RealtimeError> {
        // Last write wins; subscribers only learn that something changed.
        self.with_sender(tenant_id, |tx| {
            tx.send_replace(Some(at));
        })
        .ok_or_else(|| RealtimeError::PublishFailed {
            tenant: tenant_id.to_string(),
            reason: "hub lock poisoned".to_string(),
        })
    }

    fn watch(&self, tenant_id: &TenantId) -> Result<RefreshReceiver, RealtimeError> {
        self.with_sender(tenant_id, |tx| tx.subscribe())
            .ok_or_else(|| RealtimeError::SubscribeFailed {
                tenant: tenant_id.to_string(),
                reason: "hub lock poisoned".to_string(),
            })
    }

    fn latest(&self, tenant_id: &TenantId) -> Result<Option<DateTime<Utc>>, RealtimeError> {
        let senders = self
            .senders
            .lock()
            .map_err(|_| RealtimeError::Closed(tenant_id.to_string()))?;
        Ok(senders.get(tenant_id).and_then(|tx| *tx.borrow()))
    }
}
