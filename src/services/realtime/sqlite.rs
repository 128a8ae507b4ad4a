use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::sync::Mutex;

use super::hub::LocalRefreshHub;
use super::{RealtimeError, RefreshChannel, RefreshReceiver};
use crate::models::tenant::TenantId;
use crate::services::database::Database;

/// Refresh channel that persists the last signal per tenant in the
/// `refresh_signals` table, so other processes sharing the database see it
/// through `latest()`. Subscribers in this process are woken through an
/// in-process hub.
pub struct SqliteRefreshChannel {
    db: Mutex<Database>,
    local: LocalRefreshHub,
}

impl SqliteRefreshChannel {
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            local: LocalRefreshHub::new(),
        }
    }

    fn stored(&self, tenant_id: &TenantId) -> Result<Option<DateTime<Utc>>, String> {
        let db = self.db.lock().map_err(|_| "database lock poisoned".to_string())?;
        db.connection()
            .query_row(
                "SELECT signaled_at FROM refresh_signals WHERE tenant_id = ?1",
                [tenant_id.as_str()],
                |row| row.get::<_, DateTime<Utc>>(0),
            )
            .optional()
            .map_err(|e| e.to_string())
    }
}

impl RefreshChannel for SqliteRefreshChannel {
    fn publish(&self, tenant_id: &TenantId, at: DateTime<Utc>) -> Result<(), RealtimeError> {
        let failed = |reason: String| RealtimeError::PublishFailed {
            tenant: tenant_id.to_string(),
            reason,
        };

        {
            let db = self
                .db
                .lock()
                .map_err(|_| failed("database lock poisoned".to_string()))?;
            db.connection()
                .execute(
                    "INSERT INTO refresh_signals (tenant_id, signaled_at) VALUES (?1, ?2)
                     ON CONFLICT (tenant_id) DO UPDATE SET signaled_at = excluded.signaled_at",
                    params![tenant_id.as_str(), at],
                )
                .map_err(|e| failed(e.to_string()))?;
        }

        self.local.publish(tenant_id, at)
    }

    fn watch(&self, tenant_id: &TenantId) -> Result<RefreshReceiver, RealtimeError> {
        let stored = self
            .stored(tenant_id)
            .map_err(|reason| RealtimeError::SubscribeFailed {
                tenant: tenant_id.to_string(),
                reason,
            })?;

        // Seed the in-process value so a new subscriber starts from the
        // persisted signal instead of treating it as a change.
        if let Some(at) = stored {
            if self.local.latest(tenant_id)?.is_none() {
                self.local.publish(tenant_id, at)?;
            }
        }

        self.local.watch(tenant_id)
    }

    fn latest(&self, tenant_id: &TenantId) -> Result<Option<DateTime<Utc>>, RealtimeError> {
        self.stored(tenant_id)
            .map_err(|_| RealtimeError::Closed(tenant_id.to_string()))
    }
}
