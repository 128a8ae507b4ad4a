use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::{RealtimeError, RefreshChannel};
use crate::models::tenant::TenantId;

/// Live listener on a tenant's refresh signal. Dropping it (or calling
/// [`unsubscribe`](Self::unsubscribe)) detaches the listener.
#[derive(Debug)]
pub struct RefreshSubscription {
    tenant_id: TenantId,
    task: Option<JoinHandle<()>>,
}

impl RefreshSubscription {
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("Refresh listener for {} detached", self.tenant_id);
        }
    }
}

impl Drop for RefreshSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Call `on_change` with the signal timestamp every time the tenant's
/// stored value changes after this call. Must run inside a Tokio runtime.
pub fn subscribe_to_refresh<C, F>(
    channel: &C,
    tenant_id: &TenantId,
    mut on_change: F,
) -> Result<RefreshSubscription, RealtimeError>
where
    C: RefreshChannel + ?Sized,
    F: FnMut(DateTime<Utc>) + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
        RealtimeError::SubscribeFailed {
            tenant: tenant_id.to_string(),
            reason: e.to_string(),
        }
    })?;

    let mut rx = channel.watch(tenant_id)?;
    rx.borrow_and_update();

    let task = runtime.spawn(async move {
        while rx.changed().await.is_ok() {
            let signal = *rx.borrow_and_update();
            if let Some(at) = signal {
                on_change(at);
            }
        }
    });

    Ok(RefreshSubscription {
        tenant_id: tenant_id.clone(),
        task: Some(task),
    })
}
