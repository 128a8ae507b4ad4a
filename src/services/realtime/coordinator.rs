//! Client-side consumer of the refresh signal.
//!
//! Coalesces bursts of signals into one refresh, decides whether the change
//! is recent enough to be announced, and falls back to a visible polling
//! mode while the subscription cannot be attached.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::{RefreshChannel, RefreshPolicy, RefreshReceiver};
use crate::models::tenant::TenantId;
use crate::utils::date::age;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Subscribed; refreshes follow published signals.
    Realtime,
    /// Subscription failed; refreshing on a fixed interval until it can be
    /// attached again.
    Polling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSource {
    Signal,
    Poll,
}

/// One "re-read the schedule" instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshEvent {
    pub tenant_id: TenantId,
    /// Newest signal timestamp known when the event fired.
    pub signal_at: Option<DateTime<Utc>>,
    /// Whether to show an "updated elsewhere" notice. Only for signals
    /// inside the recency window; catch-up after a long disconnect and
    /// polling refreshes stay silent.
    pub notify: bool,
    pub source: RefreshSource,
}

pub struct RefreshCoordinator {
    tenant_id: TenantId,
    mode: watch::Receiver<RefreshMode>,
    task: Option<JoinHandle<()>>,
}

impl RefreshCoordinator {
    /// Attach to `tenant`'s refresh signal and call `handler` once per
    /// coalesced change. Must be called inside a Tokio runtime.
    pub fn spawn<C, H>(
        channel: Arc<C>,
        tenant_id: TenantId,
        policy: RefreshPolicy,
        handler: H,
    ) -> Self
    where
        C: RefreshChannel + ?Sized,
        H: FnMut(RefreshEvent) + Send + 'static,
    {
        let first_attach = attach(channel.as_ref(), &tenant_id);
        let initial_mode = if first_attach.is_some() {
            RefreshMode::Realtime
        } else {
            RefreshMode::Polling
        };
        let (mode_tx, mode_rx) = watch::channel(initial_mode);

        let worker = Worker {
            channel,
            tenant_id: tenant_id.clone(),
            policy,
            handler,
            mode: mode_tx,
        };
        let task = tokio::spawn(worker.run(first_attach));

        Self {
            tenant_id,
            mode: mode_rx,
            task: Some(task),
        }
    }

    pub fn mode(&self) -> RefreshMode {
        *self.mode.borrow()
    }

    /// Resolves on the next mode change.
    pub async fn mode_changed(&mut self) -> Option<RefreshMode> {
        self.mode.changed().await.ok()?;
        Some(*self.mode.borrow())
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("Refresh coordinator for {} stopped", self.tenant_id);
        }
    }
}

impl Drop for RefreshCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn attach<C: RefreshChannel + ?Sized>(channel: &C, tenant_id: &TenantId) -> Option<RefreshReceiver> {
    match channel.watch(tenant_id) {
        Ok(mut rx) => {
            rx.borrow_and_update();
            Some(rx)
        }
        Err(error) => {
            log::warn!("{}; falling back to polling", error);
            None
        }
    }
}

struct Worker<C: ?Sized, H> {
    channel: Arc<C>,
    tenant_id: TenantId,
    policy: RefreshPolicy,
    handler: H,
    mode: watch::Sender<RefreshMode>,
}

impl<C, H> Worker<C, H>
where
    C: RefreshChannel + ?Sized,
    H: FnMut(RefreshEvent) + Send + 'static,
{
    async fn run(mut self, mut attached: Option<RefreshReceiver>) {
        loop {
            match attached.take() {
                Some(rx) => {
                    self.set_mode(RefreshMode::Realtime);
                    self.follow(rx).await;
                    log::warn!(
                        "Refresh channel for {} closed; falling back to polling",
                        self.tenant_id
                    );
                }
                None => {
                    self.set_mode(RefreshMode::Polling);
                    attached = Some(self.poll_until_attached().await);
                }
            }
        }
    }

    fn set_mode(&self, mode: RefreshMode) {
        self.mode.send_if_modified(|current| {
            if *current == mode {
                return false;
            }
            log::info!("Refresh for {} now in {:?} mode", self.tenant_id, mode);
            *current = mode;
            true
        });
    }

    /// Coalesce signals: the first change opens a window of `debounce`,
    /// everything arriving inside it folds into one event.
    async fn follow(&mut self, mut rx: RefreshReceiver) {
        while rx.changed().await.is_ok() {
            let window = time::sleep(self.policy.debounce);
            tokio::pin!(window);

            loop {
                tokio::select! {
                    _ = &mut window => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            let signal_at = *rx.borrow_and_update();
            if let Some(at) = signal_at {
                let notify = is_recent(at, Utc::now(), self.policy.recency_window);
                self.emit(Some(at), notify, RefreshSource::Signal);
            }
        }
    }

    /// Refresh on every tick and try to attach again after each refresh.
    async fn poll_until_attached(&mut self) -> RefreshReceiver {
        let mut ticker = time::interval_at(
            Instant::now() + self.policy.poll_interval,
            self.policy.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let latest = self.channel.latest(&self.tenant_id).unwrap_or_else(|e| {
                log::debug!("Polling {}: {}", self.tenant_id, e);
                None
            });
            self.emit(latest, false, RefreshSource::Poll);

            if let Some(rx) = attach(self.channel.as_ref(), &self.tenant_id) {
                log::info!("Refresh subscription for {} re-established", self.tenant_id);
                return rx;
            }
        }
    }

    fn emit(&mut self, signal_at: Option<DateTime<Utc>>, notify: bool, source: RefreshSource) {
        log::debug!(
            "Refreshing schedule for {} ({:?}, notify: {})",
            self.tenant_id,
            source,
            notify
        );
        (self.handler)(RefreshEvent {
            tenant_id: self.tenant_id.clone(),
            signal_at,
            notify,
            source,
        });
    }
}

fn is_recent(signal_at: DateTime<Utc>, now: DateTime<Utc>, window: std::time::Duration) -> bool {
    match chrono::Duration::from_std(window) {
        Ok(window) => age(signal_at, now) <= window,
        Err(_) => true,
    }
}
