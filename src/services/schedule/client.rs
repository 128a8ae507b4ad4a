use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

use crate::models::appointment::Appointment;
use crate::models::tenant::TenantId;
use crate::services::appointment::AppointmentStore;
use crate::services::realtime::{publish_refresh, RefreshChannel, RefreshEvent};

use super::cache::AppointmentCache;
use super::error::ScheduleError;

type IdLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// One tenant's view of the schedule: a cache kept in step with the store
/// through optimistic writes and refresh signals.
pub struct ScheduleClient<S: AppointmentStore> {
    tenant_id: TenantId,
    store: Arc<Mutex<S>>,
    cache: Arc<Mutex<AppointmentCache>>,
    channel: Option<Arc<dyn RefreshChannel>>,
    locks: IdLocks,
    write_timeout: Duration,
}

impl<S: AppointmentStore> Clone for ScheduleClient<S> {
    fn clone(&self) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            channel: self.channel.clone(),
            locks: Arc::clone(&self.locks),
            write_timeout: self.write_timeout,
        }
    }
}

impl<S: AppointmentStore> ScheduleClient<S> {
    pub fn new(tenant_id: TenantId, store: Arc<Mutex<S>>, write_timeout: Duration) -> Self {
        Self {
            cache: Arc::new(Mutex::new(AppointmentCache::new(tenant_id.clone()))),
            tenant_id,
            store,
            channel: None,
            locks: Arc::new(Mutex::new(HashMap::new())),
            write_timeout,
        }
    }

    /// Publish a refresh signal on this channel after every successful write.
    pub fn with_refresh_channel(mut self, channel: Arc<dyn RefreshChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn cache(&self) -> Arc<Mutex<AppointmentCache>> {
        Arc::clone(&self.cache)
    }

    /// Current cached appointments, optimistic changes included.
    pub fn snapshot(&self) -> Vec<Appointment> {
        lock_cache(&self.cache).appointments()
    }

    pub fn is_stale(&self) -> bool {
        lock_cache(&self.cache).is_stale()
    }

    /// Handler for a [`RefreshCoordinator`](crate::services::realtime::RefreshCoordinator):
    /// marks the cache stale so the next [`refresh_if_stale`](Self::refresh_if_stale)
    /// re-reads the store.
    pub fn refresh_handler(&self) -> impl FnMut(RefreshEvent) + Send + 'static {
        let cache = Arc::clone(&self.cache);
        move |event: RefreshEvent| {
            if event.notify {
                log::info!("Schedule for {} updated elsewhere", event.tenant_id);
            }
            lock_cache(&cache).invalidate();
        }
    }

    /// Read `from..=to` from the store and replace the cache with it.
    pub async fn load(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Appointment>, ScheduleError> {
        let store = Arc::clone(&self.store);
        let tenant_id = self.tenant_id.clone();
        let started_at = lock_cache(&self.cache).generation();

        let task = tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|_| anyhow::anyhow!("Appointment store lock poisoned"))?;
            guard.fetch_appointments(&tenant_id, from, to)
        });

        let fetched = match tokio::time::timeout(self.write_timeout, task).await {
            Err(_) => {
                return Err(ScheduleError::LoadFailed(format!(
                    "no answer after {}s",
                    self.write_timeout.as_secs()
                )))
            }
            Ok(Err(join_error)) => return Err(ScheduleError::LoadFailed(join_error.to_string())),
            Ok(Ok(Err(error))) => return Err(ScheduleError::LoadFailed(format!("{:#}", error))),
            Ok(Ok(Ok(fetched))) => fetched,
        };

        log::debug!(
            "Loaded {} appointments for {} ({} to {})",
            fetched.len(),
            self.tenant_id,
            from,
            to
        );

        let mut cache = lock_cache(&self.cache);
        cache.replace_read_at(started_at, (from, to), fetched);
        if cache.is_stale() {
            log::debug!("Schedule for {} changed during load", self.tenant_id);
        }
        Ok(cache.appointments())
    }

    /// Reload the cached range when something marked it stale. Returns
    /// whether a reload happened.
    pub async fn refresh_if_stale(&self) -> Result<bool, ScheduleError> {
        let range = {
            let cache = lock_cache(&self.cache);
            if !cache.is_stale() {
                return Ok(false);
            }
            cache.range()
        };

        match range {
            Some((from, to)) => {
                self.load(from, to).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Show `appointment` at once, persist it, then confirm or roll back.
    ///
    /// Changes to the same appointment id run one after another; changes to
    /// different ids run concurrently.
    pub async fn mutate(&self, appointment: Appointment) -> Result<Appointment, ScheduleError> {
        appointment.validate().map_err(ScheduleError::Validation)?;
        if appointment.tenant_id != self.tenant_id {
            return Err(ScheduleError::Validation(format!(
                "appointment {} belongs to {}, not {}",
                appointment.id, appointment.tenant_id, self.tenant_id
            )));
        }

        let id = appointment.id.clone();
        let mut guard = MutationGuard::new(self, id.clone());
        guard.acquire().await;

        lock_cache(&self.cache).apply_optimistic(appointment.clone());
        guard.applied = true;
        let outcome = self.write(appointment).await;

        {
            let mut cache = lock_cache(&self.cache);
            match &outcome {
                Ok(stored) => cache.confirm(stored.clone()),
                Err(error) => {
                    log::warn!("Rolling back appointment {}: {}", id, error);
                    cache.rollback(&id);
                    // The write may still land after a timeout.
                    if matches!(error, ScheduleError::Timeout { .. }) {
                        cache.invalidate();
                    }
                }
            }
        }
        guard.applied = false;

        if outcome.is_ok() {
            self.announce();
        }
        outcome
    }

    async fn write(&self, appointment: Appointment) -> Result<Appointment, ScheduleError> {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = store
                .lock()
                .map_err(|_| anyhow::anyhow!("Appointment store lock poisoned"))?;
            guard.save_appointment(&appointment)
        });

        match tokio::time::timeout(self.write_timeout, task).await {
            Err(_) => Err(ScheduleError::Timeout {
                timeout_seconds: self.write_timeout.as_secs(),
            }),
            Ok(Err(join_error)) => Err(ScheduleError::WriteFailed(join_error.to_string())),
            Ok(Ok(Err(error))) => Err(ScheduleError::WriteFailed(format!("{:#}", error))),
            Ok(Ok(Ok(stored))) => Ok(stored),
        }
    }

    /// A failed publish does not undo the write; other clients pick the
    /// change up on their next poll.
    fn announce(&self) {
        if let Some(channel) = &self.channel {
            if let Err(error) = publish_refresh(channel.as_ref(), &self.tenant_id) {
                log::warn!("{}", error);
            }
        }
    }

    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    fn release_lock(&self, id: &str, id_lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Map entry plus ours: nobody else is waiting.
        if Arc::strong_count(id_lock) == 2 {
            locks.remove(id);
        }
    }
}

/// Holds the per-id lock for one mutation. Dropped before the change
/// settled (the caller went away), it rolls the optimistic value back and
/// marks the cache stale, since the write may still land.
struct MutationGuard<'c, S: AppointmentStore> {
    client: &'c ScheduleClient<S>,
    id: String,
    id_lock: Arc<tokio::sync::Mutex<()>>,
    permit: Option<OwnedMutexGuard<()>>,
    applied: bool,
}

impl<'c, S: AppointmentStore> MutationGuard<'c, S> {
    fn new(client: &'c ScheduleClient<S>, id: String) -> Self {
        let id_lock = client.lock_for(&id);
        Self {
            client,
            id,
            id_lock,
            permit: None,
            applied: false,
        }
    }

    async fn acquire(&mut self) {
        self.permit = Some(Arc::clone(&self.id_lock).lock_owned().await);
    }
}

impl<S: AppointmentStore> Drop for MutationGuard<'_, S> {
    fn drop(&mut self) {
        if self.applied {
            log::warn!("Mutation of appointment {} abandoned before it settled", self.id);
            let mut cache = lock_cache(&self.client.cache);
            cache.rollback(&self.id);
            cache.invalidate();
        }

        self.permit.take();
        self.client.release_lock(&self.id, &self.id_lock);
    }
}

fn lock_cache(cache: &Mutex<AppointmentCache>) -> MutexGuard<'_, AppointmentCache> {
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::Database;
    use crate::services::realtime::{LocalRefreshHub, RefreshSource};
    use anyhow::Result;
    use chrono::NaiveTime;
    use std::sync::mpsc;

    fn tenant() -> TenantId {
        TenantId::new("clinic-a").unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn appointment(id: &str, hour: u32) -> Appointment {
        Appointment::new(
            id,
            tenant(),
            "p1",
            date(8),
            NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            45,
        )
        .unwrap()
    }

    fn database() -> Database {
        let db = Database::new(":memory:").unwrap();
        db.initialize_schema().unwrap();
        db
    }

    /// Store whose saves wait for a go-ahead, fail, or stall on demand.
    /// Reads can be gated too.
    struct GatedStore {
        gate: Option<mpsc::Receiver<()>>,
        fetch_gate: Option<mpsc::Receiver<()>>,
        fail: bool,
        stall: Option<Duration>,
        saved: Vec<Appointment>,
    }

    impl GatedStore {
        fn open() -> Self {
            Self {
                gate: None,
                fetch_gate: None,
                fail: false,
                stall: None,
                saved: Vec::new(),
            }
        }
    }

    impl AppointmentStore for GatedStore {
        fn fetch_appointments(
            &self,
            _tenant_id: &TenantId,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Vec<Appointment>> {
            let rows = self.saved.clone();
            if let Some(gate) = &self.fetch_gate {
                gate.recv()?;
            }
            Ok(rows)
        }

        fn save_appointment(&mut self, appointment: &Appointment) -> Result<Appointment> {
            if let Some(gate) = &self.gate {
                gate.recv()?;
            }
            if let Some(stall) = self.stall {
                std::thread::sleep(stall);
            }
            if self.fail {
                anyhow::bail!("connection reset");
            }
            self.saved.push(appointment.clone());
            Ok(appointment.clone())
        }
    }

    #[tokio::test]
    async fn test_load_fills_cache_from_store() {
        let mut db = database();
        AppointmentStore::save_appointment(&mut db, &appointment("a", 9)).unwrap();
        let client = ScheduleClient::new(tenant(), Arc::new(Mutex::new(db)), Duration::from_secs(5));

        let loaded = client.load(date(8), date(8)).await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert!(!client.is_stale());
    }

    #[tokio::test]
    async fn test_mutation_is_visible_before_the_write_lands() {
        let (go, gate) = mpsc::channel();
        let mut store = GatedStore::open();
        store.gate = Some(gate);
        let client = ScheduleClient::new(tenant(), Arc::new(Mutex::new(store)), Duration::from_secs(5));

        let task = tokio::spawn({
            let client = client.clone();
            async move { client.mutate(appointment("a", 9)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        {
            let cache = client.cache();
            let cache = cache.lock().unwrap();
            assert!(cache.has_pending("a"));
            assert!(cache.get("a").is_some());
        }

        go.send(()).unwrap();
        let stored = task.await.unwrap().unwrap();

        assert_eq!(stored.id, "a");
        assert!(!client.cache().lock().unwrap().has_pending("a"));
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let mut store = GatedStore::open();
        store.fail = true;
        let client = ScheduleClient::new(tenant(), Arc::new(Mutex::new(store)), Duration::from_secs(5));

        let error = client.mutate(appointment("a", 9)).await.unwrap_err();

        assert!(matches!(error, ScheduleError::WriteFailed(_)));
        assert!(client.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_slow_write_times_out_and_rolls_back() {
        let mut store = GatedStore::open();
        store.stall = Some(Duration::from_millis(300));
        let client = ScheduleClient::new(tenant(), Arc::new(Mutex::new(store)), Duration::from_millis(20));
        client.load(date(8), date(8)).await.unwrap();

        let error = client.mutate(appointment("a", 9)).await.unwrap_err();

        assert_eq!(error, ScheduleError::Timeout { timeout_seconds: 0 });
        assert!(client.snapshot().is_empty());
        // The write may still land, so the next refresh re-reads.
        assert!(client.is_stale());
    }

    #[tokio::test]
    async fn test_abandoned_mutation_is_rolled_back() {
        let (go, gate) = mpsc::channel();
        let mut store = GatedStore::open();
        store.gate = Some(gate);
        let client = ScheduleClient::new(tenant(), Arc::new(Mutex::new(store)), Duration::from_secs(5));
        client.load(date(8), date(8)).await.unwrap();

        let task = tokio::spawn({
            let client = client.clone();
            async move { client.mutate(appointment("x", 9)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(client.cache().lock().unwrap().has_pending("x"));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        {
            let cache = client.cache();
            let mut cache = cache.lock().unwrap();
            assert!(!cache.has_pending("x"));
            assert!(cache.is_stale());

            // A reload without the row no longer shows it.
            cache.replace_all((date(8), date(8)), Vec::new());
            assert!(cache.get("x").is_none());
        }
        assert!(client.locks.lock().unwrap().is_empty());

        // The abandoned write still lands; the next refresh picks it up.
        go.send(()).unwrap();
        client.cache().lock().unwrap().invalidate();
        assert!(client.refresh_if_stale().await.unwrap());
        let ids: Vec<String> = client.snapshot().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_signal_during_load_keeps_cache_stale() {
        let (go, gate) = mpsc::channel();
        let mut store = GatedStore::open();
        store.fetch_gate = Some(gate);
        let client = ScheduleClient::new(tenant(), Arc::new(Mutex::new(store)), Duration::from_secs(5));

        go.send(()).unwrap();
        client.load(date(8), date(8)).await.unwrap();
        client.cache().lock().unwrap().invalidate();

        let reload = tokio::spawn({
            let client = client.clone();
            async move { client.refresh_if_stale().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut handler = client.refresh_handler();
        handler(RefreshEvent {
            tenant_id: tenant(),
            signal_at: None,
            notify: true,
            source: RefreshSource::Signal,
        });
        go.send(()).unwrap();

        assert!(reload.await.unwrap().unwrap());
        assert!(client.is_stale());

        go.send(()).unwrap();
        assert!(client.refresh_if_stale().await.unwrap());
        assert!(!client.is_stale());
    }

    #[tokio::test]
    async fn test_invalid_appointment_never_reaches_cache() {
        let client = ScheduleClient::new(
            tenant(),
            Arc::new(Mutex::new(GatedStore::open())),
            Duration::from_secs(5),
        );
        let mut invalid = appointment("a", 9);
        invalid.patient_id.clear();

        let error = client.mutate(invalid).await.unwrap_err();

        assert!(matches!(error, ScheduleError::Validation(_)));
        assert!(client.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_same_id_mutations_are_serialised() {
        let (go, gate) = mpsc::channel();
        let mut store = GatedStore::open();
        store.gate = Some(gate);
        let store = Arc::new(Mutex::new(store));
        let client = ScheduleClient::new(tenant(), Arc::clone(&store), Duration::from_secs(5));

        let first = tokio::spawn({
            let client = client.clone();
            async move { client.mutate(appointment("a", 9)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = tokio::spawn({
            let client = client.clone();
            async move { client.mutate(appointment("a", 14)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The second change waits for the first to settle.
        let shown = client.cache().lock().unwrap().get("a").cloned().unwrap();
        assert_eq!(shown.start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());

        go.send(()).unwrap();
        first.await.unwrap().unwrap();
        go.send(()).unwrap();
        second.await.unwrap().unwrap();

        let saved: Vec<u32> = store
            .lock()
            .unwrap()
            .saved
            .iter()
            .map(|a| chrono::Timelike::hour(&a.start_time))
            .collect();
        assert_eq!(saved, vec![9, 14]);
        assert!(client.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_write_publishes_refresh() {
        let hub = Arc::new(LocalRefreshHub::new());
        let client = ScheduleClient::new(
            tenant(),
            Arc::new(Mutex::new(GatedStore::open())),
            Duration::from_secs(5),
        )
        .with_refresh_channel(hub.clone());

        client.mutate(appointment("a", 9)).await.unwrap();

        assert!(hub.latest(&tenant()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_event_marks_cache_stale() {
        let mut db = database();
        AppointmentStore::save_appointment(&mut db, &appointment("a", 9)).unwrap();
        let store = Arc::new(Mutex::new(db));
        let client = ScheduleClient::new(tenant(), Arc::clone(&store), Duration::from_secs(5));
        client.load(date(8), date(8)).await.unwrap();
        assert!(!client.refresh_if_stale().await.unwrap());

        // Another client writes directly to the store.
        AppointmentStore::save_appointment(&mut *store.lock().unwrap(), &appointment("b", 10)).unwrap();
        assert_eq!(client.snapshot().len(), 1);

        let mut handler = client.refresh_handler();
        handler(RefreshEvent {
            tenant_id: tenant(),
            signal_at: None,
            notify: false,
            source: RefreshSource::Poll,
        });

        assert!(client.refresh_if_stale().await.unwrap());
        assert_eq!(client.snapshot().len(), 2);
    }
}
