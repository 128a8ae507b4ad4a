use anyhow::Result;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::recurrence::{OccurrenceState, RecurringOccurrence, RecurringSeries};
use crate::models::tenant::TenantId;

use super::error::RecurrenceExpansionError;
use super::expand::{expand_occurrences, needs_extension, next_horizon};
use super::lifecycle::transition;

/// Where materialized occurrences live.
pub trait OccurrenceStore: Send + 'static {
    fn list_for_series(
        &self,
        tenant_id: &TenantId,
        series_id: &str,
    ) -> Result<Vec<RecurringOccurrence>>;

    /// Write all occurrences atomically: either every row lands or none.
    fn batch_save_occurrences(&mut self, occurrences: &[RecurringOccurrence]) -> Result<()>;
}

/// Shared flag the owner of an expansion flips when it no longer wants the
/// result (screen closed, request dropped).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionReport {
    pub series_id: String,
    pub horizon_end: NaiveDate,
    pub created: Vec<RecurringOccurrence>,
    pub already_present: usize,
}

impl ExpansionReport {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }
}

/// Expands a series and persists the new occurrences in one batched write.
pub struct RecurrenceExpander<S: OccurrenceStore> {
    store: Arc<Mutex<S>>,
    write_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl<S: OccurrenceStore> Clone for RecurrenceExpander<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            write_timeout: self.write_timeout,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
        }
    }
}

impl<S: OccurrenceStore> RecurrenceExpander<S> {
    pub fn new(store: Arc<Mutex<S>>, write_timeout: Duration) -> Self {
        Self {
            store,
            write_timeout,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }

    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    /// Materialize every missing occurrence of `series` up to `horizon_end`.
    ///
    /// Returns `Cancelled` instead of a report when `cancel` was flipped
    /// while the write was in flight; the written rows stay (a later run
    /// finds them and does nothing).
    pub async fn expand_and_persist(
        &self,
        series: &RecurringSeries,
        horizon_end: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<ExpansionReport, RecurrenceExpansionError> {
        self.ensure_live(series, cancel)?;

        let existing = self.load_existing(series).await?;
        let mut created = expand_occurrences(series, &existing, horizon_end)?;

        for occurrence in &mut created {
            transition(occurrence, OccurrenceState::Materialized)?;
        }

        if !created.is_empty() {
            self.ensure_live(series, cancel)?;
            self.write_batch(created.clone()).await?;
        }

        self.ensure_live(series, cancel)?;

        log::info!(
            "Series {}: materialized {} occurrences up to {}",
            series.id,
            created.len(),
            horizon_end
        );

        Ok(ExpansionReport {
            series_id: series.id.clone(),
            horizon_end,
            created,
            already_present: existing.len(),
        })
    }

    /// [`expand_and_persist`](Self::expand_and_persist), retrying transient
    /// failures with exponential backoff.
    pub async fn expand_with_retry(
        &self,
        series: &RecurringSeries,
        horizon_end: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<ExpansionReport, RecurrenceExpansionError> {
        let mut attempt = 0u32;
        loop {
            match self.expand_and_persist(series, horizon_end, cancel).await {
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff_delay(self.retry_delay, attempt);
                    attempt += 1;
                    log::warn!(
                        "Expansion attempt {} for series {} failed: {}; retrying in {:?}",
                        attempt,
                        series.id,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    /// Extend an open series when its materialized range is about to run
    /// out. `None` when no extension was needed.
    pub async fn extend_if_needed(
        &self,
        series: &RecurringSeries,
        today: NaiveDate,
        horizon_days: u32,
        extend_within_days: u32,
        cancel: &CancelToken,
    ) -> Result<Option<ExpansionReport>, RecurrenceExpansionError> {
        let existing = self.load_existing(series).await?;
        if !needs_extension(series, &existing, today, extend_within_days) {
            return Ok(None);
        }

        let horizon_end = next_horizon(today, horizon_days);
        self.expand_with_retry(series, horizon_end, cancel)
            .await
            .map(Some)
    }

    fn ensure_live(
        &self,
        series: &RecurringSeries,
        cancel: &CancelToken,
    ) -> Result<(), RecurrenceExpansionError> {
        if cancel.is_cancelled() {
            log::debug!("Expansion of series {} cancelled by its owner", series.id);
            return Err(RecurrenceExpansionError::Cancelled {
                series_id: series.id.clone(),
            });
        }
        Ok(())
    }

    async fn load_existing(
        &self,
        series: &RecurringSeries,
    ) -> Result<Vec<RecurringOccurrence>, RecurrenceExpansionError> {
        let store = Arc::clone(&self.store);
        let tenant_id = series.tenant_id.clone();
        let series_id = series.id.clone();

        let loaded = tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|_| anyhow::anyhow!("Occurrence store lock poisoned"))?;
            guard.list_for_series(&tenant_id, &series_id)
        })
        .await
        .map_err(|e| RecurrenceExpansionError::WriteFailed(format!("load task failed: {}", e)))?;

        loaded.map_err(|e| RecurrenceExpansionError::WriteFailed(format!("{:#}", e)))
    }

    async fn write_batch(
        &self,
        occurrences: Vec<RecurringOccurrence>,
    ) -> Result<(), RecurrenceExpansionError> {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = store
                .lock()
                .map_err(|_| anyhow::anyhow!("Occurrence store lock poisoned"))?;
            guard.batch_save_occurrences(&occurrences)
        });

        match tokio::time::timeout(self.write_timeout, task).await {
            Err(_) => Err(RecurrenceExpansionError::Timeout {
                timeout_seconds: self.write_timeout.as_secs(),
            }),
            Ok(Err(join_error)) => Err(RecurrenceExpansionError::WriteFailed(format!(
                "write task failed: {}",
                join_error
            ))),
            Ok(Ok(Err(error))) => Err(RecurrenceExpansionError::WriteFailed(format!("{:#}", error))),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt.min(10)))
}
