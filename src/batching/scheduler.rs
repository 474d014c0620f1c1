//! Background batch scheduler.
//!
//! A single worker task polls the queue and flushes a group when one of
//! three conditions is met:
//!
//! 1. **Size** — the group holds `max_batch_size` requests.
//! 2. **Deadline** — at least one request has passed its deadline.
//! 3. **Near-deadline** — the group holds at least `min_batch_size`
//!    requests and the oldest is older than 70% of `max_wait_ms`.
//!
//! A batch failure in one group never blocks another group: the failed
//! batch's requests are retried individually, and only an individual
//! failure is surfaced to that request's caller.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::queue::{QueuedRequest, RequestQueue};
use crate::config::BatchingSettings;
use crate::provider::BatchExecutor;
use crate::telemetry::MetricsCollector;
use crate::{AsahiError, Result};

/// Fraction of `max_wait_ms` after which a min-sized group flushes.
const NEAR_DEADLINE_FRACTION: f64 = 0.7;

/// Scheduler counters, snapshot via [`BatchScheduler::stats`].
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub running: bool,
    pub batches_executed: u64,
    pub requests_processed: u64,
    pub batch_errors: u64,
    pub individual_fallbacks: u64,
    pub queue_size: usize,
}

/// Background scheduler that forms and dispatches request batches.
pub struct BatchScheduler {
    core: Arc<SchedulerCore>,
    // Lifecycle transitions (start/stop) serialize on this lock.
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct SchedulerCore {
    queue: Arc<RequestQueue>,
    executor: Arc<dyn BatchExecutor>,
    settings: BatchingSettings,
    collector: Option<Arc<MetricsCollector>>,
    running: AtomicBool,
    batches_executed: AtomicU64,
    requests_processed: AtomicU64,
    batch_errors: AtomicU64,
    individual_fallbacks: AtomicU64,
}

impl BatchScheduler {
    pub fn new(
        queue: Arc<RequestQueue>,
        executor: Arc<dyn BatchExecutor>,
        settings: BatchingSettings,
    ) -> Self {
        Self {
            core: Arc::new(SchedulerCore {
                queue,
                executor,
                settings,
                collector: None,
                running: AtomicBool::new(false),
                batches_executed: AtomicU64::new(0),
                requests_processed: AtomicU64::new(0),
                batch_errors: AtomicU64::new(0),
                individual_fallbacks: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Attach a metrics collector for batch and error events.
    pub fn with_collector(mut self, collector: Arc<MetricsCollector>) -> Self {
        // Sole Arc holder until start() is called, so get_mut is safe here.
        if let Some(core) = Arc::get_mut(&mut self.core) {
            core.collector = Some(collector);
        }
        self
    }

    /// Launch the background worker.
    ///
    /// Rejects a second start while the worker is running.
    pub fn start(&self) -> Result<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| AsahiError::Batching("scheduler lock poisoned".to_string()))?;
        if self.core.running.swap(true, Ordering::SeqCst) {
            return Err(AsahiError::Batching(
                "batch scheduler is already running".to_string(),
            ));
        }
        let core = Arc::clone(&self.core);
        *worker = Some(tokio::spawn(async move {
            core.run_loop().await;
        }));
        info!(
            poll_interval_ms = self.core.settings.poll_interval_ms,
            max_batch_size = self.core.settings.max_batch_size,
            min_batch_size = self.core.settings.min_batch_size,
            "batch scheduler started"
        );
        Ok(())
    }

    /// Stop the scheduler gracefully.
    ///
    /// Clears the running flag, joins the worker up to `timeout`, then
    /// drains any remaining requests individually so no completion
    /// handle is left unresolved.
    pub async fn stop(&self, timeout: Duration) {
        // Flip the flag and take the handle under the lifecycle lock;
        // the join happens after the lock is released.
        let handle = match self.worker.lock() {
            Ok(mut worker) => {
                if !self.core.running.swap(false, Ordering::SeqCst) {
                    return;
                }
                worker.take()
            }
            Err(_) => {
                self.core.running.store(false, Ordering::SeqCst);
                None
            }
        };
        if let Some(handle) = handle
            && tokio::time::timeout(timeout, handle).await.is_err()
        {
            warn!("scheduler worker did not stop within timeout");
        }
        // The worker drains on exit; drain again in case the join timed
        // out. Queue pops are atomic, so a double drain is harmless.
        self.core.drain_remaining().await;
        info!("batch scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }

    /// Immediately flush all pending requests in a group.
    pub async fn flush_group(&self, group: &str) {
        let batch = self
            .core
            .queue
            .get_batch(group, self.core.settings.max_batch_size);
        if !batch.is_empty() {
            self.core.execute_batch(batch).await;
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            running: self.is_running(),
            batches_executed: self.core.batches_executed.load(Ordering::Relaxed),
            requests_processed: self.core.requests_processed.load(Ordering::Relaxed),
            batch_errors: self.core.batch_errors.load(Ordering::Relaxed),
            individual_fallbacks: self.core.individual_fallbacks.load(Ordering::Relaxed),
            queue_size: self.core.queue.size(None),
        }
    }
}

impl SchedulerCore {
    async fn run_loop(&self) {
        debug!("scheduler loop started");
        let poll = Duration::from_millis(self.settings.poll_interval_ms);
        while self.running.load(Ordering::SeqCst) {
            self.tick().await;
            tokio::time::sleep(poll).await;
        }
        // Shutdown (or a crashed tick clearing the flag) lands here, so
        // queued requests always get resolved.
        self.drain_remaining().await;
    }

    async fn tick(&self) {
        for group in self.queue.all_groups() {
            let size = self.queue.size(Some(&group));
            if size == 0 {
                continue;
            }

            let flush = if size >= self.settings.max_batch_size {
                debug!(group = %group, size, "flushing group: size threshold");
                true
            } else if self.queue.has_expired(&group) {
                debug!(group = %group, size, "flushing group: deadline expired");
                true
            } else if size >= self.settings.min_batch_size {
                let oldest_age_ms = self.queue.oldest_age_ms(&group);
                let threshold_ms =
                    (self.settings.max_wait_ms as f64 * NEAR_DEADLINE_FRACTION) as u64;
                if oldest_age_ms > threshold_ms {
                    debug!(
                        group = %group,
                        oldest_age_ms,
                        threshold_ms,
                        "flushing group: approaching deadline"
                    );
                    true
                } else {
                    false
                }
            } else {
                false
            };

            if flush {
                let batch = self.queue.get_batch(&group, self.settings.max_batch_size);
                if !batch.is_empty() {
                    self.execute_batch(batch).await;
                }
            }
        }
    }

    async fn execute_batch(&self, batch: Vec<QueuedRequest>) {
        let batch_size = batch.len();
        let group = batch[0].batch_group.clone();

        match self.executor.execute(&batch).await {
            Ok(results) => {
                let produced = results.len();
                let mut results = results.into_iter();
                for request in batch {
                    match results.next() {
                        Some(response) => request.resolve(Ok(response)),
                        None => request.resolve(Err(AsahiError::Batching(
                            "no result returned for request in batch".to_string(),
                        ))),
                    }
                }
                self.batches_executed.fetch_add(1, Ordering::Relaxed);
                self.requests_processed
                    .fetch_add(produced.min(batch_size) as u64, Ordering::Relaxed);
                if let Some(collector) = &self.collector {
                    collector.record_batch_event(batch_size, 0.0);
                }
                info!(batch_size, batch_group = %group, "batch executed");
            }
            Err(e) => {
                error!(
                    batch_size,
                    batch_group = %group,
                    error = %e,
                    "batch execution failed; falling back to individual calls"
                );
                self.batch_errors.fetch_add(1, Ordering::Relaxed);
                if let Some(collector) = &self.collector {
                    collector.record_error(e.kind(), "batch_scheduler");
                }
                self.fallback_individual(batch).await;
            }
        }
    }

    /// Retry each request of a failed batch on its own.
    async fn fallback_individual(&self, batch: Vec<QueuedRequest>) {
        for request in batch {
            match self.execute_single(&request).await {
                Ok(response) => {
                    self.individual_fallbacks.fetch_add(1, Ordering::Relaxed);
                    self.requests_processed.fetch_add(1, Ordering::Relaxed);
                    request.resolve(Ok(response));
                }
                Err(e) => {
                    error!(
                        request_id = %request.request_id,
                        error = %e,
                        "individual fallback failed"
                    );
                    if let Some(collector) = &self.collector {
                        collector.record_error(e.kind(), "batch_scheduler");
                    }
                    request.resolve(Err(e));
                }
            }
        }
    }

    /// Resolve everything still queued via individual execution.
    async fn drain_remaining(&self) {
        for group in self.queue.all_groups() {
            loop {
                let batch = self.queue.get_batch(&group, 1);
                if batch.is_empty() {
                    break;
                }
                for request in batch {
                    match self.execute_single(&request).await {
                        Ok(response) => {
                            self.requests_processed.fetch_add(1, Ordering::Relaxed);
                            request.resolve(Ok(response));
                        }
                        Err(e) => {
                            error!(
                                request_id = %request.request_id,
                                error = %e,
                                "drain failed for request"
                            );
                            request.resolve(Err(e));
                        }
                    }
                }
            }
        }
    }

    async fn execute_single(
        &self,
        request: &QueuedRequest,
    ) -> Result<crate::provider::ProviderResponse> {
        let results = self.executor.execute(std::slice::from_ref(request)).await?;
        results.into_iter().next().ok_or_else(|| {
            AsahiError::Batching("executor returned no result for single request".to_string())
        })
    }
}
