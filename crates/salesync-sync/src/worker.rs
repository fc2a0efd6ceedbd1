//! Sync worker - drains the request queue
//!
//! The [`SyncWorker`] polls the queue for due requests and runs their
//! reconciles in parallel, bounded by a semaphore. Requests already running
//! are skipped by later polls. Work on one mirror triple is serialized by
//! the engine's lease, so parallelism is only ever across triples.
//!
//! ```text
//! interval ──→ dequeue_due ──→ JoinSet ──→ engine.process (≤ concurrency at once)
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashSet;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use salesync_core::config::WorkerConfig;
use salesync_core::domain::{SyncRequest, SyncRequestId};
use salesync_core::ports::ISyncRequestQueue;

use crate::engine::{ReconcileOutcome, ReconciliationEngine};
use crate::SyncError;

type TaskResult = (SyncRequestId, Result<ReconcileOutcome, SyncError>);

// ============================================================================
// BatchSummary
// ============================================================================

/// Counts of reconcile outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub pushed: u32,
    pub skipped: u32,
    pub deleted: u32,
    pub busy: u32,
    pub deferred: u32,
    pub failed: u32,
    /// Reconciles aborted by a storage or configuration error
    pub errors: u32,
}

impl BatchSummary {
    pub fn record(&mut self, result: &Result<ReconcileOutcome, SyncError>) {
        match result {
            Ok(ReconcileOutcome::Pushed { .. }) => self.pushed += 1,
            Ok(ReconcileOutcome::Skipped) => self.skipped += 1,
            Ok(ReconcileOutcome::Deleted) => self.deleted += 1,
            Ok(ReconcileOutcome::Busy) => self.busy += 1,
            Ok(ReconcileOutcome::Deferred { .. }) => self.deferred += 1,
            Ok(ReconcileOutcome::Failed { .. }) => self.failed += 1,
            Err(_) => self.errors += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.pushed
            + self.skipped
            + self.deleted
            + self.busy
            + self.deferred
            + self.failed
            + self.errors
    }
}

// ============================================================================
// SyncWorker
// ============================================================================

/// Polls the queue and executes sync requests
pub struct SyncWorker {
    engine: Arc<ReconciliationEngine>,
    queue: Arc<dyn ISyncRequestQueue>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<DashSet<SyncRequestId>>,
    poll_interval: Duration,
    batch_size: u32,
}

impl SyncWorker {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        queue: Arc<dyn ISyncRequestQueue>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            engine,
            queue,
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
            in_flight: Arc::new(DashSet::new()),
            poll_interval: config.poll_interval(),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Number of requests currently being reconciled
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Polls until `cancel` fires, then waits for running reconciles
    ///
    /// Queue read failures are logged and retried on the next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.batch_size,
            concurrency = self.semaphore.available_permits(),
            lease_owner = self.engine.lease_owner(),
            "Sync worker starting"
        );

        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(in_flight = tasks.len(), "Sync worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.spawn_due(&mut tasks).await {
                        warn!(error = %e, "Failed to poll sync queue");
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_joined(joined);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_joined(joined);
        }
        info!("Sync worker stopped");
    }

    /// Runs one batch of due requests to completion
    pub async fn run_once(&self) -> anyhow::Result<BatchSummary> {
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        self.spawn_due(&mut tasks).await?;

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, result)) => summary.record(&result),
                Err(e) => {
                    error!(error = %e, "Reconcile task panicked");
                    summary.errors += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Runs batches until no request is due; returns the combined counts
    ///
    /// Stops early after a batch that made no progress (only busy or aborted
    /// reconciles), since those requests would be dequeued again unchanged.
    pub async fn drain(&self) -> anyhow::Result<BatchSummary> {
        let mut total = BatchSummary::default();
        loop {
            let batch = self.run_once().await?;
            if batch.total() == 0 {
                break;
            }
            let stalled = batch.busy + batch.errors == batch.total();
            total.pushed += batch.pushed;
            total.skipped += batch.skipped;
            total.deleted += batch.deleted;
            total.busy += batch.busy;
            total.deferred += batch.deferred;
            total.failed += batch.failed;
            total.errors += batch.errors;
            if stalled {
                break;
            }
        }
        Ok(total)
    }

    /// Dequeues due requests and spawns a reconcile for each one not yet running
    async fn spawn_due(&self, tasks: &mut JoinSet<TaskResult>) -> anyhow::Result<usize> {
        let due = self.queue.dequeue_due(Utc::now(), self.batch_size).await?;
        let mut spawned = 0;

        for request in due {
            if !self.in_flight.insert(request.id()) {
                continue;
            }
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&self.semaphore);
            let in_flight = Arc::clone(&self.in_flight);
            tasks.spawn(async move {
                let id = request.id();
                let result = execute(engine, semaphore, request).await;
                in_flight.remove(&id);
                (id, result)
            });
            spawned += 1;
        }

        if spawned > 0 {
            debug!(spawned, "Dispatched sync requests");
        }
        Ok(spawned)
    }
}

async fn execute(
    engine: Arc<ReconciliationEngine>,
    semaphore: Arc<Semaphore>,
    request: SyncRequest,
) -> Result<ReconcileOutcome, SyncError> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| SyncError::Storage(anyhow::anyhow!("worker semaphore closed")))?;

    let result = engine.process(&request).await;
    match &result {
        Ok(outcome) => debug!(
            request_id = %request.id(),
            sync_type = %request.key().sync_type,
            outcome = outcome.label(),
            "Sync request processed"
        ),
        Err(e) => error!(request_id = %request.id(), error = %e, "Sync request aborted"),
    }
    result
}

fn log_joined(joined: Result<TaskResult, tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Reconcile task panicked");
    }
}
