//! Sync request queue port (driven/secondary port)
//!
//! At most one `Pending` request exists per [`SyncRequestKey`]. Enqueueing
//! an already pending key only replaces its task arguments, which collapses
//! bursts of local edits into a single remote push.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{RequestStatus, SyncRequest, SyncRequestId, SyncRequestKey, SyncType};

/// Result of an enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub id: SyncRequestId,
    /// False when the key was already pending and the request was collapsed
    pub created: bool,
}

/// Filter criteria for querying sync requests
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub sync_type: Option<SyncType>,
    pub limit: Option<u32>,
}

impl RequestFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_sync_type(mut self, sync_type: SyncType) -> Self {
        self.sync_type = Some(sync_type);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Port trait for the de-duplicating sync request queue
#[async_trait::async_trait]
pub trait ISyncRequestQueue: Send + Sync {
    /// Enqueues work for `key`, collapsing into an existing pending request
    ///
    /// # Returns
    /// The request id and whether a new row was created. On collapse the
    /// pending request's `task_kwargs` are replaced (last write wins).
    async fn enqueue(&self, key: &SyncRequestKey, task_kwargs: Value) -> anyhow::Result<Enqueued>;

    /// Pending requests due at `now`, oldest first
    async fn dequeue_due(&self, now: DateTime<Utc>, limit: u32)
        -> anyhow::Result<Vec<SyncRequest>>;

    /// Pending -> Done
    async fn mark_done(&self, id: SyncRequestId) -> anyhow::Result<()>;

    /// Pending -> Failed with `reason`
    async fn mark_failed(&self, id: SyncRequestId, reason: &str) -> anyhow::Result<()>;

    /// Counts a transient failure and defers the request until `next_attempt_at`
    ///
    /// # Returns
    /// The updated attempt count
    async fn record_transient_failure(
        &self,
        id: SyncRequestId,
        reason: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> anyhow::Result<u32>;

    /// Failed -> Pending (manual retry), resetting attempts
    ///
    /// # Errors
    /// Fails if the request is not `Failed`, or if another request for the
    /// same key is already pending.
    async fn retry(&self, id: SyncRequestId) -> anyhow::Result<()>;

    /// Retrieves a request by id
    async fn get(&self, id: SyncRequestId) -> anyhow::Result<Option<SyncRequest>>;

    /// Queries requests matching `filter`, most recently updated first
    async fn query(&self, filter: &RequestFilter) -> anyhow::Result<Vec<SyncRequest>>;

    /// Number of requests per status tag (`pending`, `done`, `failed`)
    async fn count_by_status(&self) -> anyhow::Result<HashMap<String, u64>>;
}
