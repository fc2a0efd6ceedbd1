//! Reconciliation engine
//!
//! The [`ReconciliationEngine`] brings one mirror triple (local entity,
//! channel, view) in line with the current local state.
//!
//! ## Reconcile Flow
//!
//! 1. **Record**: load or create the mirror record, take its advisory lease
//! 2. **Entity**: re-read the local entity; gone or deleted means remote delete
//! 3. **Fingerprint**: synced with an equal hash means nothing to do
//! 4. **Push**: build the payload, send it, interpret the response
//! 5. **Bookkeeping**: update the mirror record and settle the sync request
//!
//! ## Failure Handling
//!
//! | Channel error      | Mirror record     | Sync request                        |
//! |--------------------|-------------------|-------------------------------------|
//! | `RemoteTransient`  | untouched         | attempts + 1, backoff               |
//! | `Throttled`        | untouched         | attempts + 1, at least `Retry-After` |
//! | either, exhausted  | Failed + detail   | Failed + reason                     |
//! | `RemoteRejected`   | Failed + detail   | Failed + reason                     |
//! | `LocalData`        | Failed + detail   | Failed + reason, no push attempted  |
//!
//! Every reconcile takes the lease under its own token, so two reconciles
//! of one triple never overlap, even inside one engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use salesync_core::config::Config;
use salesync_core::domain::{
    ChannelError, LocalEntity, MirrorKey, MirrorRecord, RemoteId, RetryPolicy, SyncRequest,
};
use salesync_core::ports::{
    AdapterRegistry, IChannelAdapter, ILocalEntitySource, IMirrorStore, ISyncRequestQueue,
};

use crate::SyncError;

/// Default lease lifetime; longer than any single channel call
const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(120);

/// `task_kwargs` flag asking for removal of the remote counterpart
pub const DELETE_FLAG: &str = "delete";

// ============================================================================
// ReconcileOutcome
// ============================================================================

/// What a reconcile did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The payload was accepted; `remote_id` is the stored remote id
    Pushed { remote_id: Option<RemoteId> },
    /// The fingerprint matched the last synced one, no call was made
    Skipped,
    /// The remote counterpart was removed and the mirror record dropped
    Deleted,
    /// Another reconcile holds the lease on this triple
    Busy,
    /// A transient failure; the request stays pending until `retry_at`
    Deferred {
        reason: String,
        attempts: u32,
        retry_at: Option<DateTime<Utc>>,
    },
    /// Rejected, invalid local data, or retries exhausted
    Failed { reason: String },
}

impl ReconcileOutcome {
    /// Short tag for logs and CLI output
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Pushed { .. } => "pushed",
            ReconcileOutcome::Skipped => "skipped",
            ReconcileOutcome::Deleted => "deleted",
            ReconcileOutcome::Busy => "busy",
            ReconcileOutcome::Deferred { .. } => "deferred",
            ReconcileOutcome::Failed { .. } => "failed",
        }
    }
}

// ============================================================================
// ReconciliationEngine
// ============================================================================

/// Reconciles mirror records against their channels
///
/// ## Dependencies
///
/// - `mirrors`: mirror records and their advisory leases
/// - `queue`: sync requests settled by each reconcile
/// - `entities`: current snapshots of the local entities
/// - `adapters`: one channel adapter per configured channel id
pub struct ReconciliationEngine {
    mirrors: Arc<dyn IMirrorStore>,
    queue: Arc<dyn ISyncRequestQueue>,
    entities: Arc<dyn ILocalEntitySource>,
    adapters: AdapterRegistry,
    retry_policy: RetryPolicy,
    /// Prefix of the per-reconcile lease tokens
    lease_owner: String,
    lease_ttl: Duration,
}

impl ReconciliationEngine {
    pub fn new(
        mirrors: Arc<dyn IMirrorStore>,
        queue: Arc<dyn ISyncRequestQueue>,
        entities: Arc<dyn ILocalEntitySource>,
        adapters: AdapterRegistry,
    ) -> Self {
        Self {
            mirrors,
            queue,
            entities,
            adapters,
            retry_policy: RetryPolicy::default(),
            lease_owner: default_lease_owner(),
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }

    /// Applies the `retry` and `worker` sections of the configuration
    pub fn with_config(self, config: &Config) -> Self {
        let owner = config
            .worker
            .worker_id
            .clone()
            .unwrap_or_else(|| self.lease_owner.clone());
        self.with_retry_policy(config.retry.policy())
            .with_lease(owner, config.worker.lease_ttl())
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the lease owner name and lifetime
    pub fn with_lease(mut self, owner: impl Into<String>, ttl: Duration) -> Self {
        self.lease_owner = owner.into();
        self.lease_ttl = ttl;
        self
    }

    pub fn lease_owner(&self) -> &str {
        &self.lease_owner
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Runs the reconcile a dequeued request asks for
    ///
    /// A request whose mirror record no longer exists has nothing left to
    /// synchronize and is marked done.
    pub async fn process(&self, request: &SyncRequest) -> Result<ReconcileOutcome, SyncError> {
        let mirror_id = request.key().remote_product_id;
        let Some(record) = self.mirrors.get(mirror_id).await? else {
            warn!(
                request_id = %request.id(),
                mirror_id = %mirror_id,
                "Mirror record of sync request no longer exists, closing request"
            );
            self.queue.mark_done(request.id()).await?;
            return Ok(ReconcileOutcome::Skipped);
        };
        self.reconcile(record.key(), Some(request)).await
    }

    /// Reconciles one (entity, channel, view) triple
    ///
    /// `request` is the sync request being executed, if any; it is settled
    /// according to the outcome. Without a request, transient failures are
    /// reported but no retry is scheduled.
    ///
    /// # Errors
    /// [`SyncError::UnknownChannel`] when no adapter serves the channel (the
    /// request is marked failed first), [`SyncError::Storage`] when
    /// persistence fails.
    #[tracing::instrument(level = "debug", skip(self, request), fields(key = %key))]
    pub async fn reconcile(
        &self,
        key: &MirrorKey,
        request: Option<&SyncRequest>,
    ) -> Result<ReconcileOutcome, SyncError> {
        let Some(adapter) = self.adapters.get(key.channel_id) else {
            if let Some(request) = request {
                let reason = format!("no adapter configured for channel {}", key.channel_id);
                self.queue.mark_failed(request.id(), &reason).await?;
            }
            return Err(SyncError::UnknownChannel(key.channel_id));
        };

        let record = self.mirrors.get_or_create(key).await?;
        let lease = self.lease_token();
        let acquired = self
            .mirrors
            .try_acquire_lease(record.id(), &lease, self.lease_ttl)
            .await?;
        if !acquired {
            debug!(mirror_id = %record.id(), "Mirror record is leased by another reconcile");
            return Ok(ReconcileOutcome::Busy);
        }

        let result = self.reconcile_leased(adapter.as_ref(), &record, request).await;

        if let Err(e) = self.mirrors.release_lease(record.id(), &lease).await {
            warn!(mirror_id = %record.id(), error = %e, "Failed to release mirror lease");
        }
        result
    }

    async fn reconcile_leased(
        &self,
        adapter: &dyn IChannelAdapter,
        leased: &MirrorRecord,
        request: Option<&SyncRequest>,
    ) -> Result<ReconcileOutcome, SyncError> {
        // The row may have changed between get_or_create and the lease.
        let Some(record) = self.mirrors.get(leased.id()).await? else {
            debug!(mirror_id = %leased.id(), "Mirror record removed concurrently");
            self.settle_done(request).await?;
            return Ok(ReconcileOutcome::Skipped);
        };

        let entity = self.entities.load(record.key().local_entity_id).await?;
        let entity = match entity {
            Some(entity) if !entity.is_deleted() && !delete_requested(request) => entity,
            _ => return self.remove_remote(adapter, &record, request).await,
        };

        self.push_entity(adapter, &record, &entity, request).await
    }

    async fn push_entity(
        &self,
        adapter: &dyn IChannelAdapter,
        record: &MirrorRecord,
        entity: &LocalEntity,
        request: Option<&SyncRequest>,
    ) -> Result<ReconcileOutcome, SyncError> {
        let fingerprint = match adapter.compute_fingerprint(entity) {
            Ok(fingerprint) => fingerprint,
            Err(err) => return self.handle_channel_error(record, request, err).await,
        };

        if record.is_up_to_date(&fingerprint) {
            debug!(
                mirror_id = %record.id(),
                fingerprint = fingerprint.short(),
                "Projection unchanged, skipping push"
            );
            self.settle_done(request).await?;
            return Ok(ReconcileOutcome::Skipped);
        }

        let payload = match adapter.build_payload(entity, record) {
            Ok(payload) => payload,
            Err(err) => return self.handle_channel_error(record, request, err).await,
        };
        let response = match adapter.push(&payload).await {
            Ok(response) => response,
            Err(err) => return self.handle_channel_error(record, request, err).await,
        };
        let outcome = adapter.parse_response(&response);

        if outcome.succeeded {
            let stored = self
                .mirrors
                .update_after_push(record, outcome.remote_id.as_ref(), &fingerprint, true, None)
                .await?;
            self.settle_done(request).await?;
            info!(
                mirror_id = %stored.id(),
                channel = %adapter.channel_type(),
                operation = ?payload.operation,
                remote_id = stored.remote_id().map(RemoteId::as_str),
                "Mirror record synced"
            );
            return Ok(ReconcileOutcome::Pushed {
                remote_id: stored.remote_id().cloned(),
            });
        }

        let reason = outcome
            .error_detail
            .unwrap_or_else(|| "channel reported an unsuccessful push".to_string());
        self.mirrors
            .update_after_push(record, None, &fingerprint, false, Some(&reason))
            .await?;
        self.settle_failed(request, &reason).await?;
        warn!(
            mirror_id = %record.id(),
            channel = %adapter.channel_type(),
            reason = %reason,
            "Channel refused payload"
        );
        Ok(ReconcileOutcome::Failed { reason })
    }

    async fn remove_remote(
        &self,
        adapter: &dyn IChannelAdapter,
        record: &MirrorRecord,
        request: Option<&SyncRequest>,
    ) -> Result<ReconcileOutcome, SyncError> {
        if let Err(err) = adapter.delete(record).await {
            return self.handle_channel_error(record, request, err).await;
        }
        self.mirrors.delete(record.id()).await?;
        self.settle_done(request).await?;
        info!(
            mirror_id = %record.id(),
            channel = %adapter.channel_type(),
            remote_id = record.remote_id().map(RemoteId::as_str),
            "Remote counterpart removed"
        );
        Ok(ReconcileOutcome::Deleted)
    }

    async fn handle_channel_error(
        &self,
        record: &MirrorRecord,
        request: Option<&SyncRequest>,
        err: ChannelError,
    ) -> Result<ReconcileOutcome, SyncError> {
        if err.is_transient() {
            return self.defer(record, request, &err).await;
        }

        let reason = err.to_string();
        self.mirrors.mark_failed(record.id(), &reason).await?;
        self.settle_failed(request, &reason).await?;
        warn!(
            mirror_id = %record.id(),
            code = err.code(),
            reason = %reason,
            "Reconcile failed"
        );
        Ok(ReconcileOutcome::Failed { reason })
    }

    /// Counts a transient failure against the request's retry budget
    ///
    /// The next attempt waits for the backoff delay or the channel's
    /// `Retry-After`, whichever is longer. Once the budget is spent the
    /// mirror record and the request both fail.
    async fn defer(
        &self,
        record: &MirrorRecord,
        request: Option<&SyncRequest>,
        err: &ChannelError,
    ) -> Result<ReconcileOutcome, SyncError> {
        let detail = err.detail();
        let Some(request) = request else {
            warn!(reason = %detail, "Transient channel failure, no request to retry");
            return Ok(ReconcileOutcome::Deferred {
                reason: detail.to_string(),
                attempts: 0,
                retry_at: None,
            });
        };

        let backoff = self.retry_policy.next_delay(request.attempts() + 1);
        let delay = err.retry_after().map_or(backoff, |wait| wait.max(backoff));
        let retry_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let attempts = self
            .queue
            .record_transient_failure(request.id(), detail, retry_at)
            .await?;

        if self.retry_policy.is_exhausted(attempts) {
            let exhausted = ChannelError::TransientExhausted {
                attempts,
                last: detail.to_string(),
            };
            let reason = exhausted.to_string();
            self.mirrors.mark_failed(record.id(), &reason).await?;
            self.queue.mark_failed(request.id(), &reason).await?;
            warn!(
                request_id = %request.id(),
                mirror_id = %record.id(),
                attempts,
                code = exhausted.code(),
                reason = %detail,
                "Retry budget exhausted"
            );
            return Ok(ReconcileOutcome::Failed { reason });
        }

        info!(
            request_id = %request.id(),
            attempts,
            retry_in_ms = delay.as_millis() as u64,
            reason = %detail,
            "Transient channel failure, retry scheduled"
        );
        Ok(ReconcileOutcome::Deferred {
            reason: detail.to_string(),
            attempts,
            retry_at: Some(retry_at),
        })
    }

    /// Lease token unique to one reconcile
    fn lease_token(&self) -> String {
        format!("{}:{}", self.lease_owner, uuid::Uuid::new_v4().simple())
    }

    async fn settle_done(&self, request: Option<&SyncRequest>) -> Result<(), SyncError> {
        if let Some(request) = request {
            self.queue.mark_done(request.id()).await?;
        }
        Ok(())
    }

    async fn settle_failed(
        &self,
        request: Option<&SyncRequest>,
        reason: &str,
    ) -> Result<(), SyncError> {
        if let Some(request) = request {
            self.queue.mark_failed(request.id(), reason).await?;
        }
        Ok(())
    }
}

fn delete_requested(request: Option<&SyncRequest>) -> bool {
    request
        .and_then(|r| r.task_kwargs().get(DELETE_FLAG))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Lease owner name unique to this process
pub fn default_lease_owner() -> String {
    format!(
        "salesync-{}-{}",
        std::process::id(),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesync_core::domain::{MirrorId, SyncRequestId, SyncRequestKey, SyncType};
    use serde_json::json;

    fn request(kwargs: Value) -> SyncRequest {
        SyncRequest::new(
            SyncRequestId::new(1).unwrap(),
            SyncRequestKey::new(MirrorId::new(1).unwrap(), SyncType::Product, None),
            kwargs,
        )
    }

    #[test]
    fn test_delete_flag() {
        assert!(!delete_requested(None));
        assert!(!delete_requested(Some(&request(json!({})))));
        assert!(!delete_requested(Some(&request(json!({"delete": false})))));
        assert!(delete_requested(Some(&request(json!({"delete": true})))));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(ReconcileOutcome::Skipped.label(), "skipped");
        assert_eq!(
            ReconcileOutcome::Pushed { remote_id: None }.label(),
            "pushed"
        );
        assert_eq!(
            ReconcileOutcome::Failed {
                reason: "x".into()
            }
            .label(),
            "failed"
        );
    }

    #[test]
    fn test_default_lease_owner_is_unique() {
        let a = default_lease_owner();
        let b = default_lease_owner();
        assert!(a.starts_with("salesync-"));
        assert_ne!(a, b);
    }
}
