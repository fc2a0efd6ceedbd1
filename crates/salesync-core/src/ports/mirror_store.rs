//! Mirror record store port (driven/secondary port)
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific and
//!   don't need domain-level classification.
//! - Uniqueness of the (entity, channel, view) key is the store's
//!   responsibility; callers never check-then-insert.
//! - The advisory lease serializes reconciles of one mirror record across
//!   every process sharing the store.

use std::collections::HashMap;
use std::time::Duration;

use crate::domain::{
    ChannelId, Fingerprint, MirrorId, MirrorKey, MirrorRecord, MirrorStatus, RemoteId,
};

/// Filter criteria for querying mirror records
///
/// All fields are optional; multiple filters are combined with AND logic.
#[derive(Debug, Clone, Default)]
pub struct MirrorFilter {
    pub channel_id: Option<ChannelId>,
    pub status: Option<MirrorStatus>,
    /// Maximum number of rows returned (unbounded when `None`)
    pub limit: Option<u32>,
}

impl MirrorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel_id: ChannelId) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn with_status(mut self, status: MirrorStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Port trait for mirror record persistence
#[async_trait::async_trait]
pub trait IMirrorStore: Send + Sync {
    /// Returns the record for `key`, creating a pending one if none exists
    ///
    /// Concurrent callers with the same key converge on the same row. If the
    /// row disappears between the insert and the read, the read is retried
    /// once before an error is returned.
    async fn get_or_create(&self, key: &MirrorKey) -> anyhow::Result<MirrorRecord>;

    /// Persists the outcome of a push and returns the stored record
    ///
    /// # Arguments
    /// * `record` - The record the push was built from
    /// * `remote_id` - Identifier returned by the channel, if any. Only
    ///   stored when the record has none yet (first writer wins).
    /// * `payload_hash` - Fingerprint of the pushed projection; stored on success only
    /// * `succeeded` - Whether the channel accepted the payload
    /// * `error_detail` - Failure reason, stored when `succeeded` is false
    async fn update_after_push(
        &self,
        record: &MirrorRecord,
        remote_id: Option<&RemoteId>,
        payload_hash: &Fingerprint,
        succeeded: bool,
        error_detail: Option<&str>,
    ) -> anyhow::Result<MirrorRecord>;

    /// Marks a record failed without a push (local data errors, exhausted retries)
    async fn mark_failed(&self, id: MirrorId, error_detail: &str) -> anyhow::Result<()>;

    /// Retrieves a record by id
    async fn get(&self, id: MirrorId) -> anyhow::Result<Option<MirrorRecord>>;

    /// Retrieves a record by key without creating it
    async fn find(&self, key: &MirrorKey) -> anyhow::Result<Option<MirrorRecord>>;

    /// Queries records matching `filter`, most recently updated first
    async fn query(&self, filter: &MirrorFilter) -> anyhow::Result<Vec<MirrorRecord>>;

    /// Deletes a record; returns whether a row was removed
    async fn delete(&self, id: MirrorId) -> anyhow::Result<bool>;

    /// Adopts an existing remote counterpart without pushing
    ///
    /// Creates the record if needed. Returns `false` when the record already
    /// carries a remote id, which is left unchanged.
    async fn link_remote(&self, key: &MirrorKey, remote_id: &RemoteId) -> anyhow::Result<bool>;

    /// Counts records per status; every status is present, possibly as 0
    async fn count_by_status(&self) -> anyhow::Result<HashMap<String, u64>>;

    /// Tries to take the advisory lease on a record
    ///
    /// Succeeds only when the record is unleased or its lease expired. The
    /// lease is not re-entrant: a holder asking again is refused too.
    async fn try_acquire_lease(
        &self,
        id: MirrorId,
        owner: &str,
        ttl: Duration,
    ) -> anyhow::Result<bool>;

    /// Releases a lease held by `owner`; a no-op if someone else holds it
    async fn release_lease(&self, id: MirrorId, owner: &str) -> anyhow::Result<()>;
}
