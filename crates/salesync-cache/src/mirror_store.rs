//! SQLite implementation of IMirrorStore
//!
//! The `UNIQUE (local_entity_id, channel_id, view_id)` constraint is the
//! de-duplication anchor: creation is an `INSERT … ON CONFLICT DO NOTHING`
//! followed by a read, so racing creators always converge on one row.
//!
//! Status changes go through the [`MirrorRecord`] state machine: the row is
//! loaded, the transition applied, and the result written back.
//!
//! The advisory lease lives on the row itself (`lease_owner`,
//! `lease_expires_at`) and is taken with a conditional `UPDATE`, which makes
//! it visible to every process sharing the database file.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use salesync_core::domain::{
    DomainError, Fingerprint, MirrorId, MirrorKey, MirrorRecord, MirrorStatus, RemoteId,
};
use salesync_core::ports::{IMirrorStore, MirrorFilter};

use crate::rows::{fmt_datetime, mirror_record_from_row};
use crate::CacheError;

/// SQLite-based mirror record store
#[derive(Clone)]
pub struct SqliteMirrorStore {
    pool: SqlitePool,
}

impl SqliteMirrorStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_if_absent(&self, key: &MirrorKey) -> Result<bool, CacheError> {
        let now = fmt_datetime(Utc::now());
        let result = sqlx::query(
            "INSERT INTO mirror_records \
             (local_entity_id, channel_id, view_id, status, created_at, updated_at) \
             VALUES (?, ?, ?, 'pending', ?, ?) \
             ON CONFLICT (local_entity_id, channel_id, view_id) DO NOTHING",
        )
        .bind(key.local_entity_id.get())
        .bind(key.channel_id.get())
        .bind(key.view_storage_value())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn load(&self, id: MirrorId) -> Result<MirrorRecord, CacheError> {
        let row = sqlx::query("SELECT * FROM mirror_records WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CacheError::NotFound(format!("mirror record {id}")))?;
        mirror_record_from_row(&row)
    }

    /// Writes the state fields of `record`; an already stored remote id wins
    async fn persist(&self, record: &MirrorRecord) -> Result<MirrorRecord, CacheError> {
        let row = sqlx::query(
            "UPDATE mirror_records SET \
             remote_id = COALESCE(remote_id, ?), \
             status = ?, \
             last_synced_hash = ?, \
             error_detail = ?, \
             updated_at = ? \
             WHERE id = ? RETURNING *",
        )
        .bind(record.remote_id().map(RemoteId::as_str))
        .bind(record.status().as_str())
        .bind(record.last_synced_hash().map(Fingerprint::as_str))
        .bind(record.error_detail())
        .bind(fmt_datetime(record.updated_at()))
        .bind(record.id().get())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CacheError::NotFound(format!("mirror record {}", record.id())))?;
        mirror_record_from_row(&row)
    }

    async fn find_row(&self, key: &MirrorKey) -> Result<Option<MirrorRecord>, CacheError> {
        let row = sqlx::query(
            "SELECT * FROM mirror_records \
             WHERE local_entity_id = ? AND channel_id = ? AND view_id = ?",
        )
        .bind(key.local_entity_id.get())
        .bind(key.channel_id.get())
        .bind(key.view_storage_value())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(mirror_record_from_row).transpose()
    }
}

fn invalid_transition(e: DomainError) -> CacheError {
    CacheError::InvalidTransition(e.to_string())
}

// ============================================================================
// IMirrorStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IMirrorStore for SqliteMirrorStore {
    #[tracing::instrument(skip(self, key), fields(key = %key))]
    async fn get_or_create(&self, key: &MirrorKey) -> anyhow::Result<MirrorRecord> {
        // A second pass covers a row deleted between our insert and our read.
        for attempt in 0..2 {
            let created = self.insert_if_absent(key).await?;
            if let Some(record) = self.find_row(key).await? {
                if created {
                    tracing::debug!(mirror_id = %record.id(), "Created mirror record");
                }
                return Ok(record);
            }
            tracing::warn!(attempt, "Mirror record vanished after insert, retrying read");
        }

        Err(CacheError::NotFound(format!("mirror record for key {key} after create")).into())
    }

    async fn update_after_push(
        &self,
        record: &MirrorRecord,
        remote_id: Option<&RemoteId>,
        payload_hash: &Fingerprint,
        succeeded: bool,
        error_detail: Option<&str>,
    ) -> anyhow::Result<MirrorRecord> {
        let mut current = self.load(record.id()).await?;
        if succeeded {
            current
                .record_push_success(remote_id.cloned(), payload_hash.clone())
                .map_err(invalid_transition)?;
        } else {
            current
                .record_push_failure(error_detail.unwrap_or("push failed without detail"))
                .map_err(invalid_transition)?;
        }
        let updated = self.persist(&current).await?;

        tracing::debug!(
            mirror_id = %updated.id(),
            status = %updated.status(),
            hash = payload_hash.short(),
            "Recorded push outcome"
        );
        Ok(updated)
    }

    async fn mark_failed(&self, id: MirrorId, error_detail: &str) -> anyhow::Result<()> {
        let mut current = self.load(id).await?;
        current
            .record_push_failure(error_detail)
            .map_err(invalid_transition)?;
        self.persist(&current).await?;
        Ok(())
    }

    async fn get(&self, id: MirrorId) -> anyhow::Result<Option<MirrorRecord>> {
        let row = sqlx::query("SELECT * FROM mirror_records WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(mirror_record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn find(&self, key: &MirrorKey) -> anyhow::Result<Option<MirrorRecord>> {
        Ok(self.find_row(key).await?)
    }

    async fn query(&self, filter: &MirrorFilter) -> anyhow::Result<Vec<MirrorRecord>> {
        let mut sql = String::from("SELECT * FROM mirror_records WHERE 1=1");

        if filter.channel_id.is_some() {
            sql.push_str(" AND channel_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY updated_at DESC, id DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(channel_id) = filter.channel_id {
            query = query.bind(channel_id.get());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(i64::from(limit));
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(mirror_record_from_row(row)?);
        }
        Ok(records)
    }

    async fn delete(&self, id: MirrorId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM mirror_records WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await?;

        tracing::trace!(mirror_id = %id, "Deleted mirror record");
        Ok(result.rows_affected() > 0)
    }

    async fn link_remote(&self, key: &MirrorKey, remote_id: &RemoteId) -> anyhow::Result<bool> {
        let mut record = self.get_or_create(key).await?;
        if !record.link_remote(remote_id.clone()) {
            tracing::debug!(mirror_id = %record.id(), "Record already linked");
            return Ok(false);
        }

        // Guarded so a concurrent first push keeps its id
        let result = sqlx::query(
            "UPDATE mirror_records SET remote_id = ?, updated_at = ? \
             WHERE id = ? AND remote_id IS NULL",
        )
        .bind(remote_id.as_str())
        .bind(fmt_datetime(record.updated_at()))
        .bind(record.id().get())
        .execute(&self.pool)
        .await?;

        let linked = result.rows_affected() == 1;
        tracing::debug!(mirror_id = %record.id(), remote_id = %remote_id, linked, "Link remote");
        Ok(linked)
    }

    async fn count_by_status(&self) -> anyhow::Result<HashMap<String, u64>> {
        let rows =
            sqlx::query("SELECT status, COUNT(*) as count FROM mirror_records GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts: HashMap<String, u64> = MirrorStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();

        for row in &rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            counts.insert(status, count.max(0) as u64);
        }

        Ok(counts)
    }

    async fn try_acquire_lease(
        &self,
        id: MirrorId,
        owner: &str,
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::SerializationError(format!("lease ttl: {e}")))?;
        let expires_at = fmt_datetime(now + ttl);
        let now = fmt_datetime(now);

        let result = sqlx::query(
            "UPDATE mirror_records SET lease_owner = ?, lease_expires_at = ? \
             WHERE id = ? AND (lease_owner IS NULL OR lease_expires_at <= ?)",
        )
        .bind(owner)
        .bind(&expires_at)
        .bind(id.get())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let acquired = result.rows_affected() == 1;
        tracing::trace!(mirror_id = %id, owner, acquired, "Lease attempt");
        Ok(acquired)
    }

    async fn release_lease(&self, id: MirrorId, owner: &str) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE mirror_records SET lease_owner = NULL, lease_expires_at = NULL \
             WHERE id = ? AND lease_owner = ?",
        )
        .bind(id.get())
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
