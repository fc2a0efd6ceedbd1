//! SQLite implementation of ISyncRequestQueue
//!
//! A partial unique index over `(remote_product_id, sync_type, view_id)
//! WHERE status = 'pending'` guarantees at most one pending row per key.
//! Done and failed rows are kept as history and do not block new work.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use salesync_core::domain::{RequestStatus, SyncRequest, SyncRequestId, SyncRequestKey};
use salesync_core::ports::{Enqueued, ISyncRequestQueue, RequestFilter};

use crate::rows::{fmt_datetime, sync_request_from_row};
use crate::CacheError;

/// SQLite-based de-duplicating sync request queue
#[derive(Clone)]
pub struct SqliteSyncRequestQueue {
    pool: SqlitePool,
}

impl SqliteSyncRequestQueue {
    /// Creates a new queue with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn to_id(raw: i64) -> Result<SyncRequestId, CacheError> {
        SyncRequestId::new(raw).map_err(|e| CacheError::SerializationError(e.to_string()))
    }

    /// Builds the error for a conditional update that matched no row
    async fn transition_error(
        &self,
        id: SyncRequestId,
        target: RequestStatus,
    ) -> anyhow::Result<CacheError> {
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM sync_requests WHERE id = ?")
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(match current {
            Some(status) => CacheError::InvalidTransition(format!(
                "sync request {id} is {status}, cannot become {target}"
            )),
            None => CacheError::NotFound(format!("sync request {id}")),
        })
    }

    /// Applies a status change guarded by the expected current status
    async fn transition(
        &self,
        id: SyncRequestId,
        from: RequestStatus,
        to: RequestStatus,
        error_detail: Option<&str>,
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE sync_requests SET status = ?, error_detail = ?, next_attempt_at = NULL, \
             updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(error_detail)
        .bind(fmt_datetime(Utc::now()))
        .bind(id.get())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(id, to).await?.into());
        }
        tracing::debug!(request_id = %id, from = %from, to = %to, "Sync request transition");
        Ok(())
    }
}

// ============================================================================
// ISyncRequestQueue implementation
// ============================================================================

#[async_trait::async_trait]
impl ISyncRequestQueue for SqliteSyncRequestQueue {
    #[tracing::instrument(skip(self, key, task_kwargs), fields(key = %key))]
    async fn enqueue(&self, key: &SyncRequestKey, task_kwargs: Value) -> anyhow::Result<Enqueued> {
        let kwargs = serde_json::to_string(&task_kwargs)
            .map_err(|e| CacheError::SerializationError(format!("task_kwargs: {e}")))?;

        // The pending row we collide with may complete between the two
        // statements; a second pass then inserts a fresh row.
        for _ in 0..2 {
            let now = fmt_datetime(Utc::now());
            let mut tx = self.pool.begin().await?;

            let inserted: Option<i64> = sqlx::query_scalar(
                "INSERT INTO sync_requests \
                 (remote_product_id, sync_type, view_id, task_kwargs, status, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, 'pending', ?, ?) \
                 ON CONFLICT DO NOTHING RETURNING id",
            )
            .bind(key.remote_product_id.get())
            .bind(key.sync_type.as_str())
            .bind(key.view_storage_value())
            .bind(&kwargs)
            .bind(&now)
            .bind(&now)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(id) = inserted {
                tx.commit().await?;
                let id = Self::to_id(id)?;
                tracing::debug!(request_id = %id, "Enqueued sync request");
                return Ok(Enqueued { id, created: true });
            }

            let collapsed: Option<i64> = sqlx::query_scalar(
                "UPDATE sync_requests SET task_kwargs = ?, updated_at = ? \
                 WHERE remote_product_id = ? AND sync_type = ? AND view_id = ? \
                 AND status = 'pending' RETURNING id",
            )
            .bind(&kwargs)
            .bind(&now)
            .bind(key.remote_product_id.get())
            .bind(key.sync_type.as_str())
            .bind(key.view_storage_value())
            .fetch_optional(&mut *tx)
            .await?;

            tx.commit().await?;

            if let Some(id) = collapsed {
                let id = Self::to_id(id)?;
                tracing::debug!(request_id = %id, "Collapsed into pending sync request");
                return Ok(Enqueued { id, created: false });
            }
        }

        Err(CacheError::Conflict(format!("could not enqueue sync request for {key}")).into())
    }

    async fn dequeue_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<SyncRequest>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_requests \
             WHERE status = 'pending' AND (next_attempt_at IS NULL OR next_attempt_at <= ?) \
             ORDER BY created_at ASC, id ASC LIMIT ?",
        )
        .bind(fmt_datetime(now))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            requests.push(sync_request_from_row(row)?);
        }
        Ok(requests)
    }

    async fn mark_done(&self, id: SyncRequestId) -> anyhow::Result<()> {
        self.transition(id, RequestStatus::Pending, RequestStatus::Done, None)
            .await
    }

    async fn mark_failed(&self, id: SyncRequestId, reason: &str) -> anyhow::Result<()> {
        self.transition(id, RequestStatus::Pending, RequestStatus::Failed, Some(reason))
            .await?;
        tracing::warn!(request_id = %id, reason, "Sync request failed");
        Ok(())
    }

    async fn record_transient_failure(
        &self,
        id: SyncRequestId,
        reason: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> anyhow::Result<u32> {
        let attempts: Option<i64> = sqlx::query_scalar(
            "UPDATE sync_requests SET attempts = attempts + 1, error_detail = ?, \
             next_attempt_at = ?, updated_at = ? \
             WHERE id = ? AND status = 'pending' RETURNING attempts",
        )
        .bind(reason)
        .bind(fmt_datetime(next_attempt_at))
        .bind(fmt_datetime(Utc::now()))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        match attempts {
            Some(n) => Ok(u32::try_from(n).unwrap_or(u32::MAX)),
            None => Err(self
                .transition_error(id, RequestStatus::Pending)
                .await?
                .into()),
        }
    }

    async fn retry(&self, id: SyncRequestId) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE sync_requests SET status = 'pending', attempts = 0, next_attempt_at = NULL, \
             updated_at = ? WHERE id = ? AND status = 'failed'",
        )
        .bind(fmt_datetime(Utc::now()))
        .bind(id.get())
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(CacheError::Conflict(format!(
                    "another request for the key of sync request {id} is already pending"
                ))
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        if result.rows_affected() == 0 {
            return Err(self
                .transition_error(id, RequestStatus::Pending)
                .await?
                .into());
        }
        tracing::info!(request_id = %id, "Sync request re-queued");
        Ok(())
    }

    async fn get(&self, id: SyncRequestId) -> anyhow::Result<Option<SyncRequest>> {
        let row = sqlx::query("SELECT * FROM sync_requests WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(sync_request_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn query(&self, filter: &RequestFilter) -> anyhow::Result<Vec<SyncRequest>> {
        let mut sql = String::from("SELECT * FROM sync_requests WHERE 1=1");
        let mut binds: Vec<&str> = Vec::new();

        if let Some(ref status) = filter.status {
            sql.push_str(" AND status = ?");
            binds.push(status.as_str());
        }
        if let Some(ref sync_type) = filter.sync_type {
            sql.push_str(" AND sync_type = ?");
            binds.push(sync_type.as_str());
        }
        sql.push_str(" ORDER BY updated_at DESC, id DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(*bind);
        }
        if let Some(limit) = filter.limit {
            query = query.bind(i64::from(limit));
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            requests.push(sync_request_from_row(row)?);
        }
        Ok(requests)
    }

    async fn count_by_status(&self) -> anyhow::Result<HashMap<String, u64>> {
        let rows =
            sqlx::query("SELECT status, COUNT(*) as count FROM sync_requests GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts: HashMap<String, u64> = [
            RequestStatus::Pending,
            RequestStatus::Done,
            RequestStatus::Failed,
        ]
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
}
