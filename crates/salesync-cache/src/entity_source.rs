//! SQLite-backed local entity snapshots
//!
//! The back office hands over channel-relevant entity data through
//! [`SqliteEntitySource::save`]; the engine reads it back at reconcile time.

use sqlx::SqlitePool;

use salesync_core::domain::{LocalEntity, LocalEntityId, TenantId};
use salesync_core::ports::ILocalEntitySource;

use crate::rows::{fmt_datetime, local_entity_from_row};
use crate::CacheError;

/// Local entity snapshots stored next to the mirror state
#[derive(Clone)]
pub struct SqliteEntitySource {
    pool: SqlitePool,
}

impl SqliteEntitySource {
    /// Creates a new source with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces an entity snapshot
    pub async fn save(&self, entity: &LocalEntity) -> anyhow::Result<()> {
        let attributes = serde_json::to_string(entity.attributes())
            .map_err(|e| CacheError::SerializationError(format!("attributes: {e}")))?;

        sqlx::query(
            "INSERT INTO local_entities (id, tenant_id, kind, sku, attributes, deleted, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
             tenant_id = excluded.tenant_id, kind = excluded.kind, sku = excluded.sku, \
             attributes = excluded.attributes, deleted = excluded.deleted, \
             updated_at = excluded.updated_at",
        )
        .bind(entity.id().get())
        .bind(entity.tenant_id().get())
        .bind(entity.kind().as_str())
        .bind(entity.sku())
        .bind(&attributes)
        .bind(i64::from(entity.is_deleted()))
        .bind(fmt_datetime(entity.updated_at()))
        .execute(&self.pool)
        .await?;

        tracing::trace!(entity_id = %entity.id(), kind = %entity.kind(), "Saved local entity");
        Ok(())
    }

    /// Removes an entity snapshot; returns whether a row was removed
    pub async fn remove(&self, id: LocalEntityId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM local_entities WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All entities of a tenant, ordered by id
    pub async fn list_by_tenant(&self, tenant_id: TenantId) -> anyhow::Result<Vec<LocalEntity>> {
        let rows = sqlx::query("SELECT * FROM local_entities WHERE tenant_id = ? ORDER BY id")
            .bind(tenant_id.get())
            .fetch_all(&self.pool)
            .await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            entities.push(local_entity_from_row(row)?);
        }
        Ok(entities)
    }
}

#[async_trait::async_trait]
impl ILocalEntitySource for SqliteEntitySource {
    async fn load(&self, id: LocalEntityId) -> anyhow::Result<Option<LocalEntity>> {
        let row = sqlx::query("SELECT * FROM local_entities WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(local_entity_from_row(r)?)),
            None => Ok(None),
        }
    }
}
