//! Local entity source port
//!
//! The engine re-reads the local entity at execution time so a push always
//! reflects the current local state, not the state at enqueue time.

use crate::domain::{LocalEntity, LocalEntityId};

/// Read access to the local entities being mirrored
#[async_trait::async_trait]
pub trait ILocalEntitySource: Send + Sync {
    /// Loads the current snapshot of an entity, `None` if it no longer exists
    async fn load(&self, id: LocalEntityId) -> anyhow::Result<Option<LocalEntity>>;
}
