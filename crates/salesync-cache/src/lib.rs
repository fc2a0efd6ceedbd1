//! Salesync Cache - SQLite state persistence
//!
//! SQLite-backed storage for:
//! - Mirror records (remote counterparts of local entities)
//! - The de-duplicating sync request queue
//! - Snapshots of the local entities being mirrored
//!
//! ## Architecture
//!
//! This crate implements the `IMirrorStore`, `ISyncRequestQueue` and
//! `ILocalEntitySource` ports from `salesync-core`. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteMirrorStore`] - Mirror records with advisory leases
//! - [`SqliteSyncRequestQueue`] - Pending-key de-duplication via a partial unique index
//! - [`SqliteEntitySource`] - Local entity snapshots
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use salesync_cache::{DatabasePool, SqliteMirrorStore, SqliteSyncRequestQueue};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let db = DatabasePool::new(Path::new("/var/lib/salesync/salesync.db")).await?;
//! let mirrors = SqliteMirrorStore::new(db.pool().clone());
//! let queue = SqliteSyncRequestQueue::new(db.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod entity_source;
pub mod mirror_store;
pub mod pool;
mod rows;
pub mod sync_queue;

pub use entity_source::SqliteEntitySource;
pub use mirror_store::SqliteMirrorStore;
pub use pool::DatabasePool;
pub use sync_queue::SqliteSyncRequestQueue;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The addressed row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The row exists but is not in a state allowing the operation
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A unique key is already taken by another row
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
