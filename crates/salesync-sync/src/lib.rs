//! Salesync Sync - reconciliation of local entities with marketplace mirrors
//!
//! Provides:
//! - Fingerprint based reconciliation (push only when the projection changed)
//! - Bounded exponential retry of transient channel failures
//! - Inbound mutation signals collapsed into the de-duplicating queue
//! - A polling worker with bounded parallelism
//!
//! ## Modules
//!
//! - [`engine`] - `ReconciliationEngine`, one reconcile per mirror triple
//! - [`signals`] - Mutation signals, their dispatcher and an mpsc event bus
//! - [`worker`] - Queue polling loop with graceful shutdown

pub mod engine;
pub mod signals;
pub mod worker;

pub use engine::{ReconcileOutcome, ReconciliationEngine};
pub use signals::{SignalBus, SignalDispatcher, SignalKind, SyncSignal};
pub use worker::{BatchSummary, SyncWorker};

use salesync_core::domain::{ChannelId, DomainError};
use thiserror::Error;

/// Errors that abort a reconcile without a recorded outcome
///
/// Channel failures are not errors at this level: they are recorded on the
/// mirror record and the sync request and reported as a [`ReconcileOutcome`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// No adapter is registered for the channel of a mirror key
    #[error("No adapter configured for channel {0}")]
    UnknownChannel(ChannelId),

    /// The mirror store, the queue or the entity source failed
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    /// A domain-level error propagated from salesync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),

    /// The signal bus receiver was dropped
    #[error("Signal bus closed")]
    BusClosed,
}
