//! Inbound mutation signals
//!
//! Business flows outside the engine announce local mutations as
//! [`SyncSignal`]s. The [`SignalDispatcher`] turns each signal into a
//! de-duplicated sync request; the [`SignalBus`] decouples emitters from
//! the dispatcher through a bounded channel.
//!
//! ## Flow
//!
//! ```text
//! emitter ──→ SignalBus ──→ mpsc::Receiver ──→ SignalDispatcher ──→ queue.enqueue
//!                                                    │
//!                                          mirrors.get_or_create
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use salesync_core::domain::{
    ChannelId, DomainError, LocalEntityId, MirrorKey, SyncRequestKey, SyncType, ViewId,
};
use salesync_core::ports::{Enqueued, IMirrorStore, ISyncRequestQueue};

use crate::engine::DELETE_FLAG;
use crate::SyncError;

// ============================================================================
// SignalKind
// ============================================================================

/// The local mutation a signal announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    UpdateRemoteProduct,
    CreateRemoteProductProperty,
    UpdateRemoteProductProperty,
    UpdateRemotePrice,
    UpdateRemoteContent,
    UpdateRemoteImages,
    UpdateRemoteEanCode,
    DeleteRemoteProduct,
}

impl SignalKind {
    pub const ALL: [SignalKind; 8] = [
        SignalKind::UpdateRemoteProduct,
        SignalKind::CreateRemoteProductProperty,
        SignalKind::UpdateRemoteProductProperty,
        SignalKind::UpdateRemotePrice,
        SignalKind::UpdateRemoteContent,
        SignalKind::UpdateRemoteImages,
        SignalKind::UpdateRemoteEanCode,
        SignalKind::DeleteRemoteProduct,
    ];

    /// Sync type of the request this signal enqueues
    pub fn sync_type(&self) -> SyncType {
        match self {
            SignalKind::UpdateRemoteProduct | SignalKind::DeleteRemoteProduct => SyncType::Product,
            SignalKind::CreateRemoteProductProperty | SignalKind::UpdateRemoteProductProperty => {
                SyncType::Property
            }
            SignalKind::UpdateRemotePrice => SyncType::Price,
            SignalKind::UpdateRemoteContent => SyncType::Content,
            SignalKind::UpdateRemoteImages => SyncType::Images,
            SignalKind::UpdateRemoteEanCode => SyncType::EanCode,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::UpdateRemoteProduct => "update_remote_product",
            SignalKind::CreateRemoteProductProperty => "create_remote_product_property",
            SignalKind::UpdateRemoteProductProperty => "update_remote_product_property",
            SignalKind::UpdateRemotePrice => "update_remote_price",
            SignalKind::UpdateRemoteContent => "update_remote_content",
            SignalKind::UpdateRemoteImages => "update_remote_images",
            SignalKind::UpdateRemoteEanCode => "update_remote_ean_code",
            SignalKind::DeleteRemoteProduct => "delete_remote_product",
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, SignalKind::DeleteRemoteProduct)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        SignalKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or(DomainError::UnknownVariant {
                kind: "signal",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// SyncSignal
// ============================================================================

/// A local mutation that must reach one channel view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSignal {
    pub kind: SignalKind,
    pub local_entity_id: LocalEntityId,
    pub channel_id: ChannelId,
    /// `None` addresses the channel's default view
    pub view_id: Option<ViewId>,
    /// Opaque arguments stored on the sync request
    #[serde(default)]
    pub task_kwargs: Value,
}

impl SyncSignal {
    pub fn new(kind: SignalKind, local_entity_id: LocalEntityId, channel_id: ChannelId) -> Self {
        Self {
            kind,
            local_entity_id,
            channel_id,
            view_id: None,
            task_kwargs: json!({}),
        }
    }

    pub fn with_view(mut self, view_id: ViewId) -> Self {
        self.view_id = Some(view_id);
        self
    }

    pub fn with_kwargs(mut self, task_kwargs: Value) -> Self {
        self.task_kwargs = task_kwargs;
        self
    }

    pub fn mirror_key(&self) -> MirrorKey {
        MirrorKey::new(self.local_entity_id, self.channel_id, self.view_id)
    }

    /// Arguments stored on the request; delete signals carry the delete flag
    fn request_kwargs(&self) -> Value {
        let mut kwargs = match &self.task_kwargs {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("args".to_string(), other.clone());
                map
            }
        };
        if self.kind.is_delete() {
            kwargs.insert(DELETE_FLAG.to_string(), Value::Bool(true));
        }
        Value::Object(kwargs)
    }
}

// ============================================================================
// SignalDispatcher
// ============================================================================

/// Turns signals into sync requests
#[derive(Clone)]
pub struct SignalDispatcher {
    mirrors: Arc<dyn IMirrorStore>,
    queue: Arc<dyn ISyncRequestQueue>,
}

impl SignalDispatcher {
    pub fn new(mirrors: Arc<dyn IMirrorStore>, queue: Arc<dyn ISyncRequestQueue>) -> Self {
        Self { mirrors, queue }
    }

    /// Ensures the mirror record exists and enqueues the signal's work
    ///
    /// Repeated signals for the same record, sync type and view collapse
    /// into one pending request holding the latest arguments.
    pub async fn dispatch(&self, signal: &SyncSignal) -> Result<Enqueued, SyncError> {
        let record = self.mirrors.get_or_create(&signal.mirror_key()).await?;
        let key = SyncRequestKey::new(record.id(), signal.kind.sync_type(), signal.view_id);
        let enqueued = self.queue.enqueue(&key, signal.request_kwargs()).await?;

        debug!(
            signal = %signal.kind,
            mirror_id = %record.id(),
            request_id = %enqueued.id,
            created = enqueued.created,
            "Signal dispatched"
        );
        Ok(enqueued)
    }

    /// Dispatches signals from `rx` until it closes or `cancel` fires
    ///
    /// A failed dispatch is logged and the loop continues.
    pub async fn run(&self, mut rx: mpsc::Receiver<SyncSignal>, cancel: CancellationToken) {
        info!("Signal dispatcher starting");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Signal dispatcher cancelled");
                    break;
                }
                signal = rx.recv() => {
                    match signal {
                        Some(signal) => {
                            if let Err(e) = self.dispatch(&signal).await {
                                warn!(
                                    signal = %signal.kind,
                                    entity = %signal.local_entity_id,
                                    channel = %signal.channel_id,
                                    error = %e,
                                    "Failed to dispatch signal"
                                );
                            }
                        }
                        None => {
                            info!("Signal bus closed, dispatcher shutting down");
                            break;
                        }
                    }
                }
            }
        }

        // Signals already buffered are still persisted.
        rx.close();
        while let Ok(signal) = rx.try_recv() {
            if let Err(e) = self.dispatch(&signal).await {
                warn!(signal = %signal.kind, error = %e, "Failed to dispatch buffered signal");
            }
        }

        info!("Signal dispatcher stopped");
    }
}

// ============================================================================
// SignalBus
// ============================================================================

/// Sending side of the signal channel
#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: mpsc::Sender<SyncSignal>,
}

impl SignalBus {
    /// Creates a bus buffering up to `capacity` signals
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SyncSignal>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Emits a signal, waiting while the buffer is full
    pub async fn emit(&self, signal: SyncSignal) -> Result<(), SyncError> {
        self.tx.send(signal).await.map_err(|_| SyncError::BusClosed)
    }
}
