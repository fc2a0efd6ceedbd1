//! Channel adapter port (driven/secondary port)
//!
//! One implementation exists per [`ChannelType`]. Adapters are selected by
//! the configured channel id through an [`AdapterRegistry`], never by type
//! hierarchy.
//!
//! ## Contract
//!
//! - `build_payload`, `parse_response` and `compute_fingerprint` are pure.
//! - `push` and `delete` perform the remote write (preceded by a read only
//!   where the marketplace requires a concurrency token) and classify
//!   failures into the [`ChannelError`] taxonomy.
//! - Missing local data is reported as [`ChannelError::LocalData`] before
//!   any network call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    ChannelError, ChannelId, ChannelType, Fingerprint, LocalEntity, MirrorRecord, RemoteId,
};

// ============================================================================
// Payload
// ============================================================================

/// HTTP method of a channel request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a payload creates the remote counterpart or updates it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadOperation {
    Create,
    Update,
}

/// A fully built channel request, ready to be sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub channel: ChannelType,
    pub operation: PayloadOperation,
    pub method: HttpMethod,
    /// Path relative to the channel base URL, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Identifier known before the call (e.g. a SKU used as remote key);
    /// echoed into the [`RemoteResponse`] for channels that return no id
    pub remote_key: Option<String>,
}

impl Payload {
    pub fn new(
        channel: ChannelType,
        operation: PayloadOperation,
        method: HttpMethod,
        path: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            operation,
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            remote_key: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_remote_key(mut self, key: impl Into<String>) -> Self {
        self.remote_key = Some(key.into());
        self
    }

    pub fn is_create(&self) -> bool {
        self.operation == PayloadOperation::Create
    }
}

/// Raw answer of a channel to a successful (2xx) call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    pub status: u16,
    /// Parsed JSON body; `Value::Null` for empty bodies
    pub body: Value,
    /// Copy of [`Payload::remote_key`]
    pub remote_key: Option<String>,
}

impl RemoteResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            remote_key: None,
        }
    }

    pub fn with_remote_key(mut self, key: Option<String>) -> Self {
        self.remote_key = key;
        self
    }
}

/// Interpretation of a [`RemoteResponse`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub remote_id: Option<RemoteId>,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

impl PushOutcome {
    pub fn success(remote_id: Option<RemoteId>) -> Self {
        Self {
            remote_id,
            succeeded: true,
            error_detail: None,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            remote_id: None,
            succeeded: false,
            error_detail: Some(detail.into()),
        }
    }
}

// ============================================================================
// IChannelAdapter trait
// ============================================================================

/// Port trait for one marketplace integration
#[async_trait::async_trait]
pub trait IChannelAdapter: Send + Sync {
    /// The marketplace family this adapter speaks to
    fn channel_type(&self) -> ChannelType;

    /// Channel-relevant projection of the entity, the input of the fingerprint
    ///
    /// # Errors
    /// [`ChannelError::LocalData`] when required fields are missing
    fn projection(&self, entity: &LocalEntity) -> Result<Value, ChannelError>;

    /// SHA-256 over the canonical JSON form of [`projection`](Self::projection)
    fn compute_fingerprint(&self, entity: &LocalEntity) -> Result<Fingerprint, ChannelError> {
        Ok(Fingerprint::of_json(&self.projection(entity)?))
    }

    /// Builds the wire request; create when `record` has no remote id, update otherwise
    fn build_payload(
        &self,
        entity: &LocalEntity,
        record: &MirrorRecord,
    ) -> Result<Payload, ChannelError>;

    /// Sends the payload
    ///
    /// # Errors
    /// [`ChannelError::RemoteTransient`] for network failures, throttling and
    /// server errors; [`ChannelError::RemoteRejected`] for validation failures.
    async fn push(&self, payload: &Payload) -> Result<RemoteResponse, ChannelError>;

    /// Extracts the remote id and success flag from a response
    fn parse_response(&self, response: &RemoteResponse) -> PushOutcome;

    /// Removes the remote counterpart of `record`
    ///
    /// Records without a remote id have nothing to delete.
    async fn delete(&self, record: &MirrorRecord) -> Result<(), ChannelError>;
}

// ============================================================================
// AdapterRegistry
// ============================================================================

/// Configured adapters keyed by channel id
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ChannelId, Arc<dyn IChannelAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` for `channel_id`, replacing any previous one
    pub fn register(&mut self, channel_id: ChannelId, adapter: Arc<dyn IChannelAdapter>) {
        self.adapters.insert(channel_id, adapter);
    }

    pub fn get(&self, channel_id: ChannelId) -> Option<Arc<dyn IChannelAdapter>> {
        self.adapters.get(&channel_id).cloned()
    }

    /// Registered channel ids, sorted
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.adapters.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<(i64, ChannelType)> = self
            .channel_ids()
            .into_iter()
            .filter_map(|id| self.adapters.get(&id).map(|a| (id.get(), a.channel_type())))
            .collect();
        f.debug_struct("AdapterRegistry")
            .field("adapters", &entries)
            .finish()
    }
}
