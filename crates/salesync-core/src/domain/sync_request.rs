//! SyncRequest - a de-duplicated unit of pending synchronization work
//!
//! Requests are keyed by (mirror record, sync type, view). While a request is
//! `Pending`, further mutations for the same key collapse into it and only
//! replace its task arguments.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  mark_done   ┌──────┐
//!   │ Pending │ ───────────► │ Done │  (terminal)
//!   └─────────┘              └──────┘
//!     │    ▲
//!     │    │ retry (manual)
//!     ▼    │
//!   ┌────────┐
//!   │ Failed │
//!   └────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DomainError;
use super::newtypes::{MirrorId, SyncRequestId, ViewId};

// ============================================================================
// SyncType
// ============================================================================

/// Which aspect of a remote product a request synchronizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Product,
    Content,
    Price,
    Property,
    Images,
    EanCode,
}

impl SyncType {
    pub const ALL: [SyncType; 6] = [
        SyncType::Product,
        SyncType::Content,
        SyncType::Price,
        SyncType::Property,
        SyncType::Images,
        SyncType::EanCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Product => "product",
            SyncType::Content => "content",
            SyncType::Price => "price",
            SyncType::Property => "property",
            SyncType::Images => "images",
            SyncType::EanCode => "ean_code",
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        SyncType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or(DomainError::UnknownVariant {
                kind: "sync type",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// RequestStatus
// ============================================================================

/// Lifecycle status of a sync request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 3] = [
        RequestStatus::Pending,
        RequestStatus::Done,
        RequestStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Done => "done",
            RequestStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "done" => Ok(RequestStatus::Done),
            "failed" => Ok(RequestStatus::Failed),
            other => Err(DomainError::UnknownVariant {
                kind: "request status",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// SyncRequestKey
// ============================================================================

/// De-duplication key of a sync request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRequestKey {
    /// The mirror record ("remote product") the request targets
    pub remote_product_id: MirrorId,
    pub sync_type: SyncType,
    pub view_id: Option<ViewId>,
}

impl SyncRequestKey {
    pub fn new(remote_product_id: MirrorId, sync_type: SyncType, view_id: Option<ViewId>) -> Self {
        Self {
            remote_product_id,
            sync_type,
            view_id,
        }
    }

    /// View column value used by storage: 0 stands for the default view
    pub fn view_storage_value(&self) -> i64 {
        self.view_id.map(|v| v.get()).unwrap_or(0)
    }
}

impl fmt::Display for SyncRequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.view_id {
            Some(view) => write!(f, "{}:{}:{}", self.remote_product_id, self.sync_type, view),
            None => write!(f, "{}:{}:default", self.remote_product_id, self.sync_type),
        }
    }
}

// ============================================================================
// SyncRequest
// ============================================================================

/// A unit of pending synchronization work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    id: SyncRequestId,
    key: SyncRequestKey,
    /// Free-form task arguments; the latest enqueue wins
    task_kwargs: Value,
    status: RequestStatus,
    /// Transient failures recorded so far
    attempts: u32,
    error_detail: Option<String>,
    /// Not eligible for dequeue before this instant
    next_attempt_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SyncRequest {
    /// Creates a new pending request
    pub fn new(id: SyncRequestId, key: SyncRequestKey, task_kwargs: Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            key,
            task_kwargs,
            status: RequestStatus::Pending,
            attempts: 0,
            error_detail: None,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> SyncRequestId {
        self.id
    }

    pub fn key(&self) -> &SyncRequestKey {
        &self.key
    }

    pub fn task_kwargs(&self) -> &Value {
        &self.task_kwargs
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn next_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.next_attempt_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// True when the request may be executed at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Checks if a status transition is valid
    pub fn can_transition_to(&self, target: RequestStatus) -> bool {
        matches!(
            (self.status, target),
            (RequestStatus::Pending, RequestStatus::Done)
                | (RequestStatus::Pending, RequestStatus::Failed)
                | (RequestStatus::Failed, RequestStatus::Pending)
        )
    }

    fn transition_to(&mut self, target: RequestStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replaces the task arguments of a pending request (collapsed enqueue)
    pub fn replace_kwargs(&mut self, task_kwargs: Value) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: RequestStatus::Pending.to_string(),
            });
        }
        self.task_kwargs = task_kwargs;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Pending -> Done
    pub fn mark_done(&mut self) -> Result<(), DomainError> {
        self.transition_to(RequestStatus::Done)?;
        self.error_detail = None;
        self.next_attempt_at = None;
        Ok(())
    }

    /// Pending -> Failed, recording why
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition_to(RequestStatus::Failed)?;
        self.error_detail = Some(reason.into());
        self.next_attempt_at = None;
        Ok(())
    }

    /// Records a transient failure, keeping the request pending until `next_attempt_at`
    pub fn record_transient_failure(
        &mut self,
        reason: impl Into<String>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: RequestStatus::Pending.to_string(),
            });
        }
        self.attempts += 1;
        self.error_detail = Some(reason.into());
        self.next_attempt_at = Some(next_attempt_at);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Failed -> Pending (manual retry), resetting the attempt budget
    pub fn retry(&mut self) -> Result<(), DomainError> {
        self.transition_to(RequestStatus::Pending)?;
        self.attempts = 0;
        self.next_attempt_at = None;
        Ok(())
    }
}
