//! MirrorRecord domain entity
//!
//! A mirror record tracks the remote counterpart of one local entity on one
//! (channel, view) pair. At most one record exists per [`MirrorKey`]; the
//! key is the de-duplication anchor of the whole engine.
//!
//! ## State Machine
//!
//! ```text
//!               push ok
//!   ┌─────────┐ ──────────► ┌────────┐ ◄─┐ push ok
//!   │ Pending │             │ Synced │ ──┘
//!   └─────────┘ ──┐         └────────┘ ◄──┐
//!                 │ rejected     │        │ push ok
//!                 ▼              ▼        │
//!              ┌────────────────────────────┐
//!              │           Failed           │
//!              └────────────────────────────┘
//! ```
//!
//! A record is pending only until its first push settles. Later local
//! changes are detected by fingerprint, not by status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ChannelId, Fingerprint, LocalEntityId, MirrorId, RemoteId, ViewId};

// ============================================================================
// MirrorKey
// ============================================================================

/// Unique key of a mirror record: (local entity, channel, view)
///
/// A `None` view addresses the channel's default view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MirrorKey {
    pub local_entity_id: LocalEntityId,
    pub channel_id: ChannelId,
    pub view_id: Option<ViewId>,
}

impl MirrorKey {
    pub fn new(
        local_entity_id: LocalEntityId,
        channel_id: ChannelId,
        view_id: Option<ViewId>,
    ) -> Self {
        Self {
            local_entity_id,
            channel_id,
            view_id,
        }
    }

    /// View column value used by storage: 0 stands for the default view
    pub fn view_storage_value(&self) -> i64 {
        self.view_id.map(|v| v.get()).unwrap_or(0)
    }

    /// Inverse of [`view_storage_value`](Self::view_storage_value)
    pub fn view_from_storage(value: i64) -> Result<Option<ViewId>, DomainError> {
        if value == 0 {
            Ok(None)
        } else {
            ViewId::new(value).map(Some)
        }
    }
}

impl fmt::Display for MirrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.view_id {
            Some(view) => write!(f, "{}/{}/{}", self.local_entity_id, self.channel_id, view),
            None => write!(f, "{}/{}/default", self.local_entity_id, self.channel_id),
        }
    }
}

// ============================================================================
// MirrorStatus
// ============================================================================

/// Synchronization status of a mirror record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorStatus {
    /// Created, no push settled yet
    #[default]
    Pending,
    /// Remote counterpart matches `last_synced_hash`
    Synced,
    /// Last push was rejected or local data was invalid
    Failed,
}

impl MirrorStatus {
    pub const ALL: [MirrorStatus; 3] = [
        MirrorStatus::Pending,
        MirrorStatus::Synced,
        MirrorStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorStatus::Pending => "pending",
            MirrorStatus::Synced => "synced",
            MirrorStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MirrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MirrorStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MirrorStatus::Pending),
            "synced" => Ok(MirrorStatus::Synced),
            "failed" => Ok(MirrorStatus::Failed),
            other => Err(DomainError::UnknownVariant {
                kind: "mirror status",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// MirrorRecord
// ============================================================================

/// Remote counterpart of a local entity on one (channel, view) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRecord {
    id: MirrorId,
    key: MirrorKey,
    /// Null until the first successful create
    remote_id: Option<RemoteId>,
    status: MirrorStatus,
    /// Fingerprint of the last payload pushed successfully
    last_synced_hash: Option<Fingerprint>,
    /// Why the last push failed (cleared on success)
    error_detail: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MirrorRecord {
    /// Creates a new pending record for a freshly inserted row
    pub fn new(id: MirrorId, key: MirrorKey) -> Self {
        let now = Utc::now();
        Self {
            id,
            key,
            remote_id: None,
            status: MirrorStatus::Pending,
            last_synced_hash: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> MirrorId {
        self.id
    }

    pub fn key(&self) -> &MirrorKey {
        &self.key
    }

    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    pub fn status(&self) -> MirrorStatus {
        self.status
    }

    pub fn last_synced_hash(&self) -> Option<&Fingerprint> {
        self.last_synced_hash.as_ref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True when the remote counterpart does not exist yet
    pub fn needs_create(&self) -> bool {
        self.remote_id.is_none()
    }

    /// True when the record is synced and was last pushed with `fingerprint`
    pub fn is_up_to_date(&self, fingerprint: &Fingerprint) -> bool {
        self.status == MirrorStatus::Synced && self.last_synced_hash.as_ref() == Some(fingerprint)
    }

    /// Checks if a status transition is valid
    ///
    /// Valid transitions:
    /// - Pending -> Synced, Failed
    /// - Synced -> Synced (re-push), Failed
    /// - Failed -> Synced, Failed (new rejection)
    pub fn can_transition_to(&self, target: MirrorStatus) -> bool {
        target != MirrorStatus::Pending
    }

    fn transition_to(&mut self, target: MirrorStatus) -> Result<(), DomainError> {
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

    /// Applies a successful push
    ///
    /// The remote id is first-writer-wins: once set it is never replaced,
    /// a differing id from a later response is ignored.
    pub fn record_push_success(
        &mut self,
        remote_id: Option<RemoteId>,
        fingerprint: Fingerprint,
    ) -> Result<(), DomainError> {
        self.transition_to(MirrorStatus::Synced)?;
        if self.remote_id.is_none() {
            self.remote_id = remote_id;
        }
        self.last_synced_hash = Some(fingerprint);
        self.error_detail = None;
        Ok(())
    }

    /// Applies a rejected push or a local data failure
    pub fn record_push_failure(&mut self, detail: impl Into<String>) -> Result<(), DomainError> {
        self.transition_to(MirrorStatus::Failed)?;
        self.error_detail = Some(detail.into());
        Ok(())
    }

    /// Links an existing remote counterpart (import); first-writer-wins
    pub fn link_remote(&mut self, remote_id: RemoteId) -> bool {
        if self.remote_id.is_some() {
            return false;
        }
        self.remote_id = Some(remote_id);
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> MirrorKey {
        MirrorKey::new(
            LocalEntityId::new(10).unwrap(),
            ChannelId::new(2).unwrap(),
            Some(ViewId::new(3).unwrap()),
        )
    }

    fn record() -> MirrorRecord {
        MirrorRecord::new(MirrorId::new(1).unwrap(), key())
    }

    fn fp(seed: &str) -> Fingerprint {
        Fingerprint::of_bytes(seed.as_bytes())
    }

    mod key_tests {
        use super::*;

        #[test]
        fn test_display() {
            assert_eq!(key().to_string(), "10/2/3");
            let default_view = MirrorKey::new(key().local_entity_id, key().channel_id, None);
            assert_eq!(default_view.to_string(), "10/2/default");
        }

        #[test]
        fn test_view_storage_round_trip() {
            assert_eq!(key().view_storage_value(), 3);
            assert_eq!(MirrorKey::view_from_storage(0).unwrap(), None);
            assert_eq!(
                MirrorKey::view_from_storage(3).unwrap(),
                Some(ViewId::new(3).unwrap())
            );
            assert!(MirrorKey::view_from_storage(-1).is_err());
        }
    }

    mod status_tests {
        use super::*;

        #[test]
        fn test_parse() {
            assert_eq!("synced".parse::<MirrorStatus>().unwrap(), MirrorStatus::Synced);
            assert!("done".parse::<MirrorStatus>().is_err());
        }

        #[test]
        fn test_default() {
            assert_eq!(MirrorStatus::default(), MirrorStatus::Pending);
        }
    }

    mod record_tests {
        use super::*;

        #[test]
        fn test_new_is_pending_without_remote() {
            let record = record();
            assert_eq!(record.status(), MirrorStatus::Pending);
            assert!(record.needs_create());
            assert!(record.last_synced_hash().is_none());
        }

        #[test]
        fn test_push_success() {
            let mut record = record();
            record
                .record_push_success(Some(RemoteId::new("REMOTE-123").unwrap()), fp("a"))
                .unwrap();
            assert_eq!(record.status(), MirrorStatus::Synced);
            assert_eq!(record.remote_id().unwrap().as_str(), "REMOTE-123");
            assert!(record.is_up_to_date(&fp("a")));
            assert!(!record.is_up_to_date(&fp("b")));
        }

        #[test]
        fn test_remote_id_first_writer_wins() {
            let mut record = record();
            record
                .record_push_success(Some(RemoteId::new("FIRST").unwrap()), fp("a"))
                .unwrap();
            record
                .record_push_success(Some(RemoteId::new("SECOND").unwrap()), fp("b"))
                .unwrap();
            assert_eq!(record.remote_id().unwrap().as_str(), "FIRST");
            assert_eq!(record.last_synced_hash(), Some(&fp("b")));
        }

        #[test]
        fn test_failure_keeps_last_hash() {
            let mut record = record();
            record.record_push_success(None, fp("a")).unwrap();
            record.record_push_failure("invalid price").unwrap();
            assert_eq!(record.status(), MirrorStatus::Failed);
            assert_eq!(record.error_detail(), Some("invalid price"));
            assert_eq!(record.last_synced_hash(), Some(&fp("a")));
            assert!(!record.is_up_to_date(&fp("a")));
        }

        #[test]
        fn test_success_clears_error() {
            let mut record = record();
            record.record_push_failure("boom").unwrap();
            record.record_push_success(None, fp("a")).unwrap();
            assert!(record.error_detail().is_none());
        }

        #[test]
        fn test_nothing_returns_to_pending() {
            let mut record = record();
            assert!(!record.can_transition_to(MirrorStatus::Pending));
            record.record_push_failure("boom").unwrap();
            assert!(!record.can_transition_to(MirrorStatus::Pending));
            assert!(record.can_transition_to(MirrorStatus::Synced));
        }

        #[test]
        fn test_link_remote() {
            let mut record = record();
            assert!(record.link_remote(RemoteId::new("R1").unwrap()));
            assert!(!record.link_remote(RemoteId::new("R2").unwrap()));
            assert_eq!(record.remote_id().unwrap().as_str(), "R1");
        }

        #[test]
        fn test_serde_round_trip_preserves_fields() {
            let mut record = record();
            record
                .record_push_success(Some(RemoteId::new("R").unwrap()), fp("x"))
                .unwrap();
            let json = serde_json::to_value(&record).unwrap();
            let back: MirrorRecord = serde_json::from_value(json).unwrap();
            assert_eq!(back, record);
        }
    }
}
