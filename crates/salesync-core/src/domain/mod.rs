//! Domain entities and business logic
//!
//! - Newtypes for type-safe identifiers, remote ids and fingerprints
//! - Channel identity (`ChannelType`)
//! - Local entities as seen by the synchronization core
//! - Mirror records and their status machine
//! - Sync requests, their key and lifecycle
//! - Retry policy for transient remote failures

pub mod channel;
pub mod entity;
pub mod errors;
pub mod mirror_record;
pub mod newtypes;
pub mod retry;
pub mod sync_request;

pub use channel::ChannelType;
pub use entity::{EntityKind, LocalEntity};
pub use errors::{ChannelError, DomainError};
pub use mirror_record::{MirrorKey, MirrorRecord, MirrorStatus};
pub use newtypes::*;
pub use retry::RetryPolicy;
pub use sync_request::{RequestStatus, SyncRequest, SyncRequestKey, SyncType};
