//! Port definitions (hexagonal architecture interfaces)
//!
//! The reconciliation core depends only on these traits; persistence and
//! marketplace integrations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IMirrorStore`] - Mirror records keyed by (entity, channel, view)
//! - [`ISyncRequestQueue`] - De-duplicating queue of pending sync work
//! - [`IChannelAdapter`] - One marketplace integration
//! - [`ILocalEntitySource`] - Read access to the local entities being mirrored

pub mod channel_adapter;
pub mod entity_source;
pub mod mirror_store;
pub mod sync_queue;

pub use channel_adapter::{
    AdapterRegistry, HttpMethod, IChannelAdapter, Payload, PayloadOperation, PushOutcome,
    RemoteResponse,
};
pub use entity_source::ILocalEntitySource;
pub use mirror_store::{IMirrorStore, MirrorFilter};
pub use sync_queue::{Enqueued, ISyncRequestQueue, RequestFilter};
