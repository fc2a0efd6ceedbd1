//! Salesync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core of the remote mirror
//! synchronization engine:
//! - **Domain entities** - `LocalEntity`, `MirrorRecord`, `SyncRequest`
//! - **Error taxonomy** - `DomainError` and the channel-facing `ChannelError`
//! - **Retry policy** - bounded exponential backoff for transient failures
//! - **Port definitions** - Traits for adapters: `IMirrorStore`,
//!   `ISyncRequestQueue`, `IChannelAdapter`, `ILocalEntitySource`
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`salesync-cache` for persistence, `salesync-channels` for marketplaces).

pub mod config;
pub mod domain;
pub mod ports;
