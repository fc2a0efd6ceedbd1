//! Salesync Channels - marketplace adapters
//!
//! Implements the `IChannelAdapter` port for every supported marketplace:
//! Amazon, eBay, SHEIN, Magento, Shopify, WooCommerce and QuickBooks.
//!
//! ## Modules
//!
//! - [`adapters`] - one adapter per channel type, plus [`registry_from_config`]
//! - [`client`] - shared HTTP client with auth, timeouts and error classification
//! - [`rate_limit`] - per-channel token buckets with adaptive throttling

pub mod adapters;
pub mod client;
pub mod rate_limit;

pub use adapters::{build_adapter, registry_from_config};
pub use client::{ChannelAuth, ChannelClient};
pub use rate_limit::AdaptiveRateLimiter;
