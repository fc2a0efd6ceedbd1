//! Shared helpers for channel integration tests
//!
//! Each helper starts a mock server and returns an adapter built through
//! the same factory the daemon uses, pointed at that server.

use std::sync::Arc;

use serde_json::json;
use wiremock::MockServer;

use salesync_channels::{build_adapter, AdaptiveRateLimiter};
use salesync_core::config::{ChannelConfig, HttpConfig};
use salesync_core::domain::{
    ChannelId, ChannelType, EntityKind, LocalEntity, LocalEntityId, MirrorId, MirrorKey,
    MirrorRecord, RemoteId, TenantId,
};
use salesync_core::ports::IChannelAdapter;

pub const ACCESS_TOKEN: &str = "test-access-token";

/// HTTP settings with a short timeout so timeout tests stay fast
pub fn http_config() -> HttpConfig {
    HttpConfig {
        timeout_secs: 1,
        connect_timeout_secs: 1,
        ..HttpConfig::default()
    }
}

pub fn channel_config(channel_type: ChannelType, base_url: &str) -> ChannelConfig {
    let mut config = ChannelConfig::new(ChannelId::new(1).unwrap(), channel_type, base_url);
    config.access_token = Some(match channel_type {
        ChannelType::WooCommerce => "ck_test:cs_test".to_string(),
        _ => ACCESS_TOKEN.to_string(),
    });
    config.account = Some("SELLER-1".to_string());
    config.default_view = Some("ATVPDKIKX0DER".to_string());
    config.requests_per_minute = 600;
    config
}

/// Starts a mock server and builds the adapter for `channel_type` against it
pub async fn setup_adapter(channel_type: ChannelType) -> (MockServer, Arc<dyn IChannelAdapter>) {
    setup_adapter_with(channel_type, |_| {}).await
}

/// Like [`setup_adapter`], letting the test adjust the channel config first
pub async fn setup_adapter_with(
    channel_type: ChannelType,
    customize: impl FnOnce(&mut ChannelConfig),
) -> (MockServer, Arc<dyn IChannelAdapter>) {
    let server = MockServer::start().await;
    let mut config = channel_config(channel_type, &server.uri());
    customize(&mut config);
    let adapter = build_adapter(
        &config,
        &http_config(),
        Arc::new(AdaptiveRateLimiter::new()),
    )
    .expect("adapter should build");
    (server, adapter)
}

pub fn product() -> LocalEntity {
    LocalEntity::new(
        LocalEntityId::new(10).unwrap(),
        TenantId::new(1).unwrap(),
        EntityKind::Product,
    )
    .with_sku("CHAIR-01")
    .with_attribute("name", json!("Oak chair"))
    .with_attribute("description", json!("Solid oak dining chair"))
    .with_attribute("price", json!("49.90"))
    .with_attribute("quantity", json!(12))
    .with_attribute("category_id", json!(1727))
    .with_attribute("income_account_id", json!("79"))
}

pub fn new_record() -> MirrorRecord {
    MirrorRecord::new(
        MirrorId::new(1).unwrap(),
        MirrorKey::new(LocalEntityId::new(10).unwrap(), ChannelId::new(1).unwrap(), None),
    )
}

pub fn linked_record(remote: &str) -> MirrorRecord {
    let mut record = new_record();
    record.link_remote(RemoteId::new(remote).unwrap());
    record
}
