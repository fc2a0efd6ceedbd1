//! Marketplace adapters
//!
//! One [`IChannelAdapter`] implementation per [`ChannelType`]. Each adapter
//! owns the channel's configuration and a [`ChannelClient`]; the registry
//! built by [`registry_from_config`] maps configured channel ids onto them.
//!
//! ## Entity attributes
//!
//! Adapters read these attribute names from a [`LocalEntity`]:
//!
//! | Attribute          | Meaning                                    |
//! |--------------------|--------------------------------------------|
//! | `name`             | product title                              |
//! | `description`      | long description (HTML allowed)            |
//! | `brand`            | brand / vendor                             |
//! | `price`            | decimal price, number or string            |
//! | `currency`         | ISO currency code                          |
//! | `quantity`         | available stock                            |
//! | `images`           | array of image URLs, main image first      |
//! | `ean`              | EAN / GTIN barcode                         |
//! | `properties`       | object of property code to value           |
//! | `property`/`value` | a single property assignment               |

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use salesync_core::config::{ChannelConfig, Config, HttpConfig};
use salesync_core::domain::{
    ChannelError, ChannelType, EntityKind, LocalEntity, MirrorRecord, RemoteId,
};
use salesync_core::ports::{AdapterRegistry, IChannelAdapter, PayloadOperation};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::client::{ChannelAuth, ChannelClient};
use crate::rate_limit::AdaptiveRateLimiter;

pub mod amazon;
pub mod ebay;
pub mod magento;
pub mod quickbooks;
pub mod shein;
pub mod shopify;
pub mod woocommerce;

pub use amazon::AmazonAdapter;
pub use ebay::EbayAdapter;
pub use magento::MagentoAdapter;
pub use quickbooks::QuickBooksAdapter;
pub use shein::SheinAdapter;
pub use shopify::ShopifyAdapter;
pub use woocommerce::WooCommerceAdapter;

// ============================================================================
// Registry construction
// ============================================================================

/// Builds one adapter per configured channel, sharing a single rate limiter
pub fn registry_from_config(config: &Config) -> anyhow::Result<AdapterRegistry> {
    let limiter = Arc::new(AdaptiveRateLimiter::new());
    let mut registry = AdapterRegistry::new();

    for channel in &config.channels {
        let adapter = build_adapter(channel, &config.http, Arc::clone(&limiter)).with_context(
            || {
                format!(
                    "Failed to set up channel {} ({})",
                    channel.id, channel.channel_type
                )
            },
        )?;
        registry.register(channel.id, adapter);
        info!(
            channel_id = %channel.id,
            channel_type = %channel.channel_type,
            base_url = %channel.base_url,
            "Channel adapter registered"
        );
    }

    Ok(registry)
}

/// Builds the adapter for one channel
pub fn build_adapter(
    channel: &ChannelConfig,
    http: &HttpConfig,
    limiter: Arc<AdaptiveRateLimiter>,
) -> anyhow::Result<Arc<dyn IChannelAdapter>> {
    limiter.register(channel.id, channel.requests_per_minute);
    let auth = auth_for(channel)?;
    let client = ChannelClient::new(channel.id, &channel.base_url, http)?
        .with_auth(auth)
        .with_rate_limiter(limiter);
    let config = channel.clone();

    let adapter: Arc<dyn IChannelAdapter> = match channel.channel_type {
        ChannelType::Amazon => Arc::new(AmazonAdapter::new(config, client)?),
        ChannelType::Ebay => Arc::new(EbayAdapter::new(config, client)),
        ChannelType::Shein => Arc::new(SheinAdapter::new(config, client)),
        ChannelType::Magento => Arc::new(MagentoAdapter::new(config, client)),
        ChannelType::Shopify => Arc::new(ShopifyAdapter::new(config, client)),
        ChannelType::WooCommerce => Arc::new(WooCommerceAdapter::new(config, client)),
        ChannelType::QuickBooks => Arc::new(QuickBooksAdapter::new(config, client)?),
    };
    Ok(adapter)
}

/// Authentication scheme each marketplace expects for its access token
fn auth_for(channel: &ChannelConfig) -> anyhow::Result<ChannelAuth> {
    let Some(token) = channel.resolve_access_token() else {
        warn!(channel_id = %channel.id, "No access token configured, requests are unauthenticated");
        return Ok(ChannelAuth::None);
    };

    let auth = match channel.channel_type {
        ChannelType::Amazon => ChannelAuth::Header {
            name: "x-amz-access-token".to_string(),
            value: token,
        },
        ChannelType::Shein => ChannelAuth::Header {
            name: "x-lt-openKeyId".to_string(),
            value: token,
        },
        ChannelType::Shopify => ChannelAuth::Header {
            name: "X-Shopify-Access-Token".to_string(),
            value: token,
        },
        ChannelType::WooCommerce => {
            let (key, secret) = token.split_once(':').with_context(|| {
                format!(
                    "WooCommerce channel {} expects the token as <consumer_key>:<consumer_secret>",
                    channel.id
                )
            })?;
            ChannelAuth::Basic {
                username: key.to_string(),
                password: secret.to_string(),
            }
        }
        ChannelType::Ebay | ChannelType::Magento | ChannelType::QuickBooks => {
            ChannelAuth::Bearer(token)
        }
    };
    Ok(auth)
}

// ============================================================================
// Shared projection helpers
// ============================================================================

/// Fails with `LocalData` when the channel cannot mirror this entity kind
pub(crate) fn ensure_kind(
    entity: &LocalEntity,
    supported: &[EntityKind],
    channel: ChannelType,
) -> Result<(), ChannelError> {
    if supported.contains(&entity.kind()) {
        Ok(())
    } else {
        Err(ChannelError::LocalData(format!(
            "{channel} does not mirror {} entities",
            entity.kind()
        )))
    }
}

/// Price formatted with two decimals; absent prices are `None`
pub(crate) fn optional_price(entity: &LocalEntity) -> Result<Option<String>, ChannelError> {
    if entity.attribute("price").is_none() {
        return Ok(None);
    }
    match entity.number_attr("price") {
        Some(price) if price.is_finite() && price >= 0.0 => Ok(Some(format!("{price:.2}"))),
        Some(price) => Err(ChannelError::LocalData(format!(
            "price must be a non-negative amount, got {price}"
        ))),
        None => Err(ChannelError::LocalData(
            "price is not a decimal amount".to_string(),
        )),
    }
}

/// Required price formatted with two decimals
pub(crate) fn price(entity: &LocalEntity, channel: ChannelType) -> Result<String, ChannelError> {
    optional_price(entity)?.ok_or_else(|| ChannelError::missing_field("price", channel))
}

/// Converts a projected decimal string into a JSON number for APIs that want one
pub(crate) fn decimal(value: &Value) -> Value {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| value.clone())
}

/// Stock quantity as a whole number
pub(crate) fn quantity(entity: &LocalEntity) -> Result<Option<i64>, ChannelError> {
    if entity.attribute("quantity").is_none() {
        return Ok(None);
    }
    match entity.number_attr("quantity") {
        Some(q) if q.is_finite() && q >= 0.0 => Ok(Some(q.round() as i64)),
        _ => Err(ChannelError::LocalData(
            "quantity must be a non-negative number".to_string(),
        )),
    }
}

/// Property assignments: the `properties` object merged with a single
/// `property`/`value` pair
pub(crate) fn properties(entity: &LocalEntity) -> BTreeMap<String, Value> {
    let mut props: BTreeMap<String, Value> = entity
        .attribute("properties")
        .and_then(Value::as_object)
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    if let (Some(code), Some(value)) = (entity.str_attr("property"), entity.attribute("value")) {
        props.insert(code.to_string(), value.clone());
    }
    props
}

/// Renders a property value the way most marketplaces expect (plain text)
pub(crate) fn property_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(property_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Create when the record has no remote id yet, update otherwise
pub(crate) fn operation(record: &MirrorRecord) -> PayloadOperation {
    if record.needs_create() {
        PayloadOperation::Create
    } else {
        PayloadOperation::Update
    }
}

/// Remote code of the record's view, required
pub(crate) fn view_code<'a>(
    config: &'a ChannelConfig,
    record: &MirrorRecord,
) -> Result<&'a str, ChannelError> {
    optional_view_code(config, record)?.ok_or_else(|| {
        ChannelError::LocalData(format!(
            "channel {} has no default view configured",
            config.id
        ))
    })
}

/// Remote code of the record's view; an unmapped explicit view is an error
pub(crate) fn optional_view_code<'a>(
    config: &'a ChannelConfig,
    record: &MirrorRecord,
) -> Result<Option<&'a str>, ChannelError> {
    let view = record.key().view_id;
    match (view, config.view_code(view.map(|v| v.get()))) {
        (_, Some(code)) => Ok(Some(code)),
        (Some(view), None) => Err(ChannelError::LocalData(format!(
            "view {view} is not mapped for channel {}",
            config.id
        ))),
        (None, None) => Ok(None),
    }
}

/// Reads a remote id from a string or numeric JSON field
pub(crate) fn remote_id_at(body: &Value, pointer: &str) -> Option<RemoteId> {
    let raw = match body.pointer(pointer)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    RemoteId::new(raw).ok()
}

/// Percent-encodes one URL path segment (SKUs may contain `/` or spaces)
pub(crate) fn path_segment(raw: &str) -> String {
    let Ok(mut url) = Url::parse("http://segment.invalid/") else {
        return raw.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.push(raw);
    }
    url.path().trim_start_matches('/').to_string()
}
