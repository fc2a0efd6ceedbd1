//! eBay Sell Inventory API
//!
//! Inventory items are keyed by SKU and written with an idempotent `PUT`,
//! so create and update share one request shape. eBay answers `204 No
//! Content` on success; the SKU is echoed back as the remote id.

use async_trait::async_trait;
use salesync_core::config::ChannelConfig;
use salesync_core::domain::{
    ChannelError, ChannelType, EntityKind, LocalEntity, MirrorRecord, RemoteId,
};
use salesync_core::ports::{HttpMethod, IChannelAdapter, Payload, PushOutcome, RemoteResponse};
use serde_json::{json, Map, Value};

use super::{ensure_kind, operation, path_segment, properties, property_text, quantity};
use crate::client::ChannelClient;

const INVENTORY_PATH: &str = "/sell/inventory/v1/inventory_item";
const DEFAULT_CONDITION: &str = "NEW";

pub struct EbayAdapter {
    config: ChannelConfig,
    client: ChannelClient,
}

impl EbayAdapter {
    pub fn new(config: ChannelConfig, client: ChannelClient) -> Self {
        Self { config, client }
    }

    fn item_path(sku: &str) -> String {
        format!("{INVENTORY_PATH}/{}", path_segment(sku))
    }
}

#[async_trait]
impl IChannelAdapter for EbayAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Ebay
    }

    fn projection(&self, entity: &LocalEntity) -> Result<Value, ChannelError> {
        let channel = ChannelType::Ebay;
        ensure_kind(entity, &[EntityKind::Product], channel)?;

        let aspects: Map<String, Value> = properties(entity)
            .iter()
            .map(|(code, value)| (code.clone(), json!([property_text(value)])))
            .collect();

        Ok(json!({
            "sku": entity.require_sku(channel)?,
            "title": entity.require_str("name", channel)?,
            "description": entity.str_attr("description"),
            "brand": entity.str_attr("brand"),
            "condition": entity.str_attr("condition").unwrap_or(DEFAULT_CONDITION),
            "quantity": quantity(entity)?.unwrap_or(0),
            "ean": entity.str_attr("ean"),
            "images": entity.string_list_attr("images"),
            "aspects": aspects,
        }))
    }

    fn build_payload(
        &self,
        entity: &LocalEntity,
        record: &MirrorRecord,
    ) -> Result<Payload, ChannelError> {
        let p = self.projection(entity)?;
        let sku = entity.require_sku(ChannelType::Ebay)?;

        let mut product = json!({
            "title": p["title"],
            "imageUrls": p["images"],
            "aspects": p["aspects"],
        });
        if !p["description"].is_null() {
            product["description"] = p["description"].clone();
        }
        if !p["brand"].is_null() {
            product["brand"] = p["brand"].clone();
        }
        if !p["ean"].is_null() {
            product["ean"] = json!([p["ean"]]);
        }

        let body = json!({
            "availability": { "shipToLocationAvailability": { "quantity": p["quantity"] } },
            "condition": p["condition"],
            "product": product,
        });

        Ok(Payload::new(
            ChannelType::Ebay,
            operation(record),
            HttpMethod::Put,
            Self::item_path(sku),
        )
        .with_body(body)
        .with_remote_key(sku))
    }

    async fn push(&self, payload: &Payload) -> Result<RemoteResponse, ChannelError> {
        self.client.send(payload).await
    }

    fn parse_response(&self, response: &RemoteResponse) -> PushOutcome {
        let errors: Vec<&str> = response
            .body
            .get("errors")
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        if !errors.is_empty() {
            return PushOutcome::failure(errors.join("; "));
        }

        PushOutcome::success(
            response
                .remote_key
                .as_deref()
                .and_then(|sku| RemoteId::new(sku).ok()),
        )
    }

    async fn delete(&self, record: &MirrorRecord) -> Result<(), ChannelError> {
        let Some(sku) = record.remote_id() else {
            return Ok(());
        };
        self.client
            .execute_allow_missing(HttpMethod::Delete, &Self::item_path(sku.as_str()), &[], None)
            .await?;
        tracing::debug!(channel_id = %self.config.id, sku = %sku, "Deleted eBay inventory item");
        Ok(())
    }
}
