//! WooCommerce REST API (v3)
//!
//! Products are created with `POST /products` and updated by numeric id.
//! The id from the create response is the remote id.

use async_trait::async_trait;
use salesync_core::config::ChannelConfig;
use salesync_core::domain::{ChannelError, ChannelType, EntityKind, LocalEntity, MirrorRecord};
use salesync_core::ports::{
    HttpMethod, IChannelAdapter, Payload, PayloadOperation, PushOutcome, RemoteResponse,
};
use serde_json::{json, Value};

use super::{
    ensure_kind, operation, path_segment, price, properties, property_text, quantity,
    remote_id_at,
};
use crate::client::ChannelClient;

const PRODUCTS_PATH: &str = "/wp-json/wc/v3/products";
const EAN_META_KEY: &str = "_ean";

pub struct WooCommerceAdapter {
    config: ChannelConfig,
    client: ChannelClient,
}

impl WooCommerceAdapter {
    pub fn new(config: ChannelConfig, client: ChannelClient) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl IChannelAdapter for WooCommerceAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::WooCommerce
    }

    fn projection(&self, entity: &LocalEntity) -> Result<Value, ChannelError> {
        let channel = ChannelType::WooCommerce;
        ensure_kind(entity, &[EntityKind::Product], channel)?;

        let attributes: Vec<Value> = properties(entity)
            .iter()
            .map(|(name, value)| {
                json!({ "name": name, "options": [property_text(value)], "visible": true })
            })
            .collect();

        Ok(json!({
            "sku": entity.require_sku(channel)?,
            "name": entity.require_str("name", channel)?,
            "description": entity.str_attr("description"),
            "regular_price": price(entity, channel)?,
            "stock_quantity": quantity(entity)?,
            "ean": entity.str_attr("ean"),
            "images": entity.string_list_attr("images"),
            "attributes": attributes,
        }))
    }

    fn build_payload(
        &self,
        entity: &LocalEntity,
        record: &MirrorRecord,
    ) -> Result<Payload, ChannelError> {
        let p = self.projection(entity)?;

        let images: Vec<Value> = p["images"]
            .as_array()
            .map(|urls| urls.iter().map(|src| json!({ "src": src })).collect())
            .unwrap_or_default();

        let mut body = json!({
            "name": p["name"],
            "type": "simple",
            "sku": p["sku"],
            "regular_price": p["regular_price"],
            "images": images,
            "attributes": p["attributes"],
        });
        if !p["description"].is_null() {
            body["description"] = p["description"].clone();
        }
        if !p["stock_quantity"].is_null() {
            body["manage_stock"] = json!(true);
            body["stock_quantity"] = p["stock_quantity"].clone();
        }
        if !p["ean"].is_null() {
            body["meta_data"] = json!([{ "key": EAN_META_KEY, "value": p["ean"] }]);
        }

        let operation = operation(record);
        let (method, path) = match (operation, record.remote_id()) {
            (PayloadOperation::Update, Some(id)) => (
                HttpMethod::Put,
                format!("{PRODUCTS_PATH}/{}", path_segment(id.as_str())),
            ),
            _ => (HttpMethod::Post, PRODUCTS_PATH.to_string()),
        };

        Ok(Payload::new(ChannelType::WooCommerce, operation, method, path).with_body(body))
    }

    async fn push(&self, payload: &Payload) -> Result<RemoteResponse, ChannelError> {
        self.client.send(payload).await
    }

    fn parse_response(&self, response: &RemoteResponse) -> PushOutcome {
        let body = &response.body;
        if let Some(code) = body.get("code").and_then(Value::as_str) {
            let message = body.get("message").and_then(Value::as_str).unwrap_or(code);
            return PushOutcome::failure(message);
        }
        match remote_id_at(body, "/id") {
            Some(id) => PushOutcome::success(Some(id)),
            None => PushOutcome::failure("WooCommerce response carried no product id"),
        }
    }

    async fn delete(&self, record: &MirrorRecord) -> Result<(), ChannelError> {
        let Some(id) = record.remote_id() else {
            return Ok(());
        };
        let path = format!("{PRODUCTS_PATH}/{}", path_segment(id.as_str()));
        self.client
            .execute_allow_missing(
                HttpMethod::Delete,
                &path,
                &[("force".to_string(), "true".to_string())],
                None,
            )
            .await?;
        tracing::debug!(channel_id = %self.config.id, product_id = %id, "Deleted WooCommerce product");
        Ok(())
    }
}
