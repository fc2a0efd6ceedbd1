//! Magento 2 REST API
//!
//! Products are addressed by SKU within a store view
//! (`/rest/{store}/V1/products/{sku}`); the store code is the record's view
//! code, `all` for the default view. The SKU is the remote id. Partial
//! entities update only their own fields through the same `PUT`.

use async_trait::async_trait;
use salesync_core::config::ChannelConfig;
use salesync_core::domain::{
    ChannelError, ChannelType, EntityKind, LocalEntity, MirrorRecord, RemoteId,
};
use salesync_core::ports::{
    HttpMethod, IChannelAdapter, Payload, PayloadOperation, PushOutcome, RemoteResponse,
};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{
    decimal, ensure_kind, operation, optional_view_code, path_segment, price, properties,
    property_text, quantity, remote_id_at,
};
use crate::client::ChannelClient;

const ALL_STORES: &str = "all";
const DEFAULT_ATTRIBUTE_SET: i64 = 4;
const STATUS_ENABLED: u8 = 1;
const VISIBILITY_CATALOG_SEARCH: u8 = 4;

const SUPPORTED: [EntityKind; 5] = [
    EntityKind::Product,
    EntityKind::Price,
    EntityKind::Content,
    EntityKind::EanCode,
    EntityKind::PropertyAssignment,
];

pub struct MagentoAdapter {
    config: ChannelConfig,
    client: ChannelClient,
}

impl MagentoAdapter {
    pub fn new(config: ChannelConfig, client: ChannelClient) -> Self {
        Self { config, client }
    }

    fn products_path(store: &str) -> String {
        format!("/rest/{}/V1/products", path_segment(store))
    }

    fn custom_attribute(code: &str, value: &Value) -> Value {
        json!({ "attribute_code": code, "value": value })
    }
}

#[async_trait]
impl IChannelAdapter for MagentoAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Magento
    }

    fn projection(&self, entity: &LocalEntity) -> Result<Value, ChannelError> {
        let channel = ChannelType::Magento;
        ensure_kind(entity, &SUPPORTED, channel)?;

        let mut fields = Map::new();
        fields.insert("sku".into(), json!(entity.require_sku(channel)?));

        match entity.kind() {
            EntityKind::Product => {
                fields.insert("name".into(), json!(entity.require_str("name", channel)?));
                fields.insert("price".into(), json!(price(entity, channel)?));
                fields.insert(
                    "attribute_set_id".into(),
                    json!(entity
                        .number_attr("attribute_set_id")
                        .map(|id| id as i64)
                        .unwrap_or(DEFAULT_ATTRIBUTE_SET)),
                );
                if let Some(description) = entity.str_attr("description") {
                    fields.insert("description".into(), json!(description));
                }
                if let Some(qty) = quantity(entity)? {
                    fields.insert("quantity".into(), json!(qty));
                }
                if let Some(ean) = entity.str_attr("ean") {
                    fields.insert("ean".into(), json!(ean));
                }
            }
            EntityKind::Price => {
                fields.insert("price".into(), json!(price(entity, channel)?));
            }
            EntityKind::Content => {
                fields.insert("name".into(), json!(entity.require_str("name", channel)?));
                if let Some(description) = entity.str_attr("description") {
                    fields.insert("description".into(), json!(description));
                }
            }
            EntityKind::EanCode => {
                fields.insert("ean".into(), json!(entity.require_str("ean", channel)?));
            }
            EntityKind::PropertyAssignment | EntityKind::ImageAssociation => {}
        }

        let props = properties(entity);
        if entity.kind() == EntityKind::PropertyAssignment && props.is_empty() {
            return Err(ChannelError::missing_field("property", channel));
        }
        if matches!(
            entity.kind(),
            EntityKind::Product | EntityKind::PropertyAssignment
        ) && !props.is_empty()
        {
            let props: Map<String, Value> = props
                .iter()
                .map(|(code, value)| (code.clone(), json!(property_text(value))))
                .collect();
            fields.insert("properties".into(), Value::Object(props));
        }

        Ok(Value::Object(fields))
    }

    fn build_payload(
        &self,
        entity: &LocalEntity,
        record: &MirrorRecord,
    ) -> Result<Payload, ChannelError> {
        let p = self.projection(entity)?;
        let sku = entity.require_sku(ChannelType::Magento)?;
        let store = optional_view_code(&self.config, record)?.unwrap_or(ALL_STORES);

        let mut product = Map::new();
        product.insert("sku".into(), json!(sku));
        if let Some(name) = p.get("name") {
            product.insert("name".into(), name.clone());
        }
        if let Some(price) = p.get("price") {
            product.insert("price".into(), decimal(price));
        }
        if let Some(qty) = p.get("quantity") {
            let in_stock = qty.as_i64().unwrap_or(0) > 0;
            product.insert(
                "extension_attributes".into(),
                json!({ "stock_item": { "qty": qty, "is_in_stock": in_stock } }),
            );
        }

        let mut custom_attributes = Vec::new();
        if let Some(description) = p.get("description") {
            custom_attributes.push(Self::custom_attribute("description", description));
        }
        if let Some(ean) = p.get("ean") {
            custom_attributes.push(Self::custom_attribute("ean", ean));
        }
        if let Some(props) = p.get("properties").and_then(Value::as_object) {
            for (code, value) in props {
                custom_attributes.push(Self::custom_attribute(code, value));
            }
        }
        if !custom_attributes.is_empty() {
            product.insert("custom_attributes".into(), Value::Array(custom_attributes));
        }

        let operation = operation(record);
        let full_create =
            operation == PayloadOperation::Create && entity.kind() == EntityKind::Product;

        let (method, path) = if full_create {
            product.insert("attribute_set_id".into(), p["attribute_set_id"].clone());
            product.insert("type_id".into(), json!("simple"));
            product.insert("status".into(), json!(STATUS_ENABLED));
            product.insert("visibility".into(), json!(VISIBILITY_CATALOG_SEARCH));
            (HttpMethod::Post, Self::products_path(store))
        } else {
            (
                HttpMethod::Put,
                format!("{}/{}", Self::products_path(store), path_segment(sku)),
            )
        };

        debug!(sku, store, method = %method, "Built Magento product payload");
        Ok(
            Payload::new(ChannelType::Magento, operation, method, path)
                .with_body(json!({ "product": product }))
                .with_remote_key(sku),
        )
    }

    async fn push(&self, payload: &Payload) -> Result<RemoteResponse, ChannelError> {
        self.client.send(payload).await
    }

    fn parse_response(&self, response: &RemoteResponse) -> PushOutcome {
        let remote_id = remote_id_at(&response.body, "/sku").or_else(|| {
            response
                .remote_key
                .as_deref()
                .and_then(|key| RemoteId::new(key).ok())
        });
        PushOutcome::success(remote_id)
    }

    async fn delete(&self, record: &MirrorRecord) -> Result<(), ChannelError> {
        let Some(sku) = record.remote_id() else {
            return Ok(());
        };
        let path = format!(
            "{}/{}",
            Self::products_path(ALL_STORES),
            path_segment(sku.as_str())
        );
        self.client
            .execute_allow_missing(HttpMethod::Delete, &path, &[], None)
            .await?;
        debug!(channel_id = %self.config.id, sku = %sku, "Deleted Magento product");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::*;

    fn adapter() -> MagentoAdapter {
        let mut config = channel_config(ChannelType::Magento);
        config.views.insert(3, "de_store".to_string());
        config.default_view = None;
        MagentoAdapter::new(config, client())
    }

    #[test]
    fn test_create_posts_full_product_to_all_stores() {
        let payload = adapter().build_payload(&product(), &record(None)).unwrap();
        assert_eq!(payload.method, HttpMethod::Post);
        assert_eq!(payload.path, "/rest/all/V1/products");

        let product = &payload.body.unwrap()["product"];
        assert_eq!(product["sku"], "CHAIR-01");
        assert_eq!(product["price"], 49.9);
        assert_eq!(product["type_id"], "simple");
        assert_eq!(product["attribute_set_id"], 4);
        assert_eq!(product["extension_attributes"]["stock_item"]["qty"], 12);
        assert_eq!(product["extension_attributes"]["stock_item"]["is_in_stock"], true);
        let codes: Vec<&str> = product["custom_attributes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["attribute_code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["description", "ean", "color", "material"]);
    }

    #[test]
    fn test_update_puts_to_store_view() {
        let payload = adapter()
            .build_payload(&product(), &linked_record(Some(3), "CHAIR-01"))
            .unwrap();
        assert_eq!(payload.method, HttpMethod::Put);
        assert_eq!(payload.path, "/rest/de_store/V1/products/CHAIR-01");
        assert!(payload.body.unwrap()["product"].get("type_id").is_none());
    }

    #[test]
    fn test_price_entity_sends_only_price() {
        let entity = entity(EntityKind::Price).with_attribute("price", json!("12"));
        let payload = adapter().build_payload(&entity, &record(None)).unwrap();
        assert_eq!(payload.method, HttpMethod::Put);
        assert_eq!(
            payload.body.unwrap(),
            json!({"product": {"sku": "CHAIR-01", "price": 12.0}})
        );
    }

    #[test]
    fn test_property_assignment_becomes_custom_attribute() {
        let entity = entity(EntityKind::PropertyAssignment)
            .with_attribute("property", json!("color"))
            .with_attribute("value", json!("red"));
        let body = adapter()
            .build_payload(&entity, &record(None))
            .unwrap()
            .body
            .unwrap();
        assert_eq!(
            body["product"]["custom_attributes"][0],
            json!({"attribute_code": "color", "value": "red"})
        );
    }

    #[test]
    fn test_images_are_not_mirrored() {
        let entity = entity(EntityKind::ImageAssociation);
        assert!(matches!(
            adapter().projection(&entity),
            Err(ChannelError::LocalData(_))
        ));
    }

    #[test]
    fn test_parse_response_reads_sku() {
        let response = RemoteResponse::new(200, json!({"id": 2048, "sku": "CHAIR-01"}));
        let outcome = adapter().parse_response(&response);
        assert!(outcome.succeeded);
        assert_eq!(outcome.remote_id.unwrap().as_str(), "CHAIR-01");
    }
}
