//! Amazon Selling Partner API (Listings Items 2021-08-01)
//!
//! Listings are addressed by seller id and SKU, so the SKU doubles as the
//! remote id. A product's first push is a full `PUT`; every later push and
//! every partial entity (price, content, images, EAN, properties) is a
//! `PATCH` with one `replace` operation per attribute. The marketplace id is
//! the record's view code.

use anyhow::Context;
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
    ensure_kind, operation, path_segment, price, properties, property_text, quantity,
    remote_id_at, view_code,
};
use crate::client::ChannelClient;

const LISTINGS_PATH: &str = "/listings/2021-08-01/items";
const DEFAULT_PRODUCT_TYPE: &str = "PRODUCT";
const ISSUE_LOCALE: &str = "en_US";
/// Amazon accepts a main image plus up to eight additional locators
const MAX_IMAGES: usize = 9;

const SUPPORTED: [EntityKind; 6] = [
    EntityKind::Product,
    EntityKind::Price,
    EntityKind::Content,
    EntityKind::ImageAssociation,
    EntityKind::EanCode,
    EntityKind::PropertyAssignment,
];

pub struct AmazonAdapter {
    config: ChannelConfig,
    client: ChannelClient,
    seller_id: String,
}

impl AmazonAdapter {
    /// Creates the adapter; `account` must hold the seller id
    pub fn new(config: ChannelConfig, client: ChannelClient) -> anyhow::Result<Self> {
        let seller_id = config
            .account
            .clone()
            .with_context(|| format!("Amazon channel {} needs `account` (seller id)", config.id))?;
        Ok(Self {
            config,
            client,
            seller_id,
        })
    }

    fn item_path(&self, sku: &str) -> String {
        format!(
            "{LISTINGS_PATH}/{}/{}",
            path_segment(&self.seller_id),
            path_segment(sku)
        )
    }

    /// Listing attributes in SP-API shape, keyed by attribute name
    fn attributes(projection: &Value, marketplace: &str) -> Map<String, Value> {
        let mut attributes = Map::new();
        let text = |value: &Value| json!([{ "value": value, "marketplace_id": marketplace }]);

        if let Some(name) = projection.get("name") {
            attributes.insert("item_name".into(), text(name));
        }
        if let Some(brand) = projection.get("brand") {
            attributes.insert("brand".into(), text(brand));
        }
        if let Some(description) = projection.get("description") {
            attributes.insert("product_description".into(), text(description));
        }
        if let Some(price) = projection
            .get("price")
            .and_then(Value::as_str)
            .and_then(|p| p.parse::<f64>().ok())
        {
            let mut offer = json!({
                "marketplace_id": marketplace,
                "our_price": [{ "schedule": [{ "value_with_tax": price }] }],
            });
            if let Some(currency) = projection.get("currency") {
                offer["currency"] = currency.clone();
            }
            attributes.insert("purchasable_offer".into(), json!([offer]));
        }
        if let Some(quantity) = projection.get("quantity") {
            attributes.insert(
                "fulfillment_availability".into(),
                json!([{ "fulfillment_channel_code": "DEFAULT", "quantity": quantity }]),
            );
        }
        if let Some(ean) = projection.get("ean") {
            attributes.insert(
                "externally_assigned_product_identifier".into(),
                json!([{ "type": "ean", "value": ean, "marketplace_id": marketplace }]),
            );
        }
        if let Some(images) = projection.get("images").and_then(Value::as_array) {
            for (index, url) in images.iter().take(MAX_IMAGES).enumerate() {
                let name = if index == 0 {
                    "main_product_image_locator".to_string()
                } else {
                    format!("other_product_image_locator_{index}")
                };
                attributes.insert(
                    name,
                    json!([{ "media_location": url, "marketplace_id": marketplace }]),
                );
            }
        }
        if let Some(props) = projection.get("properties").and_then(Value::as_object) {
            for (code, value) in props {
                attributes.insert(code.clone(), text(value));
            }
        }
        attributes
    }
}

/// Property assignments as plain-text values, `None` when there are none
fn text_properties(entity: &LocalEntity) -> Option<Value> {
    let props = properties(entity);
    if props.is_empty() {
        return None;
    }
    Some(Value::Object(
        props
            .iter()
            .map(|(code, value)| (code.clone(), json!(property_text(value))))
            .collect(),
    ))
}

#[async_trait]
impl IChannelAdapter for AmazonAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Amazon
    }

    fn projection(&self, entity: &LocalEntity) -> Result<Value, ChannelError> {
        let channel = ChannelType::Amazon;
        ensure_kind(entity, &SUPPORTED, channel)?;

        let mut fields = Map::new();
        fields.insert("sku".into(), json!(entity.require_sku(channel)?));
        fields.insert(
            "product_type".into(),
            json!(entity.str_attr("product_type").unwrap_or(DEFAULT_PRODUCT_TYPE)),
        );

        let mut optional = |name: &str, value: Option<Value>| {
            if let Some(value) = value {
                fields.insert(name.to_string(), value);
            }
        };

        match entity.kind() {
            EntityKind::Product => {
                optional("name", Some(json!(entity.require_str("name", channel)?)));
                optional("price", Some(json!(price(entity, channel)?)));
                optional("brand", entity.str_attr("brand").map(|v| json!(v)));
                optional("description", entity.str_attr("description").map(|v| json!(v)));
                optional("currency", entity.str_attr("currency").map(|v| json!(v)));
                optional("quantity", quantity(entity)?.map(|q| json!(q)));
                optional("ean", entity.str_attr("ean").map(|v| json!(v)));
                let images = entity.string_list_attr("images");
                optional("images", (!images.is_empty()).then(|| json!(images)));
                optional("properties", text_properties(entity));
            }
            EntityKind::Price => {
                optional("price", Some(json!(price(entity, channel)?)));
                optional("currency", entity.str_attr("currency").map(|v| json!(v)));
            }
            EntityKind::Content => {
                optional("name", Some(json!(entity.require_str("name", channel)?)));
                optional("description", entity.str_attr("description").map(|v| json!(v)));
            }
            EntityKind::ImageAssociation => {
                let images = entity.string_list_attr("images");
                if images.is_empty() {
                    return Err(ChannelError::missing_field("images", channel));
                }
                optional("images", Some(json!(images)));
            }
            EntityKind::EanCode => {
                optional("ean", Some(json!(entity.require_str("ean", channel)?)));
            }
            EntityKind::PropertyAssignment => {
                let props = text_properties(entity)
                    .ok_or_else(|| ChannelError::missing_field("property", channel))?;
                optional("properties", Some(props));
            }
        }

        Ok(Value::Object(fields))
    }

    fn build_payload(
        &self,
        entity: &LocalEntity,
        record: &MirrorRecord,
    ) -> Result<Payload, ChannelError> {
        let projection = self.projection(entity)?;
        let sku = entity.require_sku(ChannelType::Amazon)?;
        let marketplace = view_code(&self.config, record)?;
        let product_type = projection
            .get("product_type")
            .cloned()
            .unwrap_or_else(|| json!(DEFAULT_PRODUCT_TYPE));
        let attributes = Self::attributes(&projection, marketplace);
        let operation = operation(record);

        let (method, body) =
            if operation == PayloadOperation::Create && entity.kind() == EntityKind::Product {
                (
                    HttpMethod::Put,
                    json!({
                        "productType": product_type,
                        "requirements": "LISTING",
                        "attributes": attributes,
                    }),
                )
            } else {
                let patches: Vec<Value> = attributes
                    .into_iter()
                    .map(|(name, value)| {
                        json!({ "op": "replace", "path": format!("/attributes/{name}"), "value": value })
                    })
                    .collect();
                (
                    HttpMethod::Patch,
                    json!({ "productType": product_type, "patches": patches }),
                )
            };

        debug!(sku, marketplace, method = %method, "Built Amazon listing payload");
        Ok(
            Payload::new(ChannelType::Amazon, operation, method, self.item_path(sku))
                .with_query("marketplaceIds", marketplace)
                .with_query("issueLocale", ISSUE_LOCALE)
                .with_body(body)
                .with_remote_key(sku),
        )
    }

    async fn push(&self, payload: &Payload) -> Result<RemoteResponse, ChannelError> {
        self.client.send(payload).await
    }

    fn parse_response(&self, response: &RemoteResponse) -> PushOutcome {
        let body = &response.body;
        let errors: Vec<String> = body
            .get("issues")
            .and_then(Value::as_array)
            .map(|issues| {
                issues
                    .iter()
                    .filter(|issue| issue.get("severity").and_then(Value::as_str) == Some("ERROR"))
                    .map(|issue| {
                        let code = issue.get("code").and_then(Value::as_str).unwrap_or("?");
                        let message = issue.get("message").and_then(Value::as_str).unwrap_or("");
                        format!("{code}: {message}")
                    })
                    .collect()
            })
            .unwrap_or_default();

        let invalid = body.get("status").and_then(Value::as_str) == Some("INVALID");
        if invalid || !errors.is_empty() {
            let detail = if errors.is_empty() {
                "listing submission INVALID".to_string()
            } else {
                errors.join("; ")
            };
            return PushOutcome::failure(detail);
        }

        let remote_id = remote_id_at(body, "/sku").or_else(|| {
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
        let marketplace = view_code(&self.config, record)?;
        let query = vec![
            ("marketplaceIds".to_string(), marketplace.to_string()),
            ("issueLocale".to_string(), ISSUE_LOCALE.to_string()),
        ];
        self.client
            .execute_allow_missing(HttpMethod::Delete, &self.item_path(sku.as_str()), &query, None)
            .await?;
        debug!(sku = %sku, marketplace, "Deleted Amazon listing");
        Ok(())
    }
}
