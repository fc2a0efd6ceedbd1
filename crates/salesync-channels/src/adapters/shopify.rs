//! Shopify Admin GraphQL API
//!
//! Every call is a `POST` to the versioned GraphQL endpoint. GraphQL reports
//! validation problems as `userErrors` inside a 200 response, which
//! [`parse_response`] turns into a failed outcome. Cost-based throttling is
//! also reported in a 200 body (`extensions.code == "THROTTLED"`); `push`
//! maps it to a transient error so the request is retried.
//!
//! [`parse_response`]: IChannelAdapter::parse_response

use async_trait::async_trait;
use salesync_core::config::ChannelConfig;
use salesync_core::domain::{ChannelError, ChannelType, EntityKind, LocalEntity, MirrorRecord};
use salesync_core::ports::{
    HttpMethod, IChannelAdapter, Payload, PayloadOperation, PushOutcome, RemoteResponse,
};
use serde_json::{json, Value};
use tracing::debug;

use super::{ensure_kind, operation, price, remote_id_at};
use crate::client::ChannelClient;

const API_VERSION: &str = "2024-01";

const PRODUCT_CREATE: &str = "mutation productCreate($input: ProductInput!, $media: [CreateMediaInput!]) { \
productCreate(input: $input, media: $media) { product { id } userErrors { field message } } }";

const PRODUCT_UPDATE: &str = "mutation productUpdate($input: ProductInput!) { \
productUpdate(input: $input) { product { id } userErrors { field message } } }";

const PRODUCT_DELETE: &str = "mutation productDelete($input: ProductDeleteInput!) { \
productDelete(input: $input) { deletedProductId userErrors { field message } } }";

pub struct ShopifyAdapter {
    config: ChannelConfig,
    client: ChannelClient,
}

impl ShopifyAdapter {
    pub fn new(config: ChannelConfig, client: ChannelClient) -> Self {
        Self { config, client }
    }

    fn graphql_path() -> String {
        format!("/admin/api/{API_VERSION}/graphql.json")
    }
}

/// Messages of top-level GraphQL errors
fn graphql_errors(body: &Value) -> Vec<String> {
    body.get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown GraphQL error")
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default()
}

fn is_throttled(body: &Value) -> bool {
    body.get("errors")
        .and_then(Value::as_array)
        .is_some_and(|errors| {
            errors
                .iter()
                .any(|e| e.pointer("/extensions/code").and_then(Value::as_str) == Some("THROTTLED"))
        })
}

/// `userErrors` of the first mutation result found in `data`
fn user_errors(body: &Value) -> Vec<String> {
    ["productCreate", "productUpdate", "productDelete"]
        .iter()
        .filter_map(|op| body.pointer(&format!("/data/{op}/userErrors")))
        .filter_map(Value::as_array)
        .flatten()
        .map(|e| {
            let field = e
                .get("field")
                .and_then(Value::as_array)
                .map(|path| {
                    path.iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(".")
                })
                .unwrap_or_default();
            let message = e.get("message").and_then(Value::as_str).unwrap_or("");
            if field.is_empty() {
                message.to_string()
            } else {
                format!("{field}: {message}")
            }
        })
        .collect()
}

#[async_trait]
impl IChannelAdapter for ShopifyAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Shopify
    }

    fn projection(&self, entity: &LocalEntity) -> Result<Value, ChannelError> {
        let channel = ChannelType::Shopify;
        ensure_kind(entity, &[EntityKind::Product], channel)?;

        Ok(json!({
            "sku": entity.require_sku(channel)?,
            "title": entity.require_str("name", channel)?,
            "description": entity.str_attr("description"),
            "vendor": entity.str_attr("brand"),
            "product_type": entity.str_attr("product_type"),
            "price": price(entity, channel)?,
            "barcode": entity.str_attr("ean"),
            "images": entity.string_list_attr("images"),
        }))
    }

    fn build_payload(
        &self,
        entity: &LocalEntity,
        record: &MirrorRecord,
    ) -> Result<Payload, ChannelError> {
        let p = self.projection(entity)?;
        let operation = operation(record);

        let mut variant = json!({ "sku": p["sku"], "price": p["price"] });
        if !p["barcode"].is_null() {
            variant["barcode"] = p["barcode"].clone();
        }

        let mut input = json!({ "title": p["title"], "variants": [variant] });
        for (field, key) in [
            ("descriptionHtml", "description"),
            ("vendor", "vendor"),
            ("productType", "product_type"),
        ] {
            if !p[key].is_null() {
                input[field] = p[key].clone();
            }
        }

        let body = match (operation, record.remote_id()) {
            (PayloadOperation::Update, Some(remote_id)) => {
                input["id"] = json!(remote_id.as_str());
                json!({ "query": PRODUCT_UPDATE, "variables": { "input": input } })
            }
            _ => {
                let media: Vec<Value> = p["images"]
                    .as_array()
                    .map(|urls| {
                        urls.iter()
                            .map(|url| json!({ "originalSource": url, "mediaContentType": "IMAGE" }))
                            .collect()
                    })
                    .unwrap_or_default();
                json!({
                    "query": PRODUCT_CREATE,
                    "variables": { "input": input, "media": media },
                })
            }
        };

        Ok(Payload::new(
            ChannelType::Shopify,
            operation,
            HttpMethod::Post,
            Self::graphql_path(),
        )
        .with_body(body))
    }

    async fn push(&self, payload: &Payload) -> Result<RemoteResponse, ChannelError> {
        let response = self.client.send(payload).await?;
        if is_throttled(&response.body) {
            return Err(ChannelError::RemoteTransient(
                "Shopify GraphQL cost limit reached (THROTTLED)".to_string(),
            ));
        }
        Ok(response)
    }

    fn parse_response(&self, response: &RemoteResponse) -> PushOutcome {
        let body = &response.body;
        let mut errors = graphql_errors(body);
        errors.extend(user_errors(body));
        if !errors.is_empty() {
            return PushOutcome::failure(errors.join("; "));
        }

        let remote_id = remote_id_at(body, "/data/productCreate/product/id")
            .or_else(|| remote_id_at(body, "/data/productUpdate/product/id"));
        match remote_id {
            Some(id) => PushOutcome::success(Some(id)),
            None => PushOutcome::failure("Shopify response carried no product id"),
        }
    }

    async fn delete(&self, record: &MirrorRecord) -> Result<(), ChannelError> {
        let Some(product_id) = record.remote_id() else {
            return Ok(());
        };
        let body = json!({
            "query": PRODUCT_DELETE,
            "variables": { "input": { "id": product_id.as_str() } },
        });
        let response = self
            .client
            .execute(HttpMethod::Post, &Self::graphql_path(), &[], Some(&body))
            .await?;

        if is_throttled(&response.body) {
            return Err(ChannelError::RemoteTransient(
                "Shopify GraphQL cost limit reached (THROTTLED)".to_string(),
            ));
        }
        let mut errors = graphql_errors(&response.body);
        errors.extend(user_errors(&response.body));
        // Deleting an already removed product is not an error
        errors.retain(|e| !e.contains("does not exist"));
        if !errors.is_empty() {
            return Err(ChannelError::RemoteRejected(errors.join("; ")));
        }

        debug!(channel_id = %self.config.id, product_id = %product_id, "Deleted Shopify product");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::*;

    fn adapter() -> ShopifyAdapter {
        ShopifyAdapter::new(channel_config(ChannelType::Shopify), client())
    }

    #[test]
    fn test_create_mutation() {
        let payload = adapter().build_payload(&product(), &record(None)).unwrap();
        assert_eq!(payload.method, HttpMethod::Post);
        assert_eq!(payload.path, "/admin/api/2024-01/graphql.json");

        let body = payload.body.unwrap();
        assert!(body["query"].as_str().unwrap().starts_with("mutation productCreate"));
        let input = &body["variables"]["input"];
        assert_eq!(input["title"], "Oak chair");
        assert_eq!(input["vendor"], "Woodworks");
        assert_eq!(input["variants"][0]["sku"], "CHAIR-01");
        assert_eq!(input["variants"][0]["price"], "49.90");
        assert_eq!(input["variants"][0]["barcode"], "4006381333931");
        assert!(input.get("id").is_none());
        assert_eq!(body["variables"]["media"][0]["mediaContentType"], "IMAGE");
    }

    #[test]
    fn test_update_mutation_carries_id() {
        let payload = adapter()
            .build_payload(&product(), &linked_record(None, "gid://shopify/Product/1"))
            .unwrap();
        assert_eq!(payload.operation, PayloadOperation::Update);
        let body = payload.body.unwrap();
        assert!(body["query"].as_str().unwrap().starts_with("mutation productUpdate"));
        assert_eq!(body["variables"]["input"]["id"], "gid://shopify/Product/1");
        assert!(body["variables"].get("media").is_none());
    }

    #[test]
    fn test_user_errors_are_failures() {
        let response = RemoteResponse::new(
            200,
            json!({"data": {"productCreate": {
                "product": null,
                "userErrors": [{"field": ["variants", "0", "price"], "message": "invalid price"}]
            }}}),
        );
        let outcome = adapter().parse_response(&response);
        assert!(!outcome.succeeded);
        assert_eq!(
            outcome.error_detail.as_deref(),
            Some("variants.0.price: invalid price")
        );
    }

    #[test]
    fn test_success_reads_product_gid() {
        let response = RemoteResponse::new(
            200,
            json!({"data": {"productUpdate": {
                "product": {"id": "gid://shopify/Product/1"},
                "userErrors": []
            }}}),
        );
        let outcome = adapter().parse_response(&response);
        assert!(outcome.succeeded);
        assert_eq!(outcome.remote_id.unwrap().as_str(), "gid://shopify/Product/1");
    }

    #[test]
    fn test_throttle_detection() {
        let throttled = json!({"errors": [{"message": "Throttled", "extensions": {"code": "THROTTLED"}}]});
        assert!(is_throttled(&throttled));
        assert!(!is_throttled(&json!({"data": {}})));
        assert_eq!(graphql_errors(&throttled), vec!["Throttled".to_string()]);
    }
}
