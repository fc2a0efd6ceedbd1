//! SHEIN Open API (goods publishing)
//!
//! Products are published and edited through one endpoint. SHEIN answers
//! HTTP 200 for validation failures and reports them in the envelope
//! (`code != "0"` or `info.success == false`), so [`parse_response`] rather
//! than the HTTP status decides success. The SPU name returned on first
//! publish is the remote id and must be sent back on edits.
//!
//! [`parse_response`]: IChannelAdapter::parse_response

use async_trait::async_trait;
use salesync_core::config::ChannelConfig;
use salesync_core::domain::{ChannelError, ChannelType, EntityKind, LocalEntity, MirrorRecord};
use salesync_core::ports::{HttpMethod, IChannelAdapter, Payload, PushOutcome, RemoteResponse};
use serde_json::{json, Value};
use tracing::warn;

use super::{ensure_kind, operation, optional_view_code, price, quantity, remote_id_at};
use crate::client::ChannelClient;

const PUBLISH_PATH: &str = "/open-api/goods/product/publishOrEdit";
const LANGUAGE: &str = "en";
const DEFAULT_CURRENCY: &str = "USD";
const IMAGE_TYPE_MAIN: u8 = 1;
const IMAGE_TYPE_DETAIL: u8 = 2;

pub struct SheinAdapter {
    config: ChannelConfig,
    client: ChannelClient,
}

impl SheinAdapter {
    pub fn new(config: ChannelConfig, client: ChannelClient) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl IChannelAdapter for SheinAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Shein
    }

    fn projection(&self, entity: &LocalEntity) -> Result<Value, ChannelError> {
        let channel = ChannelType::Shein;
        ensure_kind(entity, &[EntityKind::Product], channel)?;

        let category_id = entity
            .number_attr("category_id")
            .map(|c| c as i64)
            .ok_or_else(|| ChannelError::missing_field("category_id", channel))?;

        Ok(json!({
            "sku": entity.require_sku(channel)?,
            "name": entity.require_str("name", channel)?,
            "description": entity.str_attr("description"),
            "category_id": category_id,
            "price": price(entity, channel)?,
            "currency": entity.str_attr("currency").unwrap_or(DEFAULT_CURRENCY),
            "quantity": quantity(entity)?.unwrap_or(0),
            "images": entity.string_list_attr("images"),
        }))
    }

    fn build_payload(
        &self,
        entity: &LocalEntity,
        record: &MirrorRecord,
    ) -> Result<Payload, ChannelError> {
        let p = self.projection(entity)?;
        let sku = entity.require_sku(ChannelType::Shein)?;
        let site = optional_view_code(&self.config, record)?;

        let images: Vec<Value> = p["images"]
            .as_array()
            .map(|urls| {
                urls.iter()
                    .enumerate()
                    .map(|(index, url)| {
                        json!({
                            "image_type": if index == 0 { IMAGE_TYPE_MAIN } else { IMAGE_TYPE_DETAIL },
                            "image_sort": index + 1,
                            "image_url": url,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut body = json!({
            "supplier_code": sku,
            "category_id": p["category_id"],
            "product_name_multi": [{ "language": LANGUAGE, "name": p["name"] }],
            "skc_list": [{
                "supplier_code": sku,
                "image_info": { "image_info_list": images },
                "sku_list": [{
                    "supplier_sku": sku,
                    "price_info_list": [{ "base_price": p["price"], "currency": p["currency"] }],
                    "stock_info_list": [{ "inventory_num": p["quantity"] }],
                }],
            }],
        });
        if let Some(description) = p["description"].as_str() {
            body["product_desc_multi"] = json!([{ "language": LANGUAGE, "name": description }]);
        }
        if let Some(site) = site {
            body["site_list"] = json!([{ "main_site": site, "sub_site_list": [site] }]);
        }
        if let Some(spu_name) = record.remote_id() {
            body["spu_name"] = json!(spu_name.as_str());
        }

        Ok(Payload::new(
            ChannelType::Shein,
            operation(record),
            HttpMethod::Post,
            PUBLISH_PATH,
        )
        .with_body(body))
    }

    async fn push(&self, payload: &Payload) -> Result<RemoteResponse, ChannelError> {
        self.client.send(payload).await
    }

    fn parse_response(&self, response: &RemoteResponse) -> PushOutcome {
        let body = &response.body;
        let code = match body.get("code") {
            Some(Value::String(code)) => code.clone(),
            Some(Value::Number(code)) => code.to_string(),
            _ => "0".to_string(),
        };
        if code != "0" {
            let msg = body.get("msg").and_then(Value::as_str).unwrap_or("unknown error");
            return PushOutcome::failure(format!("{code}: {msg}"));
        }

        if body.pointer("/info/success").and_then(Value::as_bool) == Some(false) {
            let messages: Vec<String> = body
                .pointer("/info/pre_valid_result")
                .and_then(Value::as_array)
                .map(|results| {
                    results
                        .iter()
                        .filter_map(|r| r.get("messages").and_then(Value::as_array))
                        .flatten()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let detail = if messages.is_empty() {
                "publish rejected".to_string()
            } else {
                messages.join("; ")
            };
            return PushOutcome::failure(detail);
        }

        PushOutcome::success(remote_id_at(body, "/info/spu_name"))
    }

    async fn delete(&self, record: &MirrorRecord) -> Result<(), ChannelError> {
        // The goods API has no removal call; published SPUs stay on SHEIN.
        if let Some(spu_name) = record.remote_id() {
            warn!(
                channel_id = %self.config.id,
                spu_name = %spu_name,
                "SHEIN products cannot be removed remotely, unlinking only"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::*;

    fn adapter() -> SheinAdapter {
        SheinAdapter::new(channel_config(ChannelType::Shein), client())
    }

    fn shein_product() -> LocalEntity {
        product().with_attribute("category_id", json!(1727))
    }

    #[test]
    fn test_publish_payload() {
        let payload = adapter().build_payload(&shein_product(), &record(Some(3))).unwrap();
        assert_eq!(payload.method, HttpMethod::Post);
        assert_eq!(payload.path, PUBLISH_PATH);

        let body = payload.body.unwrap();
        assert_eq!(body["supplier_code"], "CHAIR-01");
        assert_eq!(body["category_id"], 1727);
        assert_eq!(body["product_name_multi"][0]["name"], "Oak chair");
        assert_eq!(body["site_list"][0]["main_site"], "A1PA6795UKMFR9");
        let sku = &body["skc_list"][0]["sku_list"][0];
        assert_eq!(sku["price_info_list"][0]["base_price"], "49.90");
        assert_eq!(sku["stock_info_list"][0]["inventory_num"], 12);
        assert_eq!(
            body["skc_list"][0]["image_info"]["image_info_list"][0]["image_type"],
            1
        );
        assert!(body.get("spu_name").is_none());
    }

    #[test]
    fn test_edit_sends_spu_name() {
        let payload = adapter()
            .build_payload(&shein_product(), &linked_record(None, "h2403021234"))
            .unwrap();
        assert_eq!(payload.body.unwrap()["spu_name"], "h2403021234");
    }

    #[test]
    fn test_category_is_required() {
        let err = adapter().build_payload(&product(), &record(None)).unwrap_err();
        assert_eq!(err, ChannelError::missing_field("category_id", "shein"));
    }

    #[test]
    fn test_parse_success_envelope() {
        let response = RemoteResponse::new(
            200,
            json!({"code": "0", "msg": "OK", "info": {"spu_name": "h2403021234", "success": true}}),
        );
        let outcome = adapter().parse_response(&response);
        assert!(outcome.succeeded);
        assert_eq!(outcome.remote_id.unwrap().as_str(), "h2403021234");
    }

    #[test]
    fn test_parse_validation_failure_in_200() {
        let response = RemoteResponse::new(
            200,
            json!({
                "code": "0",
                "info": {
                    "success": false,
                    "pre_valid_result": [{"form": "price", "messages": ["invalid price"]}]
                }
            }),
        );
        let outcome = adapter().parse_response(&response);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error_detail.as_deref(), Some("invalid price"));
    }

    #[test]
    fn test_parse_error_code() {
        let response = RemoteResponse::new(200, json!({"code": "20001", "msg": "sign error"}));
        let outcome = adapter().parse_response(&response);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error_detail.as_deref(), Some("20001: sign error"));
    }
}
