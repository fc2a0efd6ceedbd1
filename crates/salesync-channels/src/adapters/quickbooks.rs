//! QuickBooks Online Accounting API (Item entity)
//!
//! Items are created with `POST /v3/company/{realm}/item`; the returned
//! `Item.Id` is the remote id. QuickBooks uses optimistic locking, so a
//! sparse update must carry the item's current `SyncToken`. Because the
//! token changes on every write, `push` reads it right before sending an
//! update. Items cannot be deleted, only deactivated (`Active = false`).

use anyhow::Context;
use async_trait::async_trait;
use salesync_core::config::ChannelConfig;
use salesync_core::domain::{ChannelError, ChannelType, EntityKind, LocalEntity, MirrorRecord};
use salesync_core::ports::{
    HttpMethod, IChannelAdapter, Payload, PayloadOperation, PushOutcome, RemoteResponse,
};
use serde_json::{json, Value};
use tracing::debug;

use super::{decimal, ensure_kind, operation, path_segment, price, remote_id_at};
use crate::client::ChannelClient;

const MINOR_VERSION: &str = "65";
const ITEM_TYPE: &str = "NonInventory";
/// QuickBooks rejects item names longer than this
const MAX_NAME_LEN: usize = 100;

pub struct QuickBooksAdapter {
    config: ChannelConfig,
    client: ChannelClient,
    realm_id: String,
}

impl QuickBooksAdapter {
    /// Creates the adapter; `account` must hold the company realm id
    pub fn new(config: ChannelConfig, client: ChannelClient) -> anyhow::Result<Self> {
        let realm_id = config.account.clone().with_context(|| {
            format!("QuickBooks channel {} needs `account` (realm id)", config.id)
        })?;
        Ok(Self {
            config,
            client,
            realm_id,
        })
    }

    fn item_path(&self) -> String {
        format!("/v3/company/{}/item", path_segment(&self.realm_id))
    }

    fn query() -> Vec<(String, String)> {
        vec![("minorversion".to_string(), MINOR_VERSION.to_string())]
    }

    /// Reads the current SyncToken of an item; `None` when the item is gone
    async fn sync_token(&self, item_id: &str) -> Result<Option<String>, ChannelError> {
        let path = format!("{}/{}", self.item_path(), path_segment(item_id));
        let response = self
            .client
            .execute_allow_missing(HttpMethod::Get, &path, &Self::query(), None)
            .await?;
        if response.status == 404 || response.status == 410 {
            return Ok(None);
        }
        response
            .body
            .pointer("/Item/SyncToken")
            .and_then(Value::as_str)
            .map(|token| Some(token.to_string()))
            .ok_or_else(|| {
                ChannelError::RemoteRejected(format!("item {item_id} returned no SyncToken"))
            })
    }

    fn fault(body: &Value) -> Option<String> {
        let errors = body.pointer("/Fault/Error")?.as_array()?;
        let messages: Vec<String> = errors
            .iter()
            .map(|e| {
                let message = e.get("Message").and_then(Value::as_str).unwrap_or("");
                match e.get("Detail").and_then(Value::as_str) {
                    Some(detail) if !detail.is_empty() => format!("{message}: {detail}"),
                    _ => message.to_string(),
                }
            })
            .collect();
        Some(if messages.is_empty() {
            "QuickBooks fault".to_string()
        } else {
            messages.join("; ")
        })
    }
}

#[async_trait]
impl IChannelAdapter for QuickBooksAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::QuickBooks
    }

    fn projection(&self, entity: &LocalEntity) -> Result<Value, ChannelError> {
        let channel = ChannelType::QuickBooks;
        ensure_kind(entity, &[EntityKind::Product], channel)?;

        let name = entity.require_str("name", channel)?;
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ChannelError::LocalData(format!(
                "name is longer than {MAX_NAME_LEN} characters for {channel}"
            )));
        }
        let income_account = match entity.attribute("income_account_id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(ChannelError::missing_field("income_account_id", channel)),
        };

        Ok(json!({
            "sku": entity.require_sku(channel)?,
            "name": name,
            "description": entity.str_attr("description"),
            "unit_price": price(entity, channel)?,
            "income_account_id": income_account,
        }))
    }

    fn build_payload(
        &self,
        entity: &LocalEntity,
        record: &MirrorRecord,
    ) -> Result<Payload, ChannelError> {
        let p = self.projection(entity)?;

        let mut body = json!({
            "Name": p["name"],
            "Sku": p["sku"],
            "Type": ITEM_TYPE,
            "UnitPrice": decimal(&p["unit_price"]),
            "IncomeAccountRef": { "value": p["income_account_id"] },
        });
        if !p["description"].is_null() {
            body["Description"] = p["description"].clone();
        }

        let operation = operation(record);
        let mut payload = Payload::new(
            ChannelType::QuickBooks,
            operation,
            HttpMethod::Post,
            self.item_path(),
        )
        .with_query("minorversion", MINOR_VERSION);

        if let (PayloadOperation::Update, Some(id)) = (operation, record.remote_id()) {
            body["Id"] = json!(id.as_str());
            body["sparse"] = json!(true);
            payload = payload.with_remote_key(id.as_str());
        }

        Ok(payload.with_body(body))
    }

    async fn push(&self, payload: &Payload) -> Result<RemoteResponse, ChannelError> {
        if !payload.is_create() {
            let item_id = payload.remote_key.as_deref().ok_or_else(|| {
                ChannelError::LocalData("QuickBooks update payload has no item id".to_string())
            })?;
            let token = self.sync_token(item_id).await?.ok_or_else(|| {
                ChannelError::RemoteRejected(format!("item {item_id} no longer exists"))
            })?;

            let mut payload = payload.clone();
            if let Some(body) = payload.body.as_mut() {
                body["SyncToken"] = json!(token);
            }
            debug!(item_id, sync_token = %token, "Sending QuickBooks sparse update");
            return self.client.send(&payload).await;
        }
        self.client.send(payload).await
    }

    fn parse_response(&self, response: &RemoteResponse) -> PushOutcome {
        if let Some(fault) = Self::fault(&response.body) {
            return PushOutcome::failure(fault);
        }
        match remote_id_at(&response.body, "/Item/Id") {
            Some(id) => PushOutcome::success(Some(id)),
            None => PushOutcome::failure("QuickBooks response carried no Item.Id"),
        }
    }

    async fn delete(&self, record: &MirrorRecord) -> Result<(), ChannelError> {
        let Some(item_id) = record.remote_id() else {
            return Ok(());
        };
        let Some(token) = self.sync_token(item_id.as_str()).await? else {
            return Ok(());
        };

        let body = json!({
            "Id": item_id.as_str(),
            "SyncToken": token,
            "sparse": true,
            "Active": false,
        });
        let response = self
            .client
            .execute(HttpMethod::Post, &self.item_path(), &Self::query(), Some(&body))
            .await?;
        if let Some(fault) = Self::fault(&response.body) {
            return Err(ChannelError::RemoteRejected(fault));
        }

        debug!(channel_id = %self.config.id, item_id = %item_id, "Deactivated QuickBooks item");
        Ok(())
    }
}
