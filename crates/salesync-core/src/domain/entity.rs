//! LocalEntity - the local side of a mirror
//!
//! A local entity is any domain object the back office can push to a
//! channel. The synchronization core does not own these objects; it only
//! reads a snapshot of them at reconcile time. Channel-relevant data lives in
//! an ordered attribute map so adapters can project what they need.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{ChannelError, DomainError};
use super::newtypes::{LocalEntityId, TenantId};
use super::sync_request::SyncType;

/// Kind of local entity being mirrored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Content,
    Price,
    PropertyAssignment,
    ImageAssociation,
    EanCode,
}

impl EntityKind {
    /// The sync type a mutation of this kind enqueues by default
    pub fn sync_type(&self) -> SyncType {
        match self {
            EntityKind::Product => SyncType::Product,
            EntityKind::Content => SyncType::Content,
            EntityKind::Price => SyncType::Price,
            EntityKind::PropertyAssignment => SyncType::Property,
            EntityKind::ImageAssociation => SyncType::Images,
            EntityKind::EanCode => SyncType::EanCode,
        }
    }

    /// Stable tag used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Content => "content",
            EntityKind::Price => "price",
            EntityKind::PropertyAssignment => "property_assignment",
            EntityKind::ImageAssociation => "image_association",
            EntityKind::EanCode => "ean_code",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(EntityKind::Product),
            "content" => Ok(EntityKind::Content),
            "price" => Ok(EntityKind::Price),
            "property_assignment" => Ok(EntityKind::PropertyAssignment),
            "image_association" => Ok(EntityKind::ImageAssociation),
            "ean_code" => Ok(EntityKind::EanCode),
            other => Err(DomainError::UnknownVariant {
                kind: "entity kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Snapshot of a local entity owned by exactly one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEntity {
    id: LocalEntityId,
    tenant_id: TenantId,
    kind: EntityKind,
    /// Stock keeping unit of the product this entity belongs to
    sku: Option<String>,
    attributes: BTreeMap<String, Value>,
    /// Soft-deleted entities trigger removal of their remote counterparts
    deleted: bool,
    updated_at: DateTime<Utc>,
}

impl LocalEntity {
    /// Creates a new, non-deleted entity with no attributes
    pub fn new(id: LocalEntityId, tenant_id: TenantId, kind: EntityKind) -> Self {
        Self {
            id,
            tenant_id,
            kind,
            sku: None,
            attributes: BTreeMap::new(),
            deleted: false,
            updated_at: Utc::now(),
        }
    }

    /// Sets the SKU (builder style)
    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    /// Sets one attribute (builder style)
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Sets the soft-delete flag (builder style)
    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    /// Restores the stored modification timestamp (used by storage adapters)
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    pub fn id(&self) -> LocalEntityId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns a raw attribute value
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Returns a non-empty string attribute
    pub fn str_attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Returns a string attribute or a `LocalData` error naming the channel
    pub fn require_str(
        &self,
        name: &str,
        channel: impl fmt::Display,
    ) -> Result<&str, ChannelError> {
        self.str_attr(name)
            .ok_or_else(|| ChannelError::missing_field(name, channel))
    }

    /// Returns the SKU or a `LocalData` error naming the channel
    pub fn require_sku(&self, channel: impl fmt::Display) -> Result<&str, ChannelError> {
        self.sku
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ChannelError::missing_field("sku", channel))
    }

    /// Returns a numeric attribute stored either as a JSON number or a decimal string
    pub fn number_attr(&self, name: &str) -> Option<f64> {
        match self.attributes.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns an array attribute of strings (e.g. image URLs)
    pub fn string_list_attr(&self, name: &str) -> Vec<String> {
        self.attributes
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replaces an attribute value and bumps the modification time
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
        self.updated_at = Utc::now();
    }

    /// Marks the entity as deleted
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.updated_at = Utc::now();
    }
}
