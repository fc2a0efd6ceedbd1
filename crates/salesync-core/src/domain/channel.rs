//! Channel identity
//!
//! A channel is one marketplace integration. The engine selects the adapter
//! for a channel by this tag, never by type hierarchy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Marketplace family a configured channel belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Amazon,
    Ebay,
    Shein,
    Magento,
    Shopify,
    #[serde(rename = "woocommerce")]
    WooCommerce,
    #[serde(rename = "quickbooks")]
    QuickBooks,
}

impl ChannelType {
    /// All supported channel types, in display order
    pub const ALL: [ChannelType; 7] = [
        ChannelType::Amazon,
        ChannelType::Ebay,
        ChannelType::Shein,
        ChannelType::Magento,
        ChannelType::Shopify,
        ChannelType::WooCommerce,
        ChannelType::QuickBooks,
    ];

    /// Stable lowercase tag used in configuration and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Amazon => "amazon",
            ChannelType::Ebay => "ebay",
            ChannelType::Shein => "shein",
            ChannelType::Magento => "magento",
            ChannelType::Shopify => "shopify",
            ChannelType::WooCommerce => "woocommerce",
            ChannelType::QuickBooks => "quickbooks",
        }
    }

    /// Whether the channel addresses views (marketplaces / store views) explicitly
    pub fn has_views(&self) -> bool {
        matches!(
            self,
            ChannelType::Amazon | ChannelType::Ebay | ChannelType::Shein | ChannelType::Magento
        )
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ChannelType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or(DomainError::UnknownVariant {
                kind: "channel type",
                value: s.to_string(),
            })
    }
}
