//! Order Types
//!
//! Marketplace orders as observed on the push stream and in REST snapshots.
//! Orders are immutable once observed: the engine only folds them into
//! aggregates, it never edits them.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a dashboard workspace (one connected seller account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Create a workspace identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform-assigned order identifier, unique within a workspace.
///
/// Marketplaces emit these as either JSON strings or integers; both
/// deserialize to the same textual identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Create an order identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(text) if text.is_empty() => {
                Err(serde::de::Error::custom("order id cannot be empty"))
            }
            RawId::Text(text) => Ok(Self(text)),
            RawId::Number(number) => Ok(Self(number.to_string())),
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Units of the listing bought on this line.
    pub quantity: u64,
    /// Listing identifier, when the platform provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    /// Listing title, when the platform provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Unit price, when the platform provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
}

impl LineItem {
    /// Create a line item carrying only a quantity.
    #[must_use]
    pub const fn with_quantity(quantity: u64) -> Self {
        Self {
            quantity,
            item_id: None,
            title: None,
            unit_price: None,
        }
    }
}

/// A completed marketplace order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Platform identifier.
    pub id: OrderId,
    /// Creation instant. `None` when the platform sent null or an
    /// unparseable timestamp.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub date_created: Option<DateTime<Utc>>,
    /// Total monetary amount of the order.
    pub total_amount: Decimal,
    /// Line items.
    #[serde(default)]
    pub items: Vec<LineItem>,
    /// Platform order status (`paid`, `cancelled`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// ISO currency code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_id: Option<String>,
}

impl Order {
    /// Create an order with no optional metadata.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        date_created: Option<DateTime<Utc>>,
        total_amount: Decimal,
        items: Vec<LineItem>,
    ) -> Self {
        Self {
            id: OrderId::new(id),
            date_created,
            total_amount,
            items,
            status: None,
            currency_id: None,
        }
    }

    /// Total units across all line items.
    #[must_use]
    pub fn units(&self) -> u64 {
        self.items
            .iter()
            .fold(0_u64, |acc, item| acc.saturating_add(item.quantity))
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|parsed| parsed.with_timezone(&Utc)))
}
