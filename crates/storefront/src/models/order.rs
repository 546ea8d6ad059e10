//! Order types.
//!
//! An order carries a by-value snapshot of what was bought, so later catalog
//! edits never change history.

use chrono::{DateTime, Utc};
use serde::Serialize;

use siqgarbs_core::{CurrencyCode, Money, OrderId, OrderItemId, UserId};

use super::CartLine;

/// A paid order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Server-computed total in minor units.
    pub total: Money,
    pub currency: CurrencyCode,
    /// Payment processor charge reference; unique across orders.
    pub charge_id: String,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

/// A purchased item as it was at the time of purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub title: String,
    pub description: String,
    pub price: Money,
    pub image: Option<String>,
    pub large_image: Option<String>,
    pub quantity: i32,
}

/// An order ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total: Money,
    pub currency: CurrencyCode,
    pub charge_id: String,
    pub items: Vec<NewOrderItem>,
}

/// Snapshot row of a [`NewOrder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub title: String,
    pub description: String,
    pub price: Money,
    pub image: Option<String>,
    pub large_image: Option<String>,
    pub quantity: i32,
}

impl From<&CartLine> for NewOrderItem {
    fn from(line: &CartLine) -> Self {
        Self {
            title: line.item.title.clone(),
            description: line.item.description.clone(),
            price: line.item.price,
            image: line.item.image.clone(),
            large_image: line.item.large_image.clone(),
            quantity: line.entry.quantity,
        }
    }
}
