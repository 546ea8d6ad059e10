//! Cart types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use siqgarbs_core::{CartEntryId, ItemId, Money, UserId};

use super::Item;

/// One (user, item) line of a cart. Unique per pair; quantity is at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartEntry {
    pub id: CartEntryId,
    pub user_id: UserId,
    pub item_id: ItemId,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// A cart entry joined with the live item it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub entry: CartEntry,
    pub item: Item,
}

impl CartLine {
    /// Live price times quantity, or `None` on overflow.
    #[must_use]
    pub fn line_total(&self) -> Option<Money> {
        self.item.price.checked_times(self.entry.quantity)
    }
}

/// The part of a cart entry that an order paid for.
///
/// Checkout takes `quantity` units off entry `id` once the order is written.
/// Units added to the same entry after the cart was loaded are left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchasedEntry {
    pub id: CartEntryId,
    pub quantity: i32,
}

impl From<&CartLine> for PurchasedEntry {
    fn from(line: &CartLine) -> Self {
        Self {
            id: line.entry.id,
            quantity: line.entry.quantity,
        }
    }
}
