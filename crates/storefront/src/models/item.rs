//! Catalog item types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siqgarbs_core::{ItemId, Money, UserId};

/// A catalog item as currently listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub id: ItemId,
    /// The account that listed the item.
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    /// Price in minor units.
    pub price: Money,
    pub image: Option<String>,
    pub large_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for listing a new item.
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    pub image: Option<String>,
    pub large_image: Option<String>,
}

/// Partial update of an item. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub image: Option<String>,
    pub large_image: Option<String>,
}

impl ItemUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.image.is_none()
            && self.large_image.is_none()
    }

    /// Apply the update to an item in place.
    pub fn apply_to(&self, item: &mut Item) {
        if let Some(title) = &self.title {
            item.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            item.description.clone_from(description);
        }
        if let Some(price) = self.price {
            item.price = price;
        }
        if let Some(image) = &self.image {
            item.image = Some(image.clone());
        }
        if let Some(large_image) = &self.large_image {
            item.large_image = Some(large_image.clone());
        }
    }
}

/// One page of the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ItemPage {
    pub items: Vec<Item>,
    pub page: u32,
    pub per_page: u32,
    /// Total number of items in the catalog.
    pub total: u64,
}
