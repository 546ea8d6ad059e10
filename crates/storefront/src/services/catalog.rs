//! Catalog operations.

use siqgarbs_core::{ItemId, Permission};

use super::ServiceError;
use super::authz::authorize_owner_or;
use crate::db::{ItemRepository, Stores};
use crate::models::{CurrentUser, Item, ItemPage, ItemUpdate, NewItem};

/// Default page size for item listings.
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Largest page a client may ask for.
pub const MAX_PER_PAGE: u32 = 100;

/// Permissions that allow deleting someone else's item.
const DELETE_ANY_ITEM: [Permission; 2] = [Permission::Admin, Permission::ItemDelete];

/// Catalog service.
pub struct CatalogService<'a> {
    items: &'a dyn ItemRepository,
}

impl<'a> CatalogService<'a> {
    /// Create a new catalog service.
    #[must_use]
    pub fn new(stores: &'a Stores) -> Self {
        Self {
            items: stores.items.as_ref(),
        }
    }

    /// List an item owned by the caller.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for an empty title or a negative price.
    pub async fn create_item(
        &self,
        caller: &CurrentUser,
        mut new_item: NewItem,
    ) -> Result<Item, ServiceError> {
        new_item.title = validate_title(&new_item.title)?;
        if new_item.price.is_negative() {
            return Err(ServiceError::Validation("price cannot be negative".to_owned()));
        }

        let item = self.items.create(caller.id, new_item).await?;
        tracing::info!(item_id = %item.id, user_id = %caller.id, "Item created");
        Ok(item)
    }

    /// Update an item.
    ///
    /// Any signed-in user may update any item; ownership is not checked.
    /// Updates by non-owners are logged.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown item and
    /// `ServiceError::Validation` for an empty update or invalid fields.
    pub async fn update_item(
        &self,
        caller: &CurrentUser,
        id: ItemId,
        mut update: ItemUpdate,
    ) -> Result<Item, ServiceError> {
        if update.is_empty() {
            return Err(ServiceError::Validation("nothing to update".to_owned()));
        }
        if let Some(title) = &update.title {
            update.title = Some(validate_title(title)?);
        }
        if update.price.is_some_and(siqgarbs_core::Money::is_negative) {
            return Err(ServiceError::Validation("price cannot be negative".to_owned()));
        }

        let item = self
            .items
            .update(id, &update)
            .await?
            .ok_or(ServiceError::NotFound("item"))?;

        tracing::info!(
            item_id = %id,
            user_id = %caller.id,
            owner_id = %item.user_id,
            by_owner = item.user_id == caller.id,
            "Item updated"
        );
        Ok(item)
    }

    /// Delete an item. Allowed for its owner, `ADMIN`, or `ITEMDELETE`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown item and
    /// `ServiceError::Forbidden` if the caller may not delete it.
    pub async fn delete_item(&self, caller: &CurrentUser, id: ItemId) -> Result<Item, ServiceError> {
        let item = self.item(id).await?;
        authorize_owner_or(caller, item.user_id, &DELETE_ANY_ITEM)?;

        if !self.items.delete(id).await? {
            return Err(ServiceError::NotFound("item"));
        }

        tracing::info!(item_id = %id, user_id = %caller.id, "Item deleted");
        Ok(item)
    }

    /// Get one item.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown item.
    pub async fn item(&self, id: ItemId) -> Result<Item, ServiceError> {
        self.items
            .find(id)
            .await?
            .ok_or(ServiceError::NotFound("item"))
    }

    /// One page of the catalog, newest first. Pages start at 1.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for page 0 or a page size outside
    /// `1..=MAX_PER_PAGE`.
    pub async fn items(&self, page: u32, per_page: u32) -> Result<ItemPage, ServiceError> {
        if page == 0 {
            return Err(ServiceError::Validation("page starts at 1".to_owned()));
        }
        if !(1..=MAX_PER_PAGE).contains(&per_page) {
            return Err(ServiceError::Validation(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }

        let offset = u64::from(page - 1) * u64::from(per_page);
        let items = self.items.list(per_page, offset).await?;
        let total = self.items.count().await?;

        Ok(ItemPage {
            items,
            page,
            per_page,
            total,
        })
    }
}

fn validate_title(title: &str) -> Result<String, ServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::Validation("title cannot be empty".to_owned()));
    }
    Ok(title.to_owned())
}
