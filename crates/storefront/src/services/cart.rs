//! Cart operations.
//!
//! A cart is the set of a user's cart entries. Adding an item that is
//! already in the cart bumps its quantity instead of adding a second line;
//! the repository does that in one atomic step.

use siqgarbs_core::{CartEntryId, ItemId};

use super::ServiceError;
use super::authz::ensure_owner;
use crate::db::{CartRepository, ItemRepository, RepositoryError, Stores};
use crate::models::{CartEntry, CartLine, CurrentUser};

/// Cart service.
pub struct CartService<'a> {
    items: &'a dyn ItemRepository,
    carts: &'a dyn CartRepository,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub fn new(stores: &'a Stores) -> Self {
        Self {
            items: stores.items.as_ref(),
            carts: stores.carts.as_ref(),
        }
    }

    /// Add one unit of an item to the caller's cart.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the item does not exist.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.id))]
    pub async fn add_to_cart(
        &self,
        caller: &CurrentUser,
        item_id: ItemId,
    ) -> Result<CartEntry, ServiceError> {
        if self.items.find(item_id).await?.is_none() {
            return Err(ServiceError::NotFound("item"));
        }

        // The item may vanish between the check and the upsert.
        let entry = self
            .carts
            .add_or_increment(caller.id, item_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => ServiceError::NotFound("item"),
                other => ServiceError::Repository(other),
            })?;

        tracing::debug!(entry_id = %entry.id, quantity = entry.quantity, "Cart entry updated");
        Ok(entry)
    }

    /// Delete one of the caller's cart entries outright.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the entry does not exist and
    /// `ServiceError::Forbidden` if it belongs to someone else. No
    /// permission lets one user edit another's cart.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.id))]
    pub async fn remove_from_cart(
        &self,
        caller: &CurrentUser,
        entry_id: CartEntryId,
    ) -> Result<CartEntry, ServiceError> {
        let entry = self
            .carts
            .find_entry(entry_id)
            .await?
            .ok_or(ServiceError::NotFound("cart item"))?;

        ensure_owner(caller, entry.user_id)?;

        if !self.carts.delete_entry(entry_id).await? {
            return Err(ServiceError::NotFound("cart item"));
        }
        Ok(entry)
    }

    /// The caller's cart with live item data.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the lookup fails.
    pub async fn cart(&self, caller: &CurrentUser) -> Result<Vec<CartLine>, ServiceError> {
        Ok(self.carts.lines_for_user(caller.id).await?)
    }
}
