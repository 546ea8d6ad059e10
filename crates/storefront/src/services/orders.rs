//! Order queries.

use siqgarbs_core::{OrderId, Permission};

use super::ServiceError;
use super::authz::authorize_owner_or;
use crate::db::{OrderRepository, Stores};
use crate::models::{CurrentUser, Order};

/// Permissions that allow reading someone else's order.
const READ_ANY_ORDER: [Permission; 1] = [Permission::Admin];

/// Order query service.
pub struct OrderService<'a> {
    orders: &'a dyn OrderRepository,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub fn new(stores: &'a Stores) -> Self {
        Self {
            orders: stores.orders.as_ref(),
        }
    }

    /// Get one order. Allowed for its owner or `ADMIN`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown order and
    /// `ServiceError::Forbidden` if the caller may not see it.
    pub async fn order(&self, caller: &CurrentUser, id: OrderId) -> Result<Order, ServiceError> {
        let order = self
            .orders
            .find(id)
            .await?
            .ok_or(ServiceError::NotFound("order"))?;

        authorize_owner_or(caller, order.user_id, &READ_ANY_ORDER)?;
        Ok(order)
    }

    /// The caller's own orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the lookup fails.
    pub async fn orders(&self, caller: &CurrentUser) -> Result<Vec<Order>, ServiceError> {
        Ok(self.orders.list_for_user(caller.id).await?)
    }
}
