//! Order repository for `PostgreSQL`.
//!
//! Orders are written once per captured charge and never updated. The
//! unique `charge_id` column makes the write idempotent: replaying a
//! checkout persistence step for the same charge returns the first order.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use siqgarbs_core::{CartEntryId, CurrencyCode, Money, OrderId, OrderItemId, UserId};

use super::{OrderRepository, RepositoryError};
use crate::models::{NewOrder, Order, OrderItem, PurchasedEntry};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    total: Money,
    currency: String,
    charge_id: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    title: String,
    description: String,
    price: Money,
    image: Option<String>,
    large_image: Option<String>,
    quantity: i32,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            price: row.price,
            image: row.image,
            large_image: row.large_image,
            quantity: row.quantity,
        }
    }
}

fn into_order(row: OrderRow, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
    let currency: CurrencyCode = row.currency.parse().map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid currency on order {}: {e}", row.id))
    })?;

    Ok(Order {
        id: row.id,
        user_id: row.user_id,
        total: row.total,
        currency,
        charge_id: row.charge_id,
        items,
        created_at: row.created_at,
    })
}

/// Repository for orders and their item snapshots.
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach item snapshots to a batch of order rows.
    async fn with_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        let ids: Vec<OrderId> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, title, description, price, image, large_image, quantity
            FROM storefront.order_item
            WHERE order_id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for item in item_rows {
            by_order
                .entry(item.order_id)
                .or_default()
                .push(OrderItem::from(item));
        }

        rows.into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                into_order(row, items)
            })
            .collect()
    }

    async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        new_order: &NewOrder,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            INSERT INTO storefront.order (user_id, total, currency, charge_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (charge_id) DO NOTHING
            RETURNING id, user_id, total, currency, charge_id, created_at
            ",
        )
        .bind(new_order.user_id)
        .bind(new_order.total)
        .bind(new_order.currency.as_str())
        .bind(&new_order.charge_id)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut items = Vec::with_capacity(new_order.items.len());
        for item in &new_order.items {
            let item_row = sqlx::query_as::<_, OrderItemRow>(
                r"
                INSERT INTO storefront.order_item
                    (order_id, title, description, price, image, large_image, quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, order_id, title, description, price, image, large_image, quantity
                ",
            )
            .bind(row.id)
            .bind(&item.title)
            .bind(&item.description)
            .bind(item.price)
            .bind(&item.image)
            .bind(&item.large_image)
            .bind(item.quantity)
            .fetch_one(&mut **tx)
            .await?;
            items.push(OrderItem::from(item_row));
        }

        into_order(row, items).map(Some)
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create_and_clear_cart(
        &self,
        new_order: &NewOrder,
        purchased: &[PurchasedEntry],
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(order) = Self::insert(&mut tx, new_order).await? else {
            // Already recorded by an earlier attempt for this charge.
            tx.rollback().await?;
            return self
                .find_by_charge_id(&new_order.charge_id)
                .await?
                .ok_or(RepositoryError::NotFound);
        };

        let ids: Vec<CartEntryId> = purchased.iter().map(|p| p.id).collect();
        let quantities: Vec<i32> = purchased.iter().map(|p| p.quantity).collect();

        // Delete before decrementing, otherwise a decremented row could
        // fall under its purchased quantity and be deleted too.
        sqlx::query(
            r"
            DELETE FROM storefront.cart_entry c
            USING UNNEST($1::int4[], $2::int4[]) AS p(id, quantity)
            WHERE c.id = p.id AND c.user_id = $3 AND c.quantity <= p.quantity
            ",
        )
        .bind(&ids)
        .bind(&quantities)
        .bind(new_order.user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE storefront.cart_entry c
            SET quantity = c.quantity - p.quantity
            FROM UNNEST($1::int4[], $2::int4[]) AS p(id, quantity)
            WHERE c.id = p.id AND c.user_id = $3 AND c.quantity > p.quantity
            ",
        )
        .bind(&ids)
        .bind(&quantities)
        .bind(new_order.user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(order)
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, total, currency, charge_id, created_at
            FROM storefront.order
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_by_charge_id(&self, charge_id: &str) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, total, currency, charge_id, created_at
            FROM storefront.order
            WHERE charge_id = $1
            ",
        )
        .bind(charge_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, total, currency, charge_id, created_at
            FROM storefront.order
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.with_items(rows).await
    }
}
