//! Cart repository for `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use siqgarbs_core::{CartEntryId, ItemId, UserId};

use super::items::ItemRow;
use super::{CartRepository, RepositoryError};
use crate::models::{CartEntry, CartLine, Item};

#[derive(sqlx::FromRow)]
struct CartEntryRow {
    id: CartEntryId,
    user_id: UserId,
    item_id: ItemId,
    quantity: i32,
    created_at: DateTime<Utc>,
}

impl From<CartEntryRow> for CartEntry {
    fn from(row: CartEntryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            item_id: row.item_id,
            quantity: row.quantity,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    entry_id: CartEntryId,
    entry_user_id: UserId,
    quantity: i32,
    entry_created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    item: ItemRow,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        let item = Item::from(row.item);
        Self {
            entry: CartEntry {
                id: row.entry_id,
                user_id: row.entry_user_id,
                item_id: item.id,
                quantity: row.quantity,
                created_at: row.entry_created_at,
            },
            item,
        }
    }
}

/// Repository for cart entries.
#[derive(Clone)]
pub struct PgCartRepository {
    pool: PgPool,
}

impl PgCartRepository {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartRepository for PgCartRepository {
    async fn add_or_increment(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<CartEntry, RepositoryError> {
        // One statement so concurrent adds serialize on the (user_id, item_id) key.
        let row = sqlx::query_as::<_, CartEntryRow>(
            r"
            INSERT INTO storefront.cart_entry (user_id, item_id, quantity)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id, item_id)
            DO UPDATE SET quantity = storefront.cart_entry.quantity + 1
            RETURNING id, user_id, item_id, quantity, created_at
            ",
        )
        .bind(user_id)
        .bind(item_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                RepositoryError::NotFound
            }
            other => RepositoryError::Database(other),
        })?;

        Ok(row.into())
    }

    async fn find_entry(&self, id: CartEntryId) -> Result<Option<CartEntry>, RepositoryError> {
        let row = sqlx::query_as::<_, CartEntryRow>(
            r"
            SELECT id, user_id, item_id, quantity, created_at
            FROM storefront.cart_entry
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CartEntry::from))
    }

    async fn delete_entry(&self, id: CartEntryId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.cart_entry WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn lines_for_user(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT ce.id AS entry_id,
                   ce.user_id AS entry_user_id,
                   ce.quantity,
                   ce.created_at AS entry_created_at,
                   i.id, i.user_id, i.title, i.description, i.price,
                   i.image, i.large_image, i.created_at, i.updated_at
            FROM storefront.cart_entry ce
            JOIN storefront.item i ON i.id = ce.item_id
            WHERE ce.user_id = $1
            ORDER BY ce.id
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CartLine::from).collect())
    }
}
