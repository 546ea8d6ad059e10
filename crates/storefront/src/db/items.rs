//! Item repository for `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use siqgarbs_core::{ItemId, Money, UserId};

use super::{ItemRepository, RepositoryError};
use crate::models::{Item, ItemUpdate, NewItem};

pub(super) const ITEM_COLUMNS: &str =
    "id, user_id, title, description, price, image, large_image, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(super) struct ItemRow {
    id: ItemId,
    user_id: UserId,
    title: String,
    description: String,
    price: Money,
    image: Option<String>,
    large_image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            price: row.price,
            image: row.image,
            large_image: row.large_image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for catalog items.
#[derive(Clone)]
pub struct PgItemRepository {
    pool: PgPool,
}

impl PgItemRepository {
    /// Create a new item repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    async fn create(&self, owner: UserId, new_item: NewItem) -> Result<Item, RepositoryError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r"
            INSERT INTO storefront.item (user_id, title, description, price, image, large_image)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ITEM_COLUMNS}
            "
        ))
        .bind(owner)
        .bind(&new_item.title)
        .bind(&new_item.description)
        .bind(new_item.price)
        .bind(&new_item.image)
        .bind(&new_item.large_image)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find(&self, id: ItemId) -> Result<Option<Item>, RepositoryError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM storefront.item WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Item::from))
    }

    async fn update(
        &self,
        id: ItemId,
        update: &ItemUpdate,
    ) -> Result<Option<Item>, RepositoryError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r"
            UPDATE storefront.item
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                image = COALESCE($5, image),
                large_image = COALESCE($6, large_image),
                updated_at = now()
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&update.title)
        .bind(&update.description)
        .bind(update.price)
        .bind(&update.image)
        .bind(&update.large_image)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Item::from))
    }

    async fn delete(&self, id: ItemId) -> Result<bool, RepositoryError> {
        // Cart entries go with the item via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM storefront.item WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, limit: u32, offset: u64) -> Result<Vec<Item>, RepositoryError> {
        let offset = i64::try_from(offset)
            .map_err(|_| RepositoryError::DataCorruption("page offset out of range".to_owned()))?;

        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            r"
            SELECT {ITEM_COLUMNS} FROM storefront.item
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "
        ))
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storefront.item")
            .fetch_one(&self.pool)
            .await?;

        u64::try_from(count)
            .map_err(|_| RepositoryError::DataCorruption(format!("negative item count: {count}")))
    }
}
