//! User repository for `PostgreSQL`.
//!
//! Also owns the password reset token table, since a token is only ever
//! consumed together with a password change.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use siqgarbs_core::{Email, PermissionSet, UserId};

use super::{RepositoryError, UserRepository, conflict_on_unique};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, email, name, permissions, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: String,
    name: String,
    permissions: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let permissions = PermissionSet::from_strings(&row.permissions).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid permission in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            email,
            name: row.name,
            permissions,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserWithPasswordRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

/// Repository for user database operations.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, UserWithPasswordRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM storefront.user WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some((User::try_from(r.user)?, r.password_hash))),
            None => Ok(None),
        }
    }

    async fn create(&self, new_user: NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            INSERT INTO storefront.user (email, name, password_hash, permissions)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&new_user.password_hash)
        .bind(new_user.permissions.to_strings())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email already exists"))?;

        User::try_from(row)
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn set_permissions(
        &self,
        id: UserId,
        permissions: &PermissionSet,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE storefront.user
            SET permissions = $2, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(permissions.to_strings())
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn store_reset_token(
        &self,
        user_id: UserId,
        token_hash: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.password_reset_token (user_id, token_hash, issued_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET token_hash = EXCLUDED.token_hash, issued_at = EXCLUDED.issued_at
            ",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(issued_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset_token_is_live(
        &self,
        token_hash: &str,
        issued_after: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let live: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1 FROM storefront.password_reset_token
                WHERE token_hash = $1 AND issued_at > $2
            )
            ",
        )
        .bind(token_hash)
        .bind(issued_after)
        .fetch_one(&self.pool)
        .await?;

        Ok(live)
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        issued_after: DateTime<Utc>,
        new_password_hash: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // The DELETE is the claim: a second consumer finds no row.
        let user_id: Option<UserId> = sqlx::query_scalar(
            r"
            DELETE FROM storefront.password_reset_token
            WHERE token_hash = $1 AND issued_at > $2
            RETURNING user_id
            ",
        )
        .bind(token_hash)
        .bind(issued_after)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE storefront.user
            SET password_hash = $2, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(user_id)
        .bind(new_password_hash)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        User::try_from(row).map(Some)
    }
}
