//! Data store access for the storefront.
//!
//! # Database: `storefront` schema
//!
//! The data store owns every record; services borrow it through the
//! repository traits below and never hold records between requests.
//!
//! ## Tables
//!
//! - `user` - Accounts, argon2 password hashes, permission tags
//! - `password_reset_token` - At most one SHA-256 token digest per user
//! - `item` - Catalog items (prices in minor units)
//! - `cart_entry` - One row per (user, item) with an accumulated quantity
//! - `order` / `order_item` - Paid orders and their item snapshots
//!
//! # Implementations
//!
//! - [`PgUserRepository`] and friends run against `PostgreSQL` via `sqlx`.
//! - [`MemoryStore`] keeps everything in process and backs the test suites.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p siqgarbs-cli -- migrate
//! ```

pub mod cart;
pub mod items;
pub mod memory;
pub mod orders;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use siqgarbs_core::{CartEntryId, Email, ItemId, OrderId, PermissionSet, UserId};

use crate::models::{
    CartEntry, CartLine, Item, ItemUpdate, NewItem, NewOrder, NewUser, Order, PurchasedEntry,
    User,
};

pub use cart::PgCartRepository;
pub use items::PgItemRepository;
pub use memory::MemoryStore;
pub use orders::PgOrderRepository;
pub use users::PgUserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique-constraint violation to [`RepositoryError::Conflict`].
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(what.to_owned());
    }
    RepositoryError::Database(err)
}

// =============================================================================
// Repository traits
// =============================================================================

/// Accounts and their password reset tokens.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Get a user by ID.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Get a user by normalized email.
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Get a user together with their password hash, for credential checks.
    async fn find_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    /// Insert an account. Fails with `Conflict` if the email is taken.
    async fn create(&self, new_user: NewUser) -> Result<User, RepositoryError>;

    /// All accounts, oldest first.
    async fn list(&self) -> Result<Vec<User>, RepositoryError>;

    /// Replace a user's permission set. Returns `None` for an unknown user.
    async fn set_permissions(
        &self,
        id: UserId,
        permissions: &PermissionSet,
    ) -> Result<Option<User>, RepositoryError>;

    /// Store the reset token digest for a user, replacing any previous one.
    async fn store_reset_token(
        &self,
        user_id: UserId,
        token_hash: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Whether an unused reset token with this digest was issued after
    /// `issued_after`. A cheap read that consumes nothing.
    async fn reset_token_is_live(
        &self,
        token_hash: &str,
        issued_after: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Atomically consume a reset token issued after `issued_after` and set
    /// the owner's password hash.
    ///
    /// Returns `None` when no such token exists. A consumed token can never
    /// match again.
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        issued_after: DateTime<Utc>,
        new_password_hash: &str,
    ) -> Result<Option<User>, RepositoryError>;
}

/// Catalog items.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Insert an item owned by `owner`.
    async fn create(&self, owner: UserId, new_item: NewItem) -> Result<Item, RepositoryError>;

    /// Get an item by ID.
    async fn find(&self, id: ItemId) -> Result<Option<Item>, RepositoryError>;

    /// Apply a partial update. Returns `None` for an unknown item.
    async fn update(&self, id: ItemId, update: &ItemUpdate)
    -> Result<Option<Item>, RepositoryError>;

    /// Delete an item and any cart entries pointing at it.
    ///
    /// Returns `false` if the item did not exist.
    async fn delete(&self, id: ItemId) -> Result<bool, RepositoryError>;

    /// One page of items, newest first.
    async fn list(&self, limit: u32, offset: u64) -> Result<Vec<Item>, RepositoryError>;

    /// Total number of items.
    async fn count(&self) -> Result<u64, RepositoryError>;
}

/// Cart entries.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Create the (user, item) entry with quantity 1, or increment it.
    ///
    /// Must be a single atomic step: two concurrent adds of the same item
    /// end with quantity + 2, never two rows.
    async fn add_or_increment(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<CartEntry, RepositoryError>;

    /// Get an entry by ID.
    async fn find_entry(&self, id: CartEntryId) -> Result<Option<CartEntry>, RepositoryError>;

    /// Delete an entry outright. Returns `false` if it did not exist.
    async fn delete_entry(&self, id: CartEntryId) -> Result<bool, RepositoryError>;

    /// A user's entries joined with live item data, oldest first.
    async fn lines_for_user(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError>;
}

/// Orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Write an order and take the purchased units out of the cart in one
    /// transaction.
    ///
    /// An entry whose quantity still equals the purchased quantity is
    /// deleted. An entry that grew after the cart was loaded keeps the
    /// difference. Only entries owned by `new_order.user_id` are touched.
    ///
    /// Idempotent on `new_order.charge_id`: if an order for that charge
    /// already exists it is returned unchanged and nothing else is touched.
    async fn create_and_clear_cart(
        &self,
        new_order: &NewOrder,
        purchased: &[PurchasedEntry],
    ) -> Result<Order, RepositoryError>;

    /// Get an order by ID.
    async fn find(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Get the order recorded for a processor charge.
    async fn find_by_charge_id(&self, charge_id: &str) -> Result<Option<Order>, RepositoryError>;

    /// A user's orders, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;
}

/// The set of repositories a request handler can reach.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserRepository>,
    pub items: Arc<dyn ItemRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub orders: Arc<dyn OrderRepository>,
}

impl Stores {
    /// Repositories backed by a `PostgreSQL` pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            items: Arc::new(PgItemRepository::new(pool.clone())),
            carts: Arc::new(PgCartRepository::new(pool.clone())),
            orders: Arc::new(PgOrderRepository::new(pool.clone())),
        }
    }

    /// Repositories backed by one shared in-process store.
    #[must_use]
    pub fn memory(store: &Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            items: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
        }
    }
}
