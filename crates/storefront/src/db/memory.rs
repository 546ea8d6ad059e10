//! In-process data store.
//!
//! Implements every repository trait over plain collections behind one
//! async mutex, so each trait method is a single critical section. Used by
//! the unit and integration test suites, and handy for running the HTTP
//! surface without a database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use siqgarbs_core::{
    CartEntryId, Email, ItemId, OrderId, OrderItemId, PermissionSet, UserId,
};

use super::{CartRepository, ItemRepository, OrderRepository, RepositoryError, UserRepository};
use crate::models::{
    CartEntry, CartLine, Item, ItemUpdate, NewItem, NewOrder, NewUser, Order, OrderItem,
    PurchasedEntry, User,
};

#[derive(Debug)]
struct StoredUser {
    user: User,
    password_hash: String,
}

#[derive(Debug)]
struct StoredResetToken {
    token_hash: String,
    issued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i32,
    users: BTreeMap<UserId, StoredUser>,
    reset_tokens: BTreeMap<UserId, StoredResetToken>,
    items: BTreeMap<ItemId, Item>,
    cart: BTreeMap<CartEntryId, CartEntry>,
    orders: BTreeMap<OrderId, Order>,
}

impl Inner {
    // One counter for every table keeps ids unique and increasing.
    fn next_id(&mut self) -> Result<i32, RepositoryError> {
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| RepositoryError::Unavailable("id space exhausted".to_owned()))?;
        Ok(self.next_id)
    }
}

/// Data store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Password hash stored for a user, if any.
    pub async fn password_hash(&self, id: UserId) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.users.get(&id).map(|u| u.password_hash.clone())
    }

    /// Overwrite when a user's reset token was issued.
    ///
    /// Lets tests age a token without waiting an hour.
    pub async fn backdate_reset_token(&self, user_id: UserId, issued_at: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().await;
        inner
            .reset_tokens
            .get_mut(&user_id)
            .map(|token| token.issued_at = issued_at)
            .is_some()
    }

    /// Number of cart entries across all users.
    pub async fn cart_entry_count(&self) -> usize {
        self.inner.lock().await.cart.len()
    }

    /// Number of orders across all users.
    pub async fn order_count(&self) -> usize {
        self.inner.lock().await.orders.len()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&id).map(|u| u.user.clone()))
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|u| &u.user.email == email)
            .map(|u| u.user.clone()))
    }

    async fn find_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|u| &u.user.email == email)
            .map(|u| (u.user.clone(), u.password_hash.clone())))
    }

    async fn create(&self, new_user: NewUser) -> Result<User, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner.users.values().any(|u| u.user.email == new_user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let now = Utc::now();
        let user = User {
            id: UserId::new(inner.next_id()?),
            email: new_user.email,
            name: new_user.name,
            permissions: new_user.permissions,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash: new_user.password_hash,
            },
        );
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().map(|u| u.user.clone()).collect())
    }

    async fn set_permissions(
        &self,
        id: UserId,
        permissions: &PermissionSet,
    ) -> Result<Option<User>, RepositoryError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.users.get_mut(&id).map(|stored| {
            stored.user.permissions = permissions.clone();
            stored.user.updated_at = Utc::now();
            stored.user.clone()
        }))
    }

    async fn store_reset_token(
        &self,
        user_id: UserId,
        token_hash: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        if !inner.users.contains_key(&user_id) {
            return Err(RepositoryError::NotFound);
        }
        inner.reset_tokens.insert(
            user_id,
            StoredResetToken {
                token_hash: token_hash.to_owned(),
                issued_at,
            },
        );
        Ok(())
    }

    async fn reset_token_is_live(
        &self,
        token_hash: &str,
        issued_after: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .reset_tokens
            .values()
            .any(|t| t.token_hash == token_hash && t.issued_at > issued_after))
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        issued_after: DateTime<Utc>,
        new_password_hash: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let Some(user_id) = inner
            .reset_tokens
            .iter()
            .find(|(_, t)| t.token_hash == token_hash && t.issued_at > issued_after)
            .map(|(id, _)| *id)
        else {
            return Ok(None);
        };

        inner.reset_tokens.remove(&user_id);
        let stored = inner
            .users
            .get_mut(&user_id)
            .ok_or(RepositoryError::NotFound)?;
        new_password_hash.clone_into(&mut stored.password_hash);
        stored.user.updated_at = Utc::now();
        Ok(Some(stored.user.clone()))
    }
}

#[async_trait]
impl ItemRepository for MemoryStore {
    async fn create(&self, owner: UserId, new_item: NewItem) -> Result<Item, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if !inner.users.contains_key(&owner) {
            return Err(RepositoryError::NotFound);
        }

        let now = Utc::now();
        let item = Item {
            id: ItemId::new(inner.next_id()?),
            user_id: owner,
            title: new_item.title,
            description: new_item.description,
            price: new_item.price,
            image: new_item.image,
            large_image: new_item.large_image,
            created_at: now,
            updated_at: now,
        };
        inner.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn find(&self, id: ItemId) -> Result<Option<Item>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.items.get(&id).cloned())
    }

    async fn update(
        &self,
        id: ItemId,
        update: &ItemUpdate,
    ) -> Result<Option<Item>, RepositoryError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.items.get_mut(&id).map(|item| {
            update.apply_to(item);
            item.updated_at = Utc::now();
            item.clone()
        }))
    }

    async fn delete(&self, id: ItemId) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner.items.remove(&id).is_none() {
            return Ok(false);
        }
        inner.cart.retain(|_, entry| entry.item_id != id);
        Ok(true)
    }

    async fn list(&self, limit: u32, offset: u64) -> Result<Vec<Item>, RepositoryError> {
        let inner = self.inner.lock().await;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        // Ids grow with creation time, so reverse id order is newest first.
        Ok(inner
            .items
            .values()
            .rev()
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.items.len() as u64)
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn add_or_increment(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<CartEntry, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if !inner.items.contains_key(&item_id) || !inner.users.contains_key(&user_id) {
            return Err(RepositoryError::NotFound);
        }

        if let Some(entry) = inner
            .cart
            .values_mut()
            .find(|e| e.user_id == user_id && e.item_id == item_id)
        {
            entry.quantity = entry
                .quantity
                .checked_add(1)
                .ok_or_else(|| RepositoryError::Conflict("quantity overflow".to_owned()))?;
            return Ok(entry.clone());
        }

        let entry = CartEntry {
            id: CartEntryId::new(inner.next_id()?),
            user_id,
            item_id,
            quantity: 1,
            created_at: Utc::now(),
        };
        inner.cart.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn find_entry(&self, id: CartEntryId) -> Result<Option<CartEntry>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.cart.get(&id).cloned())
    }

    async fn delete_entry(&self, id: CartEntryId) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.cart.remove(&id).is_some())
    }

    async fn lines_for_user(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .cart
            .values()
            .filter(|e| e.user_id == user_id)
            .filter_map(|e| {
                inner.items.get(&e.item_id).map(|item| CartLine {
                    entry: e.clone(),
                    item: item.clone(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn create_and_clear_cart(
        &self,
        new_order: &NewOrder,
        purchased: &[PurchasedEntry],
    ) -> Result<Order, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .orders
            .values()
            .find(|o| o.charge_id == new_order.charge_id)
        {
            return Ok(existing.clone());
        }

        let order_id = OrderId::new(inner.next_id()?);
        let mut items = Vec::with_capacity(new_order.items.len());
        for item in &new_order.items {
            items.push(OrderItem {
                id: OrderItemId::new(inner.next_id()?),
                title: item.title.clone(),
                description: item.description.clone(),
                price: item.price,
                image: item.image.clone(),
                large_image: item.large_image.clone(),
                quantity: item.quantity,
            });
        }

        let order = Order {
            id: order_id,
            user_id: new_order.user_id,
            total: new_order.total,
            currency: new_order.currency,
            charge_id: new_order.charge_id.clone(),
            items,
            created_at: Utc::now(),
        };
        inner.orders.insert(order.id, order.clone());
        for bought in purchased {
            let Some(entry) = inner.cart.get_mut(&bought.id) else {
                continue;
            };
            if entry.user_id != new_order.user_id {
                continue;
            }
            if entry.quantity > bought.quantity {
                entry.quantity -= bought.quantity;
            } else {
                inner.cart.remove(&bought.id);
            }
        }

        Ok(order)
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn find_by_charge_id(&self, charge_id: &str) -> Result<Option<Order>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .orders
            .values()
            .find(|o| o.charge_id == charge_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use siqgarbs_core::{CurrencyCode, Money};

    use super::*;
    use crate::models::NewOrderItem;

    async fn seed(store: &MemoryStore) -> (User, Item) {
        let user = UserRepository::create(
            store,
            NewUser {
                email: Email::parse("shopper@example.com").unwrap(),
                name: "Shopper".to_owned(),
                password_hash: "hash".to_owned(),
                permissions: PermissionSet::new_account(),
            },
        )
        .await
        .unwrap();
        let item = ItemRepository::create(
            store,
            user.id,
            NewItem {
                title: "Hoodie".to_owned(),
                description: String::new(),
                price: Money::from_minor(500),
                image: None,
                large_image: None,
            },
        )
        .await
        .unwrap();
        (user, item)
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        seed(&store).await;
        let err = UserRepository::create(
            &store,
            NewUser {
                email: Email::parse("SHOPPER@example.com").unwrap(),
                name: "Again".to_owned(),
                password_hash: "hash".to_owned(),
                permissions: PermissionSet::new_account(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_adds_merge_into_one_entry() {
        let store = Arc::new(MemoryStore::new());
        let (user, item) = seed(&store).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.add_or_increment(user.id, item.id).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let lines = store.lines_for_user(user.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].entry.quantity, 10);
    }

    #[tokio::test]
    async fn test_order_creation_is_idempotent_on_charge_id() {
        let store = MemoryStore::new();
        let (user, item) = seed(&store).await;
        let entry = store.add_or_increment(user.id, item.id).await.unwrap();

        let new_order = NewOrder {
            user_id: user.id,
            total: Money::from_minor(500),
            currency: CurrencyCode::USD,
            charge_id: "ch_1".to_owned(),
            items: vec![NewOrderItem {
                title: "Hoodie".to_owned(),
                description: String::new(),
                price: Money::from_minor(500),
                image: None,
                large_image: None,
                quantity: 1,
            }],
        };

        let purchased = [PurchasedEntry {
            id: entry.id,
            quantity: 1,
        }];
        let first = store
            .create_and_clear_cart(&new_order, &purchased)
            .await
            .unwrap();
        let second = store
            .create_and_clear_cart(&new_order, &purchased)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.cart_entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_order_leaves_units_added_after_the_cart_was_loaded() {
        let store = MemoryStore::new();
        let (user, item) = seed(&store).await;
        let entry = store.add_or_increment(user.id, item.id).await.unwrap();
        store.add_or_increment(user.id, item.id).await.unwrap();

        let new_order = NewOrder {
            user_id: user.id,
            total: Money::from_minor(500),
            currency: CurrencyCode::USD,
            charge_id: "ch_2".to_owned(),
            items: vec![],
        };
        store
            .create_and_clear_cart(
                &new_order,
                &[PurchasedEntry {
                    id: entry.id,
                    quantity: 1,
                }],
            )
            .await
            .unwrap();

        let lines = store.lines_for_user(user.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].entry.id, entry.id);
        assert_eq!(lines[0].entry.quantity, 1);
    }

    #[tokio::test]
    async fn test_deleting_item_removes_cart_entries() {
        let store = MemoryStore::new();
        let (user, item) = seed(&store).await;
        store.add_or_increment(user.id, item.id).await.unwrap();

        assert!(ItemRepository::delete(&store, item.id).await.unwrap());
        assert_eq!(store.cart_entry_count().await, 0);
        assert!(!ItemRepository::delete(&store, item.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_token_is_single_use() {
        let store = MemoryStore::new();
        let (user, _) = seed(&store).await;
        let issued = Utc::now();
        store.store_reset_token(user.id, "digest", issued).await.unwrap();

        let cutoff = issued - chrono::Duration::hours(1);
        assert!(store.reset_token_is_live("digest", cutoff).await.unwrap());
        assert!(!store.reset_token_is_live("digest", issued).await.unwrap());
        assert!(!store.reset_token_is_live("other", cutoff).await.unwrap());
        let consumed = store
            .consume_reset_token("digest", cutoff, "new-hash")
            .await
            .unwrap();
        assert_eq!(consumed.map(|u| u.id), Some(user.id));
        assert_eq!(store.password_hash(user.id).await.unwrap(), "new-hash");

        let again = store
            .consume_reset_token("digest", cutoff, "other")
            .await
            .unwrap();
        assert!(again.is_none());
        assert!(!store.reset_token_is_live("digest", cutoff).await.unwrap());
    }
}
