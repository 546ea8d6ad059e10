//! Cart merge and ownership rules.

#![allow(clippy::unwrap_used)]

use siqgarbs_core::{CartEntryId, ItemId};
use siqgarbs_integration_tests::TestContext;
use siqgarbs_storefront::services::{CartService, ServiceError};

#[tokio::test]
async fn test_adding_same_item_twice_merges_into_one_entry() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller@shop.test").await;
    let buyer = ctx.user("buyer@shop.test").await;
    let shirt = ctx.item(&seller, "Shirt", 500).await;

    let carts = CartService::new(&ctx.stores);
    let first = carts.add_to_cart(&buyer, shirt.id).await.unwrap();
    let second = carts.add_to_cart(&buyer, shirt.id).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.quantity, 2);

    let lines = carts.cart(&buyer).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].item.title, "Shirt");
}

#[tokio::test]
async fn test_carts_are_per_user() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller@shop.test").await;
    let alice = ctx.user("alice@shop.test").await;
    let bob = ctx.user("bob@shop.test").await;
    let mug = ctx.item(&seller, "Mug", 300).await;

    let carts = CartService::new(&ctx.stores);
    let a = carts.add_to_cart(&alice, mug.id).await.unwrap();
    let b = carts.add_to_cart(&bob, mug.id).await.unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(a.quantity, 1);
    assert_eq!(b.quantity, 1);
}

#[tokio::test]
async fn test_adding_unknown_item_is_not_found() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;

    let result = CartService::new(&ctx.stores)
        .add_to_cart(&buyer, ItemId::new(404))
        .await;

    assert!(matches!(result, Err(ServiceError::NotFound("item"))));
    assert_eq!(ctx.store.cart_entry_count().await, 0);
}

#[tokio::test]
async fn test_removing_someone_elses_entry_is_forbidden_and_changes_nothing() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller@shop.test").await;
    let owner = ctx.user("owner@shop.test").await;
    let intruder = ctx.user("intruder@shop.test").await;
    let hat = ctx.item(&seller, "Hat", 700).await;

    let carts = CartService::new(&ctx.stores);
    carts.add_to_cart(&owner, hat.id).await.unwrap();
    let entry = carts.add_to_cart(&owner, hat.id).await.unwrap();

    let result = carts.remove_from_cart(&intruder, entry.id).await;
    assert!(matches!(result, Err(ServiceError::Forbidden)));

    let lines = carts.cart(&owner).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].entry.quantity, 2);
}

#[tokio::test]
async fn test_owner_removes_entry_outright() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller@shop.test").await;
    let owner = ctx.user("owner@shop.test").await;
    let hat = ctx.item(&seller, "Hat", 700).await;

    let carts = CartService::new(&ctx.stores);
    carts.add_to_cart(&owner, hat.id).await.unwrap();
    let entry = carts.add_to_cart(&owner, hat.id).await.unwrap();

    let removed = carts.remove_from_cart(&owner, entry.id).await.unwrap();
    assert_eq!(removed.quantity, 2);
    assert!(carts.cart(&owner).await.unwrap().is_empty());

    let again = carts.remove_from_cart(&owner, entry.id).await;
    assert!(matches!(again, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn test_removing_unknown_entry_is_not_found() {
    let ctx = TestContext::new();
    let owner = ctx.user("owner@shop.test").await;

    let result = CartService::new(&ctx.stores)
        .remove_from_cart(&owner, CartEntryId::new(99))
        .await;
    assert!(matches!(result, Err(ServiceError::NotFound("cart item"))));
}

#[tokio::test]
async fn test_concurrent_adds_never_split_the_entry() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller@shop.test").await;
    let buyer = ctx.user("buyer@shop.test").await;
    let sock = ctx.item(&seller, "Sock", 150).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let stores = ctx.stores.clone();
        let buyer = buyer.clone();
        tasks.push(tokio::spawn(async move {
            CartService::new(&stores)
                .add_to_cart(&buyer, sock.id)
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let lines = CartService::new(&ctx.stores).cart(&buyer).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].entry.quantity, 8);
}
