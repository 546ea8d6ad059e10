//! Checkout totals, processor retries, and reconciliation.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use async_trait::async_trait;
use siqgarbs_core::{ItemId, Money, UserId};
use siqgarbs_integration_tests::{TestContext, fast_checkout};
use siqgarbs_storefront::db::{CartRepository, MemoryStore};
use siqgarbs_storefront::models::{CurrentUser, Order};
use siqgarbs_storefront::services::{
    CartService, CatalogService, Charge, ChargeRequest, CheckoutService, OrderService,
    PaymentError, PaymentProcessor, ServiceError,
};

/// Processor that lets the shopper keep adding to their cart while the
/// charge is in flight.
struct ShopperKeepsShopping {
    store: Arc<MemoryStore>,
    buyer: UserId,
    adds: Vec<ItemId>,
}

#[async_trait]
impl PaymentProcessor for ShopperKeepsShopping {
    async fn charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError> {
        for item in &self.adds {
            self.store.add_or_increment(self.buyer, *item).await.unwrap();
        }
        Ok(Charge {
            id: "ch_in_flight".to_owned(),
            amount: request.amount,
        })
    }

    async fn refund(&self, _charge_id: &str, _idempotency_key: &str) -> Result<(), PaymentError> {
        Ok(())
    }
}

/// Two of a 500 item and one of a 300 item.
async fn fill_cart(ctx: &TestContext, buyer: &CurrentUser) {
    let seller = ctx.user("seller@shop.test").await;
    let shirt = ctx.item(&seller, "Shirt", 500).await;
    let mug = ctx.item(&seller, "Mug", 300).await;

    let carts = CartService::new(&ctx.stores);
    carts.add_to_cart(buyer, shirt.id).await.unwrap();
    carts.add_to_cart(buyer, shirt.id).await.unwrap();
    carts.add_to_cart(buyer, mug.id).await.unwrap();
}

async fn checkout(ctx: &TestContext, buyer: &CurrentUser) -> Result<Order, ServiceError> {
    let settings = fast_checkout();
    CheckoutService::new(&ctx.stores, ctx.payments.as_ref(), &settings)
        .checkout(Some(buyer), "tok_visa")
        .await
}

#[tokio::test]
async fn test_checkout_charges_server_total_and_clears_cart() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    fill_cart(&ctx, &buyer).await;

    let order = checkout(&ctx, &buyer).await.unwrap();

    assert_eq!(order.total, Money::from_minor(1300));
    assert_eq!(order.user_id, buyer.id);
    assert_eq!(order.items.len(), 2);
    let shirts = order.items.iter().find(|i| i.title == "Shirt").unwrap();
    assert_eq!(shirts.quantity, 2);
    assert_eq!(shirts.price, Money::from_minor(500));

    let charges = ctx.payments.charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].amount, Money::from_minor(1300));
    assert_eq!(charges[0].source_token, "tok_visa");
    assert_eq!(order.charge_id, format!("ch_{}", charges[0].idempotency_key.replace('-', "")));

    assert!(CartService::new(&ctx.stores).cart(&buyer).await.unwrap().is_empty());
    let history = OrderService::new(&ctx.stores).orders(&buyer).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, order.id);
}

#[tokio::test]
async fn test_order_snapshot_survives_item_changes() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    let seller = ctx.user("seller@shop.test").await;
    let lamp = ctx.item(&seller, "Lamp", 2500).await;
    CartService::new(&ctx.stores)
        .add_to_cart(&buyer, lamp.id)
        .await
        .unwrap();

    let order = checkout(&ctx, &buyer).await.unwrap();

    CatalogService::new(&ctx.stores)
        .delete_item(&seller, lamp.id)
        .await
        .unwrap();

    let stored = OrderService::new(&ctx.stores)
        .order(&buyer, order.id)
        .await
        .unwrap();
    assert_eq!(stored.items[0].title, "Lamp");
    assert_eq!(stored.total, Money::from_minor(2500));
}

#[tokio::test]
async fn test_empty_cart_never_reaches_the_processor() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;

    let result = checkout(&ctx, &buyer).await;

    assert!(matches!(result, Err(ServiceError::EmptyCart)));
    assert!(ctx.payments.charges().is_empty());
}

#[tokio::test]
async fn test_anonymous_checkout_is_unauthenticated() {
    let ctx = TestContext::new();
    let settings = fast_checkout();

    let result = CheckoutService::new(&ctx.stores, ctx.payments.as_ref(), &settings)
        .checkout(None, "tok_visa")
        .await;

    assert!(matches!(result, Err(ServiceError::Unauthenticated)));
    assert!(ctx.payments.charges().is_empty());
}

#[tokio::test]
async fn test_transient_processor_failure_is_retried_with_same_key() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    fill_cart(&ctx, &buyer).await;
    ctx.payments
        .fail_next_charge(PaymentError::Unavailable("503".to_owned()));

    let order = checkout(&ctx, &buyer).await.unwrap();

    let charges = ctx.payments.charges();
    assert_eq!(charges.len(), 2);
    assert_eq!(charges[0].idempotency_key, charges[1].idempotency_key);
    assert_eq!(order.total, Money::from_minor(1300));
}

#[tokio::test]
async fn test_decline_is_not_retried_and_keeps_cart() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    fill_cart(&ctx, &buyer).await;
    ctx.payments
        .fail_next_charge(PaymentError::Declined("card_declined".to_owned()));

    let result = checkout(&ctx, &buyer).await;

    assert!(matches!(result, Err(ServiceError::PaymentDeclined(_))));
    assert_eq!(ctx.payments.charges().len(), 1);
    assert_eq!(ctx.store.order_count().await, 0);
    assert_eq!(CartService::new(&ctx.stores).cart(&buyer).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_processor_outage_gives_up_after_bounded_attempts() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    fill_cart(&ctx, &buyer).await;
    for _ in 0..3 {
        ctx.payments
            .fail_next_charge(PaymentError::Unavailable("timeout".to_owned()));
    }

    let result = checkout(&ctx, &buyer).await;

    assert!(matches!(result, Err(ServiceError::ProcessorUnavailable)));
    assert_eq!(ctx.payments.charges().len(), 3);
    assert_eq!(ctx.store.order_count().await, 0);
}

#[tokio::test]
async fn test_persistence_retry_reaches_success_without_refund() {
    let (ctx, orders) = TestContext::with_flaky_orders(2);
    let buyer = ctx.user("buyer@shop.test").await;
    fill_cart(&ctx, &buyer).await;

    let order = checkout(&ctx, &buyer).await.unwrap();

    assert_eq!(orders.writes(), 3);
    assert_eq!(order.total, Money::from_minor(1300));
    assert_eq!(ctx.payments.charges().len(), 1);
    assert!(ctx.payments.refunds().is_empty());
    assert!(CartService::new(&ctx.stores).cart(&buyer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_persistent_persistence_failure_refunds_the_charge() {
    let (ctx, orders) = TestContext::with_flaky_orders(u32::MAX);
    let buyer = ctx.user("buyer@shop.test").await;
    fill_cart(&ctx, &buyer).await;

    let result = checkout(&ctx, &buyer).await;

    let Err(ServiceError::Reconciliation {
        charge_id,
        refunded,
    }) = result
    else {
        panic!("expected a reconciliation failure, got {result:?}");
    };
    assert!(refunded);
    assert_eq!(orders.writes(), 3);
    assert_eq!(
        ctx.payments.refunds(),
        vec![(charge_id.clone(), format!("refund-{charge_id}"))]
    );

    // Nothing was recorded, so the shopper can try again.
    assert_eq!(ctx.store.order_count().await, 0);
    assert_eq!(CartService::new(&ctx.stores).cart(&buyer).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_refund_is_reported_as_unrefunded() {
    let (ctx, _orders) = TestContext::with_flaky_orders(u32::MAX);
    let buyer = ctx.user("buyer@shop.test").await;
    fill_cart(&ctx, &buyer).await;
    ctx.payments
        .fail_next_refund(PaymentError::Unexpected("refund rejected".to_owned()));

    let result = checkout(&ctx, &buyer).await;

    assert!(matches!(
        result,
        Err(ServiceError::Reconciliation {
            refunded: false,
            ..
        })
    ));
    assert_eq!(ctx.payments.refunds().len(), 1);
}

#[tokio::test]
async fn test_captured_amount_mismatch_is_refunded() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    fill_cart(&ctx, &buyer).await;
    ctx.payments.capture_next_as(Money::from_minor(999));

    let result = checkout(&ctx, &buyer).await;

    assert!(matches!(result, Err(ServiceError::PaymentDeclined(_))));
    assert_eq!(ctx.payments.refunds().len(), 1);
    assert_eq!(ctx.store.order_count().await, 0);
}

#[tokio::test]
async fn test_blank_payment_token_is_rejected_before_charging() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    fill_cart(&ctx, &buyer).await;
    let settings = fast_checkout();

    let result = CheckoutService::new(&ctx.stores, ctx.payments.as_ref(), &settings)
        .checkout(Some(&buyer), "   ")
        .await;

    assert!(matches!(result, Err(ServiceError::Validation(_))));
    assert!(ctx.payments.charges().is_empty());
}

#[tokio::test]
async fn test_order_visible_to_owner_and_admin_only() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    let stranger = ctx.user("stranger@shop.test").await;
    let admin = ctx
        .user_with(
            "admin@shop.test",
            [siqgarbs_core::Permission::Admin].into_iter().collect(),
        )
        .await;
    fill_cart(&ctx, &buyer).await;
    let order = checkout(&ctx, &buyer).await.unwrap();
    let orders = OrderService::new(&ctx.stores);

    assert_eq!(orders.order(&buyer, order.id).await.unwrap().id, order.id);
    assert_eq!(orders.order(&admin, order.id).await.unwrap().id, order.id);
    assert!(matches!(
        orders.order(&stranger, order.id).await,
        Err(ServiceError::Forbidden)
    ));
    assert!(orders.orders(&stranger).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_items_added_during_checkout_stay_in_the_cart() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    let seller = ctx.user("seller@shop.test").await;
    let shirt = ctx.item(&seller, "Shirt", 500).await;
    let mug = ctx.item(&seller, "Mug", 300).await;
    let carts = CartService::new(&ctx.stores);
    carts.add_to_cart(&buyer, shirt.id).await.unwrap();

    let processor = ShopperKeepsShopping {
        store: ctx.store.clone(),
        buyer: buyer.id,
        adds: vec![shirt.id, mug.id],
    };
    let settings = fast_checkout();
    let order = CheckoutService::new(&ctx.stores, &processor, &settings)
        .checkout(Some(&buyer), "tok_visa")
        .await
        .unwrap();

    assert_eq!(order.total, Money::from_minor(500));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 1);

    let mut left: Vec<(String, i32)> = carts
        .cart(&buyer)
        .await
        .unwrap()
        .into_iter()
        .map(|line| (line.item.title, line.entry.quantity))
        .collect();
    left.sort();
    assert_eq!(left, vec![("Mug".to_owned(), 1), ("Shirt".to_owned(), 1)]);
}

#[tokio::test]
async fn test_unreadable_capture_response_is_replayed_with_same_key() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    fill_cart(&ctx, &buyer).await;
    ctx.payments.fail_next_charge(PaymentError::Unavailable(
        "charge response undecodable: EOF while parsing".to_owned(),
    ));

    let order = checkout(&ctx, &buyer).await.unwrap();

    let charges = ctx.payments.charges();
    assert_eq!(charges.len(), 2);
    assert_eq!(charges[0].idempotency_key, charges[1].idempotency_key);
    assert_eq!(ctx.store.order_count().await, 1);
    assert_eq!(order.total, Money::from_minor(1300));
    assert!(ctx.payments.refunds().is_empty());
}

#[tokio::test]
async fn test_unknown_capture_outcome_keeps_cart_and_records_nothing() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    fill_cart(&ctx, &buyer).await;
    ctx.payments
        .fail_next_charge(PaymentError::Unexpected("HTTP 418".to_owned()));

    let result = checkout(&ctx, &buyer).await;

    assert!(matches!(result, Err(ServiceError::Internal(_))));
    assert_eq!(ctx.payments.charges().len(), 1);
    assert_eq!(ctx.store.order_count().await, 0);
    assert_eq!(CartService::new(&ctx.stores).cart(&buyer).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_free_cart_is_rejected_before_payment() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    let seller = ctx.user("seller@shop.test").await;
    let sticker = ctx.item(&seller, "Sticker", 0).await;
    CartService::new(&ctx.stores)
        .add_to_cart(&buyer, sticker.id)
        .await
        .unwrap();

    let result = checkout(&ctx, &buyer).await;

    assert!(matches!(result, Err(ServiceError::Validation(_))));
    assert!(ctx.payments.charges().is_empty());
    assert_eq!(CartService::new(&ctx.stores).cart(&buyer).await.unwrap().len(), 1);
}
