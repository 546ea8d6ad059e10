//! Checkout orchestration.
//!
//! Turns the caller's cart into a paid order:
//!
//! 1. Authenticate the caller.
//! 2. Load the cart from the data store. Client-side carts and amounts are
//!    never consulted.
//! 3. Compute the total from live prices with checked arithmetic. An empty
//!    cart stops here, before any money moves.
//! 4. Capture the payment with a fresh idempotency key. Transient processor
//!    failures are retried with the same key.
//! 5. Write the order and take the purchased units out of the cart in one
//!    transaction. Only the quantities loaded in step 2 are removed, so an
//!    item added or incremented mid-checkout stays in the cart.
//!
//! # Reconciliation
//!
//! Step 5 can fail after step 4 took the money. Order writes are idempotent
//! on the processor charge id, so step 5 is retried a bounded number of
//! times. If every attempt fails the charge is refunded and the caller gets
//! [`ServiceError::Reconciliation`]. The failure is logged under the
//! `reconciliation` target and sent to Sentry as fatal, with the charge id,
//! so an operator can act if the refund did not go through either.
//!
//! Step 4 can also end without a clear answer: the processor stayed
//! unavailable through every retry, or answered with something unreadable.
//! The money may have moved, so that outcome is reported the same way with
//! the idempotency key in place of a charge id.

use std::time::Duration;

use siqgarbs_core::{CurrencyCode, Money};

use super::ServiceError;
use super::authz::require_caller;
use super::payment::{Charge, ChargeRequest, PaymentError, PaymentProcessor};
use crate::db::{CartRepository, OrderRepository, Stores};
use crate::models::{CartLine, CurrentUser, NewOrder, NewOrderItem, Order, PurchasedEntry};

/// Tunables for the checkout flow.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Currency every order is charged in.
    pub currency: CurrencyCode,
    /// Attempts at each processor call when it reports a transient failure.
    pub payment_attempts: u32,
    /// Attempts at writing the order after a successful capture.
    pub persist_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * backoff`.
    pub backoff: Duration,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: CurrencyCode::USD,
            payment_attempts: 3,
            persist_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Checkout service.
pub struct CheckoutService<'a> {
    carts: &'a dyn CartRepository,
    orders: &'a dyn OrderRepository,
    payments: &'a dyn PaymentProcessor,
    settings: &'a CheckoutSettings,
}

impl<'a> CheckoutService<'a> {
    /// Create a new checkout service.
    #[must_use]
    pub fn new(
        stores: &'a Stores,
        payments: &'a dyn PaymentProcessor,
        settings: &'a CheckoutSettings,
    ) -> Self {
        Self {
            carts: stores.carts.as_ref(),
            orders: stores.orders.as_ref(),
            payments,
            settings,
        }
    }

    /// Charge the caller for their cart and record the order.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` without a caller
    /// - `Validation` for a blank payment token or an out-of-range total
    /// - `EmptyCart` if there is nothing to buy (the processor is not called)
    /// - `PaymentDeclined` / `ProcessorUnavailable` if capture fails
    /// - `Reconciliation` if the charge went through but the order could not
    ///   be recorded
    #[tracing::instrument(skip(self, caller, payment_token), fields(user_id))]
    pub async fn checkout(
        &self,
        caller: Option<&CurrentUser>,
        payment_token: &str,
    ) -> Result<Order, ServiceError> {
        let caller = require_caller(caller)?;
        tracing::Span::current().record("user_id", tracing::field::display(caller.id));

        let payment_token = payment_token.trim();
        if payment_token.is_empty() {
            return Err(ServiceError::Validation(
                "payment token is required".to_owned(),
            ));
        }

        let lines = self.carts.lines_for_user(caller.id).await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        let total = compute_total(&lines)?;

        let charge = self
            .capture(&ChargeRequest {
                amount: total,
                currency: self.settings.currency,
                source_token: payment_token.to_owned(),
                idempotency_key: format!("checkout-{}", uuid::Uuid::new_v4()),
                description: format!("Order for {}", caller.email),
            })
            .await?;

        if charge.amount != total {
            tracing::error!(
                target: "reconciliation",
                charge_id = %charge.id,
                expected = total.minor_units(),
                captured = charge.amount.minor_units(),
                "Captured amount differs from order total, refunding"
            );
            let refunded = self.refund(&charge.id).await;
            return Err(if refunded {
                ServiceError::PaymentDeclined("captured amount did not match order total".to_owned())
            } else {
                self.report_unreconciled(caller, &charge, false)
            });
        }

        let new_order = NewOrder {
            user_id: caller.id,
            total,
            currency: self.settings.currency,
            charge_id: charge.id.clone(),
            items: lines.iter().map(NewOrderItem::from).collect(),
        };
        let purchased: Vec<PurchasedEntry> = lines.iter().map(PurchasedEntry::from).collect();

        let attempts = self.settings.persist_attempts.max(1);
        for attempt in 1..=attempts {
            match self
                .orders
                .create_and_clear_cart(&new_order, &purchased)
                .await
            {
                Ok(order) => {
                    tracing::info!(
                        order_id = %order.id,
                        charge_id = %order.charge_id,
                        total = order.total.minor_units(),
                        "Order placed"
                    );
                    return Ok(order);
                }
                Err(e) => {
                    tracing::warn!(
                        charge_id = %charge.id,
                        attempt,
                        error = %e,
                        "Failed to record order for captured charge"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.backoff * attempt).await;
                    }
                }
            }
        }

        let refunded = self.refund(&charge.id).await;
        Err(self.report_unreconciled(caller, &charge, refunded))
    }

    /// Capture a charge, retrying transient failures with the same key.
    async fn capture(&self, request: &ChargeRequest) -> Result<Charge, ServiceError> {
        let attempts = self.settings.payment_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.payments.charge(request).await {
                Ok(charge) => return Ok(charge),
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!(attempt, error = %e, "Payment processor unavailable, retrying");
                    tokio::time::sleep(self.settings.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) if e.is_ambiguous() => {
                    report_unknown_capture(request, attempt, &e);
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::info!(error = %e, "Payment not captured");
                    return Err(e.into());
                }
            }
        }
    }

    /// Refund a charge in full. Returns whether the refund went through.
    async fn refund(&self, charge_id: &str) -> bool {
        let key = format!("refund-{charge_id}");
        let attempts = self.settings.payment_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.payments.refund(charge_id, &key).await {
                Ok(()) => {
                    tracing::warn!(target: "reconciliation", charge_id, "Charge refunded");
                    return true;
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    tokio::time::sleep(self.settings.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(target: "reconciliation", charge_id, error = %e, "Refund failed");
                    return false;
                }
            }
        }
    }

    fn report_unreconciled(
        &self,
        caller: &CurrentUser,
        charge: &Charge,
        refunded: bool,
    ) -> ServiceError {
        tracing::error!(
            target: "reconciliation",
            user_id = %caller.id,
            charge_id = %charge.id,
            amount = charge.amount.minor_units(),
            currency = %self.settings.currency,
            refunded,
            "Payment captured without an order"
        );
        sentry::capture_message(
            &format!(
                "Payment {} captured without an order (refunded: {refunded})",
                charge.id
            ),
            sentry::Level::Fatal,
        );

        ServiceError::Reconciliation {
            charge_id: charge.id.clone(),
            refunded,
        }
    }
}

/// The last capture attempt may have taken the money without telling us.
/// The idempotency key is what an operator needs to look the charge up.
fn report_unknown_capture(request: &ChargeRequest, attempts: u32, error: &PaymentError) {
    tracing::error!(
        target: "reconciliation",
        idempotency_key = %request.idempotency_key,
        amount = request.amount.minor_units(),
        currency = %request.currency,
        attempts,
        error = %error,
        "Payment outcome unknown, charge may be captured without an order"
    );
    sentry::capture_message(
        &format!(
            "Payment {} outcome unknown after {attempts} attempts: {error}",
            request.idempotency_key
        ),
        sentry::Level::Fatal,
    );
}

/// Sum of live price times quantity over the cart.
///
/// # Errors
///
/// Returns `ServiceError::Validation` on overflow or a non-positive total.
pub fn compute_total(lines: &[CartLine]) -> Result<Money, ServiceError> {
    let out_of_range = || ServiceError::Validation("order total is out of range".to_owned());

    let total = lines.iter().try_fold(Money::ZERO, |acc, line| {
        line.line_total()
            .and_then(|line_total| acc.checked_add(line_total))
            .ok_or_else(out_of_range)
    })?;

    if total.minor_units() <= 0 {
        return Err(ServiceError::Validation(
            "order total must be greater than zero".to_owned(),
        ));
    }
    Ok(total)
}
