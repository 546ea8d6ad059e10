//! Integration test support for the SiqGarbs storefront.
//!
//! Tests run in-process against [`MemoryStore`] with test doubles for the
//! payment processor and mailer, so no database, Stripe account, or SMTP
//! relay is needed:
//!
//! ```bash
//! cargo test -p siqgarbs-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart` - merge and ownership rules
//! - `checkout` - totals, retries, and reconciliation under injected faults
//! - `password_reset` - token lifetime and single use
//! - `permissions` - user administration
//! - `http` - the router end to end via `tower::ServiceExt::oneshot`

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use secrecy::SecretString;
use siqgarbs_core::{CurrencyCode, Email, Money, OrderId, PermissionSet, UserId};
use siqgarbs_storefront::{
    build_router,
    config::{StorefrontConfig, StripeConfig},
    db::{MemoryStore, OrderRepository, RepositoryError, Stores},
    models::{CurrentUser, Item, NewItem, NewOrder, NewUser, Order, PurchasedEntry},
    services::{
        CatalogService, Charge, ChargeRequest, CheckoutSettings, MailError, Mailer, OutgoingEmail,
        PaymentError, PaymentProcessor,
    },
    state::AppState,
};

/// Frontend URL used in reset links.
pub const FRONTEND_URL: &str = "https://shop.siqgarbs.test";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Payment processor double
// =============================================================================

/// Payment processor that replays scripted outcomes and records every call.
///
/// With an empty script, charges succeed for exactly the requested amount
/// and refunds succeed.
#[derive(Default)]
pub struct ScriptedProcessor {
    charge_script: Mutex<VecDeque<Result<Option<Money>, PaymentError>>>,
    refund_script: Mutex<VecDeque<Result<(), PaymentError>>>,
    charges: Mutex<Vec<ChargeRequest>>,
    refunds: Mutex<Vec<(String, String)>>,
}

impl ScriptedProcessor {
    /// Queue a charge failure.
    pub fn fail_next_charge(&self, error: PaymentError) {
        lock(&self.charge_script).push_back(Err(error));
    }

    /// Queue a successful charge that reports `amount` as captured.
    pub fn capture_next_as(&self, amount: Money) {
        lock(&self.charge_script).push_back(Ok(Some(amount)));
    }

    /// Queue a refund failure.
    pub fn fail_next_refund(&self, error: PaymentError) {
        lock(&self.refund_script).push_back(Err(error));
    }

    /// Every charge request received, in order.
    pub fn charges(&self) -> Vec<ChargeRequest> {
        lock(&self.charges).clone()
    }

    /// Every refund received as `(charge_id, idempotency_key)`.
    pub fn refunds(&self) -> Vec<(String, String)> {
        lock(&self.refunds).clone()
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedProcessor {
    async fn charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError> {
        lock(&self.charges).push(request.clone());

        let captured = match lock(&self.charge_script).pop_front() {
            Some(Err(e)) => return Err(e),
            Some(Ok(Some(amount))) => amount,
            Some(Ok(None)) | None => request.amount,
        };

        // Retries share an idempotency key, so they share a charge id too.
        Ok(Charge {
            id: format!("ch_{}", request.idempotency_key.replace('-', "")),
            amount: captured,
        })
    }

    async fn refund(&self, charge_id: &str, idempotency_key: &str) -> Result<(), PaymentError> {
        lock(&self.refunds).push((charge_id.to_owned(), idempotency_key.to_owned()));
        lock(&self.refund_script).pop_front().unwrap_or(Ok(()))
    }
}

// =============================================================================
// Mailer double
// =============================================================================

/// Mailer that keeps every message.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl RecordingMailer {
    /// A mailer whose every send fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        lock(&self.sent).clone()
    }

    /// The reset token from the most recent reset email to `to`.
    pub fn reset_token_for(&self, to: &str) -> Option<String> {
        lock(&self.sent)
            .iter()
            .rev()
            .find(|email| email.to == to)
            .and_then(|email| {
                let (_, rest) = email.text.split_once("resetToken=")?;
                Some(
                    rest.chars()
                        .take_while(char::is_ascii_hexdigit)
                        .collect::<String>(),
                )
            })
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        lock(&self.sent).push(email.clone());
        if self.fail {
            return Err(MailError::InvalidAddress(email.to));
        }
        Ok(())
    }
}

// =============================================================================
// Order store with injected faults
// =============================================================================

/// Order repository whose first `failures` writes fail.
pub struct FlakyOrders {
    inner: Arc<MemoryStore>,
    failures: AtomicU32,
    writes: AtomicU32,
}

impl FlakyOrders {
    /// Fail the next `failures` writes, then delegate to `inner`.
    #[must_use]
    pub const fn new(inner: Arc<MemoryStore>, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
            writes: AtomicU32::new(0),
        }
    }

    /// Write attempts seen, failed or not.
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderRepository for FlakyOrders {
    async fn create_and_clear_cart(
        &self,
        new_order: &NewOrder,
        purchased: &[PurchasedEntry],
    ) -> Result<Order, RepositoryError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RepositoryError::Unavailable("injected fault".to_owned()));
        }
        self.inner
            .create_and_clear_cart(new_order, purchased)
            .await
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::find(self.inner.as_ref(), id).await
    }

    async fn find_by_charge_id(&self, charge_id: &str) -> Result<Option<Order>, RepositoryError> {
        self.inner.find_by_charge_id(charge_id).await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        self.inner.list_for_user(user_id).await
    }
}

// =============================================================================
// Test context
// =============================================================================

/// Configuration with test secrets and no external services.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused"),
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 4444,
        frontend_url: FRONTEND_URL.to_owned(),
        session_secret: SecretString::from("k3Vq9xPz7LmN2bRt8wYc4HjD6fGs1AeU"),
        currency: CurrencyCode::USD,
        stripe: StripeConfig {
            secret_key: SecretString::from("sk_test_unused"),
            api_base: "http://127.0.0.1:9".to_owned(),
            max_retries: 3,
        },
        checkout_persist_attempts: 3,
        email: None,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// Checkout settings without sleeps between attempts.
#[must_use]
pub fn fast_checkout() -> CheckoutSettings {
    CheckoutSettings {
        backoff: Duration::ZERO,
        ..CheckoutSettings::default()
    }
}

/// One in-process storefront.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub stores: Stores,
    pub payments: Arc<ScriptedProcessor>,
    pub mailer: Arc<RecordingMailer>,
    pub state: AppState,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// Fresh store, processor, and mailer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mailer(RecordingMailer::default())
    }

    /// Fresh context using `mailer`.
    #[must_use]
    pub fn with_mailer(mailer: RecordingMailer) -> Self {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::memory(&store);
        Self::assemble(store, stores, Arc::new(mailer))
    }

    /// Fresh context whose order writes fail `failures` times first.
    #[must_use]
    pub fn with_flaky_orders(failures: u32) -> (Self, Arc<FlakyOrders>) {
        let store = Arc::new(MemoryStore::new());
        let orders = Arc::new(FlakyOrders::new(store.clone(), failures));
        let stores = Stores {
            orders: orders.clone(),
            ..Stores::memory(&store)
        };
        let ctx = Self::assemble(store, stores, Arc::new(RecordingMailer::default()));
        (ctx, orders)
    }

    fn assemble(store: Arc<MemoryStore>, stores: Stores, mailer: Arc<RecordingMailer>) -> Self {
        let payments = Arc::new(ScriptedProcessor::default());
        let state = AppState::new(test_config(), stores.clone(), payments.clone(), mailer.clone())
            .with_checkout_settings(fast_checkout());
        Self {
            store,
            stores,
            payments,
            mailer,
            state,
        }
    }

    /// The full router over this context.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Insert a user directly (no password hashing) with `{USER}`.
    ///
    /// # Panics
    ///
    /// Panics if the email is malformed or taken.
    pub async fn user(&self, email: &str) -> CurrentUser {
        self.user_with(email, PermissionSet::new_account()).await
    }

    /// Insert a user directly with the given permissions.
    ///
    /// # Panics
    ///
    /// Panics if the email is malformed or taken.
    pub async fn user_with(&self, email: &str, permissions: PermissionSet) -> CurrentUser {
        let email = Email::parse(email).unwrap_or_else(|e| panic!("bad test email: {e}"));
        let user = self
            .stores
            .users
            .create(NewUser {
                name: email.as_str().split('@').next().unwrap_or("shopper").to_owned(),
                email,
                password_hash: "not-a-real-hash".to_owned(),
                permissions,
            })
            .await
            .unwrap_or_else(|e| panic!("creating test user failed: {e}"));
        CurrentUser::from(user)
    }

    /// List an item owned by `owner`.
    ///
    /// # Panics
    ///
    /// Panics if the catalog rejects the item.
    pub async fn item(&self, owner: &CurrentUser, title: &str, price: i64) -> Item {
        CatalogService::new(&self.stores)
            .create_item(
                owner,
                NewItem {
                    title: title.to_owned(),
                    description: String::new(),
                    price: Money::from_minor(price),
                    image: None,
                    large_image: None,
                },
            )
            .await
            .unwrap_or_else(|e| panic!("creating test item failed: {e}"))
    }

    /// `Cookie` header value carrying a fresh session for `user`.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    #[must_use]
    pub fn session_cookie(&self, user: &CurrentUser) -> String {
        let token = self
            .state
            .sessions()
            .issue(user.id)
            .unwrap_or_else(|e| panic!("issuing session failed: {e}"));
        format!("token={token}")
    }
}
