//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::config::StorefrontConfig;
use crate::db::Stores;
use crate::services::{CheckoutSettings, Mailer, PaymentProcessor, SessionManager};

/// Delay between checkout retries; attempt `n` waits `n` times this.
const CHECKOUT_BACKOFF: Duration = Duration::from_millis(200);

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the data store and configuration. Nothing in it
/// changes after startup.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Clone)]
struct AppStateInner {
    config: StorefrontConfig,
    stores: Stores,
    sessions: SessionManager,
    payments: Arc<dyn PaymentProcessor>,
    mailer: Arc<dyn Mailer>,
    checkout: CheckoutSettings,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `stores` - Data store repositories
    /// * `payments` - Payment processor
    /// * `mailer` - Outbound mail
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        stores: Stores,
        payments: Arc<dyn PaymentProcessor>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let sessions = SessionManager::new(&config.session_secret, config.is_secure());
        let checkout = CheckoutSettings {
            currency: config.currency,
            payment_attempts: config.stripe.max_retries,
            persist_attempts: config.checkout_persist_attempts,
            backoff: CHECKOUT_BACKOFF,
        };

        Self {
            inner: Arc::new(AppStateInner {
                config,
                stores,
                sessions,
                payments,
                mailer,
                checkout,
            }),
        }
    }

    /// Replace the checkout tunables.
    #[must_use]
    pub fn with_checkout_settings(self, checkout: CheckoutSettings) -> Self {
        let inner = Arc::unwrap_or_clone(self.inner);
        Self {
            inner: Arc::new(AppStateInner { checkout, ..inner }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get the data store repositories.
    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    /// Get the session token manager.
    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    /// Get the payment processor.
    #[must_use]
    pub fn payments(&self) -> &dyn PaymentProcessor {
        self.inner.payments.as_ref()
    }

    /// Get the outbound mailer.
    #[must_use]
    pub fn mailer(&self) -> &dyn Mailer {
        self.inner.mailer.as_ref()
    }

    /// Get the checkout tunables.
    #[must_use]
    pub fn checkout_settings(&self) -> &CheckoutSettings {
        &self.inner.checkout
    }
}
