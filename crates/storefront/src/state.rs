//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::services::{Mailer, ObjectStorage, OrderFeed, StripeClient};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    storage: Arc<dyn ObjectStorage>,
    payments: Option<StripeClient>,
    order_feed: OrderFeed,
    mailer: Mailer,
}

impl AppState {
    /// Create a new application state.
    ///
    /// `payments` is `None` when no payment provider key is configured.
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        pool: PgPool,
        storage: Arc<dyn ObjectStorage>,
        payments: Option<StripeClient>,
        order_feed: OrderFeed,
        mailer: Mailer,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                storage,
                payments,
                order_feed,
                mailer,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Object storage for product images and covers.
    #[must_use]
    pub fn storage(&self) -> &dyn ObjectStorage {
        self.inner.storage.as_ref()
    }

    #[must_use]
    pub fn payments(&self) -> Option<&StripeClient> {
        self.inner.payments.as_ref()
    }

    #[must_use]
    pub fn order_feed(&self) -> &OrderFeed {
        &self.inner.order_feed
    }

    #[must_use]
    pub fn mailer(&self) -> &Mailer {
        &self.inner.mailer
    }

    /// Public URL of an object in storage.
    #[must_use]
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        crate::services::storage::public_url(&self.inner.config.storage.url, bucket, path)
    }
}
