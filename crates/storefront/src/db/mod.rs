//! Database operations for the storefront `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `profiles`, `user_passwords` - Identity and wallet balance
//! - `password_reset_tokens` - Hashed one-time reset tokens
//! - `products`, `product_images`, `product_variants`, `sizes`, `categories` - Catalog
//! - `product_views` - Product page views for analytics
//! - `carts`, `cart_items` - One cart per customer
//! - `orders`, `order_items` - Orders with unit price snapshots
//! - `wallet_transactions` - Append-only wallet ledger
//! - `site_settings` - Singleton row (homepage cover image)
//! - `contact_messages` - Contact form submissions
//! - `tower_sessions.session` - Session storage
//!
//! Every repository returns `Result<_, RepositoryError>`; callers decide how
//! a failure is shown.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p denim-cli -- migrate
//! ```

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub mod analytics;
pub mod carts;
pub mod catalog;
pub mod contact;
pub mod images;
pub mod orders;
pub mod password_resets;
pub mod profiles;
pub mod settings;
pub mod taxonomy;
pub mod variants;

pub use analytics::AnalyticsRepository;
pub use carts::{CartRepository, MAX_LINE_QUANTITY, line_quantity};
pub use catalog::CatalogRepository;
pub use contact::ContactRepository;
pub use images::ImageRepository;
pub use orders::OrderRepository;
pub use password_resets::PasswordResetRepository;
pub use profiles::ProfileRepository;
pub use settings::SettingsRepository;
pub use taxonomy::TaxonomyRepository;
pub use variants::VariantRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
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
}

/// Map a unique violation to `Conflict`, anything else to `Database`.
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
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

/// Embedded migrations for this crate.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
