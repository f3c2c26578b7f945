//! Integration tests for the Denim storefront.
//!
//! # Running Tests
//!
//! ```bash
//! # Database tests: a migrated PostgreSQL database
//! export DATABASE_URL=postgres://localhost/denim_test
//! denim-cli migrate
//!
//! # HTTP tests additionally need the server
//! cargo run -p denim-storefront
//!
//! cargo test -p denim-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `catalog` - listing filters, over HTTP and against the repository
//! - `checkout` - wallet checkout, direct orders, cart upserts
//! - `uploads` - upload validation and primary-image bookkeeping
//! - `order_feed` - snapshot and change feed through `denim-order-sync`
//! - `auth` - admin gate redirects and password reset over HTTP

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::cookie::{CookieStore, Jar};
use secrecy::SecretString;
use sqlx::PgPool;
use uuid::Uuid;

use denim_core::{Cents, Email, ProductId, SizeId, VariantId};
use denim_storefront::db::{
    CatalogRepository, ProfileRepository, TaxonomyRepository, VariantRepository,
};
use denim_storefront::models::{NewProduct, Product, Profile};
use denim_storefront::services::{ObjectStorage, StorageError};

/// Password used for every account created over HTTP.
pub const PASSWORD: &str = "correct-horse-battery";

/// Base URL of the running storefront.
#[must_use]
pub fn storefront_base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Connect to the test database.
///
/// # Panics
///
/// Panics if `DATABASE_URL` is unset or the database is unreachable.
pub async fn pool() -> PgPool {
    let url = std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("DATABASE_URL must be set for integration tests");
    denim_storefront::db::create_pool(&SecretString::from(url))
        .await
        .expect("Failed to connect to test database")
}

/// An email address no other test uses.
#[must_use]
pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4().simple())
}

/// A profile created directly in the database (it cannot sign in).
///
/// # Panics
///
/// Panics if the insert fails.
pub async fn create_customer(pool: &PgPool) -> Profile {
    let email = Email::parse(&unique_email("customer")).expect("valid email");
    ProfileRepository::new(pool)
        .create_with_password(&email, "Test Customer", "unusable-hash")
        .await
        .expect("Failed to create customer")
}

/// An active product at `price` minor units.
///
/// # Panics
///
/// Panics if the insert fails.
pub async fn create_product(pool: &PgPool, price: i64, color: &str) -> Product {
    CatalogRepository::new(pool)
        .create(&NewProduct {
            title: format!("Test Jeans {}", Uuid::new_v4().simple()),
            description: None,
            price: Cents::new(price),
            color: Some(color.to_string()),
            category_id: None,
        })
        .await
        .expect("Failed to create product")
}

/// A new size label plus a variant of `product_id` in that size.
///
/// # Panics
///
/// Panics if either insert fails.
pub async fn create_variant(pool: &PgPool, product_id: ProductId) -> (SizeId, VariantId) {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    let label = format!("W{suffix}");
    let size = TaxonomyRepository::new(pool)
        .create_size(&label)
        .await
        .expect("Failed to create size");
    let variant = VariantRepository::new(pool)
        .create(product_id, size.id, 10)
        .await
        .expect("Failed to create variant");
    (size.id, variant)
}

/// HTTP client with a cookie jar. Redirects are not followed so tests can
/// assert on `Location`.
///
/// # Panics
///
/// Panics if the client cannot be built.
#[must_use]
pub fn client() -> Client {
    session_client().0
}

/// Like [`client`], also returning the jar so the session cookie can be
/// handed to other clients.
///
/// # Panics
///
/// Panics if the client cannot be built.
#[must_use]
pub fn session_client() -> (Client, Arc<Jar>) {
    let jar = Arc::new(Jar::default());
    let client = Client::builder()
        .cookie_provider(Arc::clone(&jar))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to create HTTP client");
    (client, jar)
}

/// `Cookie` header value the jar would send to the storefront.
///
/// # Panics
///
/// Panics if the base URL is invalid.
#[must_use]
pub fn session_cookie(jar: &Jar) -> Option<String> {
    let url = url::Url::parse(&storefront_base_url()).expect("valid STOREFRONT_BASE_URL");
    jar.cookies(&url)
        .and_then(|value| value.to_str().ok().map(str::to_owned))
}

/// Register a fresh account and keep its session in the client's jar.
/// Returns the email address.
///
/// # Panics
///
/// Panics if registration does not redirect to the dashboard.
pub async fn register(client: &Client) -> String {
    let email = unique_email("shopper");
    // Each registration looks like a new client to the rate limiter.
    let [a, b, c, ..] = Uuid::new_v4().into_bytes();
    let forwarded_for = format!("10.{a}.{b}.{c}");
    let resp = client
        .post(format!("{}/register", storefront_base_url()))
        .header("x-forwarded-for", forwarded_for)
        .form(&[
            ("name", "Test Shopper"),
            ("email", email.as_str()),
            ("password", PASSWORD),
            ("password_confirm", PASSWORD),
        ])
        .send()
        .await
        .expect("Failed to register");
    assert!(resp.status().is_redirection(), "register: {}", resp.status());
    assert_eq!(
        resp.headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/dashboard")
    );
    email
}

/// Object storage that records calls instead of making them.
#[derive(Debug, Default)]
pub struct RecordingStorage {
    pub uploaded: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
}

impl RecordingStorage {
    /// Paths uploaded so far.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ObjectStorage for RecordingStorage {
    async fn upload(
        &self,
        _bucket: &str,
        path: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
        _upsert: bool,
    ) -> Result<(), StorageError> {
        self.uploaded
            .lock()
            .map_err(|_| StorageError::Config("poisoned".to_string()))?
            .push(path.to_string());
        Ok(())
    }

    async fn remove(&self, _bucket: &str, paths: &[String]) -> Result<(), StorageError> {
        self.removed
            .lock()
            .map_err(|_| StorageError::Config("poisoned".to_string()))?
            .extend_from_slice(paths);
        Ok(())
    }
}
