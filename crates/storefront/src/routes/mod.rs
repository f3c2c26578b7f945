//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                              - Home page (cover + latest products)
//! GET  /products                      - Product listing with filters
//! GET  /products/{id}                 - Product detail (records a view)
//!
//! # Cart (requires auth)
//! GET  /cart                          - Cart page
//! POST /cart/add                      - Add (product, size) to cart
//! POST /cart/update                   - Set line quantity (<= 0 removes)
//! POST /cart/remove                   - Remove line
//!
//! # Checkout (requires auth)
//! GET  /checkout                      - Review cart and wallet balance
//! POST /checkout/wallet               - Pay from wallet
//! GET  /checkout/success              - Card payment return page
//! GET  /checkout/cancel               - Card payment cancelled
//! GET  /order/{product_id}            - Buy-now form
//! POST /order/{product_id}            - Place pending single-product order
//!
//! # Orders (requires auth)
//! GET  /orders/{id}                   - Order detail (owner or admin)
//! GET  /dashboard                     - Account overview
//! GET  /dashboard/orders              - Live order list
//! GET  /api/orders                    - Order snapshot (JSON)
//! GET  /api/orders/feed               - Order changes (Server-Sent Events)
//!
//! # Auth
//! GET  /login, POST /login            - Password login
//! GET  /register, POST /register      - Registration
//! GET  /reset, POST /reset            - Request a password reset link
//! GET  /reset/update, POST /reset/update - Set a new password from the link
//! POST /logout                        - Logout (redirects home)
//! POST /api/auth/logout               - Logout (redirects home)
//!
//! # Contact
//! GET  /contact, POST /contact        - Contact form
//!
//! # API
//! POST /api/upload                    - Product image upload (admin)
//! POST /api/upload/cover              - Homepage cover upload (admin)
//! POST /api/stripe/checkout           - Create hosted card checkout
//! POST /api/stripe/webhook            - Payment provider callback
//! POST /api/admin/contact-messages/mark-read - Mark a message read (admin)
//!
//! # Back office (admin gate)
//! /admin/...                          - See `admin` module
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod contact;
pub mod home;
pub mod orders;
pub mod payments;
pub mod products;
pub mod uploads;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::db::{CartRepository, ProfileRepository};
use crate::middleware::auth_rate_limiter;
use crate::models::CurrentUser;
use crate::services::storage::PRODUCT_IMAGES_BUCKET;
use crate::state::AppState;

/// Multipart bodies may carry a 20 MiB image plus form overhead.
const UPLOAD_BODY_LIMIT: usize = 21 * 1024 * 1024;

/// Navigation state shared by every page layout.
#[derive(Debug, Clone, Default)]
pub struct Nav {
    pub signed_in: bool,
    pub is_admin: bool,
    pub cart_count: i64,
}

impl Nav {
    /// Resolve navigation state for the current visitor. Lookup failures
    /// degrade to the signed-out view of the respective item.
    pub async fn load(state: &AppState, user: Option<&CurrentUser>) -> Self {
        let Some(user) = user else {
            return Self::default();
        };

        let is_admin = match ProfileRepository::new(state.pool()).is_admin(user.id).await {
            Ok(flag) => flag.unwrap_or(false),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load admin flag for nav");
                false
            }
        };
        let cart_count = CartRepository::new(state.pool())
            .item_count(user.id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load cart count for nav");
                0
            });

        Self {
            signed_in: true,
            is_admin,
            cart_count,
        }
    }
}

/// Product card shown in grids.
#[derive(Debug, Clone)]
pub struct ProductCard {
    pub id: String,
    pub title: String,
    pub price: String,
    pub color: Option<String>,
    pub image_url: Option<String>,
}

impl ProductCard {
    #[must_use]
    pub fn new(state: &AppState, product: &crate::models::Product) -> Self {
        Self {
            id: product.id.to_string(),
            title: product.title.clone(),
            price: product.price.to_string(),
            color: product.color.clone(),
            image_url: product
                .thumbnail_path
                .as_deref()
                .map(|path| state.public_url(PRODUCT_IMAGES_BUCKET, path)),
        }
    }
}

/// Treat an empty form field as absent.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/login",
            get(auth::login_page).merge(post(auth::login).layer(auth_rate_limiter())),
        )
        .route(
            "/register",
            get(auth::register_page).merge(post(auth::register).layer(auth_rate_limiter())),
        )
        .route(
            "/reset",
            get(auth::reset_page).merge(post(auth::request_reset).layer(auth_rate_limiter())),
        )
        .route(
            "/reset/update",
            get(auth::reset_update_page).merge(post(auth::reset_update).layer(auth_rate_limiter())),
        )
}

fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
}

fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::page))
        .route("/wallet", post(checkout::pay_with_wallet))
        .route("/success", get(checkout::success))
        .route("/cancel", get(checkout::cancel))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(orders::snapshot))
        .route("/orders/feed", get(orders::feed))
        .route("/auth/logout", post(auth::logout))
        .route("/upload", post(uploads::product_image))
        .route("/upload/cover", post(uploads::cover))
        .route("/stripe/checkout", post(payments::create_checkout))
        .route("/stripe/webhook", post(payments::webhook))
        .route(
            "/admin/contact-messages/mark-read",
            post(admin::contact::mark_read),
        )
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

/// Create all routes for the storefront.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/products", get(products::index))
        .route("/products/{id}", get(products::show))
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .route(
            "/order/{product_id}",
            get(checkout::buy_now_page).post(checkout::buy_now),
        )
        .route("/orders/{id}", get(orders::show))
        .route("/dashboard", get(orders::dashboard))
        .route("/dashboard/orders", get(orders::dashboard_orders))
        .merge(auth_routes())
        .route("/logout", post(auth::logout))
        .route("/contact", get(contact::page).post(contact::submit))
        .nest("/api", api_routes())
        .nest("/admin", admin::routes(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  ".to_owned())), None);
        assert_eq!(non_empty(Some(" 32 ".to_owned())).as_deref(), Some("32"));
        assert_eq!(non_empty(None), None);
    }
}
