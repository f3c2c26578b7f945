//! Back office route handlers.
//!
//! Every page here sits behind [`admin_gate`]: anonymous visitors go to
//! `/login`, signed-in customers go to `/`.
//!
//! ```text
//! GET  /admin                                   - Dashboard counts
//! GET  /admin/products, POST /admin/products    - Product list and create
//! POST /admin/products/delete-all               - Purge every product
//! GET  /admin/products/{id}                     - Images and variants
//! POST /admin/products/{id}/toggle              - Flip active flag
//! POST /admin/products/{id}/delete              - Delete product and images
//! POST /admin/products/{id}/images/{image_id}/primary
//! POST /admin/products/{id}/images/{image_id}/delete
//! POST /admin/products/{id}/variants            - Add a size
//! POST /admin/products/{id}/variants/{variant_id}/stock
//! POST /admin/products/{id}/variants/{variant_id}/delete
//! GET  /admin/categories, POST, POST /{id}/delete
//! GET  /admin/sizes, POST, POST /{id}/delete
//! GET  /admin/orders                            - All orders, live
//! POST /admin/orders/{id}/status                - Set any status
//! GET  /admin/users, GET /admin/users/{id}
//! POST /admin/users/{id}/admin                  - Grant or revoke admin
//! POST /admin/users/{id}/wallet                 - Set wallet balance
//! GET  /admin/settings                          - Cover image
//! GET  /admin/contact                           - Contact messages
//! GET  /admin/analytics                         - Views and sales
//! ```

pub mod analytics;
pub mod contact;
pub mod dashboard;
pub mod orders;
pub mod products;
pub mod settings;
pub mod taxonomy;
pub mod users;

use axum::{
    Router, middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::db::RepositoryError;
use crate::error::Result;
use crate::middleware::admin_gate;
use crate::routes::cart::redirect_with_error;
use crate::state::AppState;

/// `?success=` / `?error=` / `?message=` on back office pages.
#[derive(Debug, Default, Deserialize)]
pub struct FlashQuery {
    pub success: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl FlashQuery {
    /// Resolve the query into `(error, success)` banner texts.
    #[must_use]
    pub fn into_messages(self) -> (Option<String>, Option<String>) {
        let success = self.success.map(|_| "Saved".to_owned());
        let error = self.error.map(|code| match code.as_str() {
            "nofile" => "Please choose a file".to_owned(),
            "noproduct" => "Please choose a product".to_owned(),
            _ => self.message.unwrap_or(code),
        });
        (error, success)
    }
}

/// Redirect back to `page` after a write. Conflicts and missing rows are
/// shown on the page; other failures become the error page.
pub(crate) fn back_to(
    page: &str,
    result: std::result::Result<(), RepositoryError>,
) -> Result<Response> {
    match result {
        Ok(()) => Ok(Redirect::to(&format!("{page}?success=1")).into_response()),
        Err(RepositoryError::Conflict(msg)) => Ok(redirect_with_error(page, &msg)),
        Err(RepositoryError::NotFound) => Ok(redirect_with_error(page, "Not found")),
        Err(e) => Err(e.into()),
    }
}

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard::index))
        .route("/products", get(products::index).post(products::create))
        .route("/products/delete-all", post(products::delete_all))
        .route("/products/{id}", get(products::show))
        .route("/products/{id}/toggle", post(products::toggle))
        .route("/products/{id}/delete", post(products::delete))
        .route(
            "/products/{id}/images/{image_id}/primary",
            post(products::set_primary_image),
        )
        .route(
            "/products/{id}/images/{image_id}/delete",
            post(products::delete_image),
        )
        .route("/products/{id}/variants", post(products::add_variant))
        .route(
            "/products/{id}/variants/{variant_id}/stock",
            post(products::set_stock),
        )
        .route(
            "/products/{id}/variants/{variant_id}/delete",
            post(products::delete_variant),
        )
        .route(
            "/categories",
            get(taxonomy::categories).post(taxonomy::create_category),
        )
        .route("/categories/{id}/delete", post(taxonomy::delete_category))
        .route("/sizes", get(taxonomy::sizes).post(taxonomy::create_size))
        .route("/sizes/{id}/delete", post(taxonomy::delete_size))
        .route("/orders", get(orders::index))
        .route("/orders/{id}/status", post(orders::set_status))
        .route("/users", get(users::index))
        .route("/users/{id}", get(users::show))
        .route("/users/{id}/admin", post(users::set_admin))
        .route("/users/{id}/wallet", post(users::set_wallet))
        .route("/settings", get(settings::index))
        .route("/contact", get(contact::index))
        .route("/analytics", get(analytics::index))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_gate))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_back_to_shows_conflicts_inline() {
        let ok = back_to("/admin/sizes", Ok(())).unwrap();
        assert_eq!(ok.headers()["location"], "/admin/sizes?success=1");

        let conflict = back_to(
            "/admin/sizes",
            Err(RepositoryError::Conflict("size already exists".to_owned())),
        )
        .unwrap();
        assert_eq!(
            conflict.headers()["location"],
            "/admin/sizes?error=size%20already%20exists"
        );

        let failed = back_to(
            "/admin/sizes",
            Err(RepositoryError::DataCorruption("bad row".to_owned())),
        );
        assert!(failed.is_err());
    }

    #[test]
    fn test_flash_messages() {
        let (error, success) = FlashQuery {
            success: Some("1".to_owned()),
            ..FlashQuery::default()
        }
        .into_messages();
        assert_eq!(error, None);
        assert_eq!(success.as_deref(), Some("Saved"));

        let (error, _) = FlashQuery {
            error: Some("upload".to_owned()),
            message: Some("File too large. Maximum size is 20MB.".to_owned()),
            ..FlashQuery::default()
        }
        .into_messages();
        assert_eq!(error.as_deref(), Some("File too large. Maximum size is 20MB."));

        let (error, _) = FlashQuery {
            error: Some("nofile".to_owned()),
            ..FlashQuery::default()
        }
        .into_messages();
        assert_eq!(error.as_deref(), Some("Please choose a file"));
    }
}
