//! Cart route handlers.
//!
//! Every cart belongs to a signed-in customer; guests are sent to the
//! login page. Lines are keyed by product variant, so adding the same
//! (product, size) again increases the existing line.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use denim_core::{CartItemId, Cents, ProductId, SizeId};

use crate::db::{CartRepository, RepositoryError, VariantRepository, line_quantity};
use crate::error::{Result, add_breadcrumb};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::CartLine;
use crate::routes::Nav;
use crate::services::storage::PRODUCT_IMAGES_BUCKET;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: ProductId,
    pub size_id: Option<SizeId>,
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLineForm {
    pub item_id: CartItemId,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct RemoveLineForm {
    pub item_id: CartItemId,
}

#[derive(Debug, Deserialize)]
pub struct CartQuery {
    pub error: Option<String>,
}

/// Cart line display data for templates.
#[derive(Clone)]
pub struct CartLineView {
    pub item_id: String,
    pub product_id: String,
    pub title: String,
    pub size: String,
    pub quantity: i32,
    pub unit_price: String,
    pub line_total: String,
    pub image_url: Option<String>,
}

impl CartLineView {
    fn new(state: &AppState, line: &CartLine) -> Self {
        Self {
            item_id: line.item_id.to_string(),
            product_id: line.product_id.to_string(),
            title: line.product_title.clone(),
            size: line.size_label.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price.to_string(),
            line_total: line.line_total().to_string(),
            image_url: line
                .thumbnail_path
                .as_deref()
                .map(|path| state.public_url(PRODUCT_IMAGES_BUCKET, path)),
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartTemplate {
    pub nav: Nav,
    pub lines: Vec<CartLineView>,
    pub subtotal: String,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Display the cart.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<CartQuery>,
) -> Result<impl IntoResponse> {
    let lines = CartRepository::new(state.pool()).lines(user.id).await?;
    let subtotal: Cents = lines.iter().map(CartLine::line_total).sum();

    Ok(CartTemplate {
        nav: Nav::load(&state, Some(&user)).await,
        lines: lines
            .iter()
            .map(|line| CartLineView::new(&state, line))
            .collect(),
        subtotal: subtotal.to_string(),
        error: query.error,
        success: None,
    })
}

/// Add a (product, size) to the cart.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let back = format!("/products/{}", form.product_id);
    let Some(size_id) = form.size_id else {
        return Ok(redirect_with_error(&back, "Please choose a size"));
    };
    let Some(variant) = VariantRepository::new(state.pool())
        .find(form.product_id, size_id)
        .await?
    else {
        return Ok(redirect_with_error(&back, "That size is not available"));
    };

    let quantity = line_quantity(form.quantity);
    match CartRepository::new(state.pool())
        .add_item(user.id, variant.id, quantity)
        .await
    {
        Ok(total) => {
            let variant_id = variant.id.to_string();
            add_breadcrumb("cart", "Added to cart", Some(&[("variant_id", variant_id.as_str())]));
            tracing::info!(variant_id = %variant.id, quantity = total, "Cart line updated");
            Ok(Redirect::to(&format!("{back}?added=1")).into_response())
        }
        Err(RepositoryError::NotFound) => Ok(redirect_with_error(&back, "That size is not available")),
        Err(e) => Err(e.into()),
    }
}

/// Set a line's quantity. Zero or less removes the line; larger values are capped.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<UpdateLineForm>,
) -> Result<Redirect> {
    CartRepository::new(state.pool())
        .set_quantity(user.id, form.item_id, form.quantity)
        .await?;
    Ok(Redirect::to("/cart"))
}

/// Remove a line.
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<RemoveLineForm>,
) -> Result<Redirect> {
    CartRepository::new(state.pool())
        .remove_item(user.id, form.item_id)
        .await?;
    Ok(Redirect::to("/cart"))
}

/// Redirect to `path` with `?error=<message>`.
pub(crate) fn redirect_with_error(path: &str, message: &str) -> Response {
    Redirect::to(&format!("{path}?error={}", urlencoding::encode(message))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_with_error_encodes_message() {
        let response = redirect_with_error("/checkout", "Insufficient wallet balance");
        assert_eq!(
            response.headers()["location"],
            "/checkout?error=Insufficient%20wallet%20balance"
        );
    }
}
