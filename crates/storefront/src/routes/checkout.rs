//! Checkout route handlers: wallet checkout, card checkout return pages and
//! the buy-now form.
//!
//! Each form carries a fresh idempotency key so a double submit resolves
//! to the order created by the first one.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use denim_core::ProductId;

use crate::db::{CartRepository, CatalogRepository, ProfileRepository};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::CartLine;
use crate::routes::Nav;
use crate::routes::cart::redirect_with_error;
use crate::services::checkout::{DEFAULT_COUNTRY, DirectOrderForm, SHIPPING, plan_cart};
use crate::services::{CheckoutError, CheckoutService};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WalletCheckoutForm {
    pub idempotency_key: Uuid,
}

/// Buy-now form. Field names match the public order form.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyNowForm {
    pub idempotency_key: Uuid,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: String,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub shipping_city: String,
    #[serde(default)]
    pub shipping_postal_code: String,
    #[serde(default)]
    pub shipping_country: String,
    #[serde(default)]
    pub notes: String,
}

impl BuyNowForm {
    /// Missing or unparseable quantities count as one.
    fn quantity(&self) -> i32 {
        self.quantity.trim().parse::<i32>().unwrap_or(1).max(1)
    }

    fn details(&self) -> DirectOrderForm {
        DirectOrderForm {
            customer_name: self.customer_name.clone(),
            customer_email: self.customer_email.clone(),
            customer_phone: self.customer_phone.clone(),
            shipping_address: self.shipping_address.clone(),
            shipping_city: self.shipping_city.clone(),
            shipping_postal_code: self.shipping_postal_code.clone(),
            shipping_country: self.shipping_country.clone(),
            notes: self.notes.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CheckoutLineView {
    pub title: String,
    pub size: String,
    pub quantity: i32,
    pub line_total: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "checkout/page.html")]
pub struct CheckoutTemplate {
    pub nav: Nav,
    pub lines: Vec<CheckoutLineView>,
    pub subtotal: String,
    pub shipping: String,
    pub total: String,
    pub balance: String,
    pub can_afford: bool,
    pub card_enabled: bool,
    pub payment_link_url: Option<String>,
    pub idempotency_key: String,
    pub error: Option<String>,
    pub success: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "checkout/result.html")]
pub struct CheckoutResultTemplate {
    pub nav: Nav,
    pub heading: &'static str,
    pub message: &'static str,
}

#[derive(Template, WebTemplate)]
#[template(path = "checkout/buy_now.html")]
pub struct BuyNowTemplate {
    pub nav: Nav,
    pub product_id: String,
    pub title: String,
    pub price: String,
    pub email: String,
    pub default_country: &'static str,
    pub idempotency_key: String,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Review the cart against the wallet balance.
pub async fn page(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<MessageQuery>,
) -> Result<Response> {
    let lines = CartRepository::new(state.pool()).lines(user.id).await?;
    let plan = match plan_cart(&lines) {
        Ok(plan) => plan,
        Err(CheckoutError::EmptyCart) => return Ok(Redirect::to("/cart").into_response()),
        Err(e) => return Err(e.into()),
    };
    let profile = ProfileRepository::new(state.pool())
        .get(user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(CheckoutTemplate {
        nav: Nav::load(&state, Some(&user)).await,
        lines: lines.iter().map(line_view).collect(),
        subtotal: plan.subtotal.to_string(),
        shipping: SHIPPING.to_string(),
        total: plan.total.to_string(),
        balance: profile.wallet.to_string(),
        can_afford: profile.wallet.get() >= plan.total.get(),
        card_enabled: state.payments().is_some(),
        payment_link_url: state.config().payments.payment_link_url.clone(),
        idempotency_key: Uuid::new_v4().to_string(),
        error: query.error,
        success: None,
    }
    .into_response())
}

fn line_view(line: &CartLine) -> CheckoutLineView {
    CheckoutLineView {
        title: line.product_title.clone(),
        size: line.size_label.clone(),
        quantity: line.quantity,
        line_total: line.line_total().to_string(),
    }
}

/// Pay for the cart from the wallet.
#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn pay_with_wallet(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<WalletCheckoutForm>,
) -> Result<Response> {
    match CheckoutService::new(state.pool())
        .pay_with_wallet(user.id, form.idempotency_key)
        .await
    {
        Ok(receipt) => Ok(Redirect::to(&format!("/orders/{}?placed=1", receipt.order_id)).into_response()),
        Err(e @ (CheckoutError::EmptyCart | CheckoutError::InsufficientBalance { .. })) => {
            tracing::info!(reason = %e, "Wallet checkout declined");
            Ok(redirect_with_error("/checkout", e.user_message()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Return page after a successful card checkout.
pub async fn success(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> impl IntoResponse {
    CheckoutResultTemplate {
        nav: Nav::load(&state, Some(&user)).await,
        heading: "Thank you",
        message: "Your payment was received. Your order will appear in your dashboard shortly.",
    }
}

/// Return page after a cancelled card checkout.
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> impl IntoResponse {
    CheckoutResultTemplate {
        nav: Nav::load(&state, Some(&user)).await,
        heading: "Payment cancelled",
        message: "Nothing was charged. Your cart is still saved.",
    }
}

/// Buy-now form for a single product.
pub async fn buy_now_page(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let product = CatalogRepository::new(state.pool())
        .get(product_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound("Product not found".to_owned()))?;

    Ok(BuyNowTemplate {
        nav: Nav::load(&state, Some(&user)).await,
        product_id: product.id.to_string(),
        title: product.title,
        price: product.price.to_string(),
        email: user.email.to_string(),
        default_country: DEFAULT_COUNTRY,
        idempotency_key: Uuid::new_v4().to_string(),
        error: query.error,
        success: None,
    })
}

/// Place a pending order for a single product.
#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn buy_now(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
    Form(form): Form<BuyNowForm>,
) -> Result<Response> {
    let back = format!("/order/{product_id}");
    let customer = match form.details().validate() {
        Ok(customer) => customer,
        Err(e) => return Ok(redirect_with_error(&back, e.user_message())),
    };

    match CheckoutService::new(state.pool())
        .place_direct_order(
            user.id,
            product_id,
            form.quantity(),
            &customer,
            form.idempotency_key,
        )
        .await
    {
        Ok(receipt) => Ok(Redirect::to(&format!("/orders/{}?placed=1", receipt.order_id)).into_response()),
        Err(CheckoutError::ProductNotFound) => {
            Err(AppError::NotFound("Product not found".to_owned()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::FromRequest, http::Request};

    async fn form(body: String) -> BuyNowForm {
        let request = Request::post("/order/x")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        let Form(form) = Form::<BuyNowForm>::from_request(request, &()).await.unwrap();
        form
    }

    #[tokio::test]
    async fn test_buy_now_quantity_defaults_to_one() {
        let key = Uuid::new_v4();
        assert_eq!(form(format!("idempotencyKey={key}")).await.quantity(), 1);
        assert_eq!(form(format!("idempotencyKey={key}&quantity=0")).await.quantity(), 1);
        assert_eq!(form(format!("idempotencyKey={key}&quantity=abc")).await.quantity(), 1);
        assert_eq!(form(format!("idempotencyKey={key}&quantity=3")).await.quantity(), 3);
    }

    #[tokio::test]
    async fn test_buy_now_fields_use_camel_case() {
        let key = Uuid::new_v4();
        let parsed = form(format!(
            "idempotencyKey={key}&customerName=Selma&customerEmail=s%40shop.na\
             &shippingAddress=12+Main&shippingCity=Windhoek"
        ))
        .await;
        let details = parsed.details().validate().unwrap();
        assert_eq!(details.city.as_deref(), Some("Windhoek"));
        assert_eq!(details.country.as_deref(), Some("Namibia"));
    }
}
