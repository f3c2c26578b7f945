//! Card payment API: hosted checkout sessions and the provider webhook.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use denim_core::{Cents, ProductId, UserId};

use crate::db::{CartRepository, CatalogRepository};
use crate::error::{ApiError, ApiResult};
use crate::middleware::OptionalAuth;
use crate::services::CheckoutService;
use crate::services::payments::{LineItem, PurchaseSource, SessionRequest};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Body of `POST /api/stripe/checkout`. Without a product the cart is used.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub product_id: Option<ProductId>,
    pub quantity: Option<i32>,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Start a hosted card checkout.
///
/// POST /api/stripe/checkout
#[instrument(skip(state, user, request))]
pub async fn create_checkout(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<Response> {
    let Some(stripe) = state.payments() else {
        return Ok(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Stripe not configured",
        ));
    };
    let Some(user) = user else {
        return Ok(json_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
    };

    let (items, source) = if let Some(product_id) = request.product_id {
        let product = CatalogRepository::new(state.pool())
            .get(product_id)
            .await?
            .filter(|p| p.is_active);
        let Some(product) = product else {
            return Ok(json_error(StatusCode::NOT_FOUND, "Product not found"));
        };
        let quantity = request.quantity.unwrap_or(1).max(1);
        let source = PurchaseSource::Product {
            product_id,
            quantity,
            unit_amount: product.price,
        };
        let item = LineItem {
            name: product.title,
            unit_amount: product.price,
            quantity,
        };
        (vec![item], source)
    } else {
        let items = CartRepository::new(state.pool())
            .lines(user.id)
            .await?
            .into_iter()
            .map(|line| LineItem {
                name: format!("{} ({})", line.product_title, line.size_label),
                unit_amount: line.unit_price,
                quantity: line.quantity,
            })
            .collect();
        (items, PurchaseSource::Cart)
    };

    if items.is_empty() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "No items"));
    }

    let base = &state.config().base_url;
    let session = stripe
        .create_checkout_session(&SessionRequest {
            items: &items,
            customer_email: Some(user.email.as_str()),
            user_id: user.id,
            source,
            success_url: format!("{base}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{base}/checkout/cancel"),
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create checkout session");
            ApiError::from(e)
        })?;

    Ok(Json(json!({ "url": session.url })).into_response())
}

/// Provider webhook. Records a paid order for completed sessions.
///
/// POST /api/stripe/webhook
#[instrument(skip_all)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: String,
) -> ApiResult<Response> {
    let Some(stripe) = state.payments() else {
        return Ok(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Stripe not configured",
        ));
    };
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Missing signature"));
    };

    let event = match stripe.construct_event(&payload, signature) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected webhook");
            return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid signature"));
        }
    };
    tracing::info!(kind = %event.kind, "Webhook received");

    if let Some(session) = event.completed_session()? {
        match session
            .metadata
            .user_id
            .as_deref()
            .and_then(|id| id.parse::<UserId>().ok())
        {
            Some(user_id) => {
                let amount = Cents::new(session.amount_total.unwrap_or_default());
                let source = session.metadata.source();
                if source.is_none() {
                    tracing::warn!(session_id = %session.id, "Unreadable purchase metadata");
                }
                CheckoutService::new(state.pool())
                    .record_card_payment(user_id, &session.id, amount, source)
                    .await?;
            }
            None => tracing::warn!(session_id = %session.id, "Completed session without user"),
        }
    }

    Ok(Json(json!({ "received": true })).into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_request_fields_are_optional() {
        let empty: CheckoutRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.product_id.is_none());
        assert!(empty.quantity.is_none());

        let single: CheckoutRequest = serde_json::from_str(
            r#"{"productId":"7c9e6679-7425-40de-944b-e07fc1f90ae7","quantity":2}"#,
        )
        .unwrap();
        assert_eq!(single.quantity, Some(2));
        assert!(single.product_id.is_some());
    }
}
