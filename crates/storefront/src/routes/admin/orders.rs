//! Order management.
//!
//! Any status may be set from any other; the back office is trusted to
//! pick a sensible one.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use denim_core::{OrderId, OrderStatus};

use crate::db::OrderRepository;
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::routes::Nav;
use crate::routes::admin::FlashQuery;
use crate::routes::cart::redirect_with_error;
use crate::routes::orders::OrderSummaryView;
use crate::routes::products::Choice;
use crate::state::AppState;

const ORDERS_PAGE: &str = "/admin/orders";

#[derive(Clone)]
pub struct AdminOrderRow {
    pub order: OrderSummaryView,
    pub statuses: Vec<Choice>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/orders.html")]
pub struct AdminOrdersTemplate {
    pub nav: Nav,
    pub current_path: &'static str,
    pub rows: Vec<AdminOrderRow>,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Status dropdown with `current` preselected.
fn status_choices(current: OrderStatus) -> Vec<Choice> {
    OrderStatus::ALL
        .into_iter()
        .map(|status| Choice {
            value: status.as_str().to_owned(),
            selected: status == current,
        })
        .collect()
}

/// GET /admin/orders
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(flash): Query<FlashQuery>,
) -> Result<AdminOrdersTemplate> {
    let orders = OrderRepository::new(state.pool()).list_all().await?;
    let (error, success) = flash.into_messages();

    Ok(AdminOrdersTemplate {
        nav: Nav::load(&state, Some(&admin)).await,
        current_path: ORDERS_PAGE,
        rows: orders
            .iter()
            .map(|order| AdminOrderRow {
                order: OrderSummaryView::from(order),
                statuses: status_choices(order.status),
            })
            .collect(),
        error,
        success,
    })
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
}

/// POST /admin/orders/{id}/status
#[instrument(skip(state, admin, form), fields(admin = %admin.id))]
pub async fn set_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Form(form): Form<StatusForm>,
) -> Result<Response> {
    let Ok(status) = form.status.parse::<OrderStatus>() else {
        return Ok(redirect_with_error(ORDERS_PAGE, "Unknown order status"));
    };

    let order = OrderRepository::new(state.pool())
        .update_status(id, status)
        .await?;
    tracing::info!(order_id = %order.id, status = %order.status, "Order status set");

    Ok(Redirect::to("/admin/orders?success=1").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_choices_mark_current() {
        let choices = status_choices(OrderStatus::Shipped);
        assert_eq!(choices.len(), 5);
        let selected: Vec<_> = choices.iter().filter(|c| c.selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].value, "shipped");
    }
}
