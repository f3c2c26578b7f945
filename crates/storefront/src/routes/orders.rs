//! Order pages, the order snapshot API and the live change feed.
//!
//! Customers see their own orders; administrators may ask for every order
//! with `?scope=all`. The snapshot and the feed use the same scoping so a
//! client can load one and then apply the other.

use std::convert::Infallible;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::Stream;
use serde::Deserialize;

use denim_core::{OrderId, OrderRecord};

use crate::db::{OrderRepository, ProfileRepository};
use crate::error::{ApiError, ApiResult, AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::middleware::auth::is_admin;
use crate::models::{CurrentUser, Order, OrderItem};
use crate::routes::Nav;
use crate::services::{FeedEvent, FeedScope};
use crate::state::AppState;

/// Orders shown on the account overview.
const RECENT_ORDERS: usize = 5;

#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlacedQuery {
    pub placed: Option<String>,
}

/// Order row display data for templates.
#[derive(Clone)]
pub struct OrderSummaryView {
    pub id: String,
    pub short_id: String,
    pub status: String,
    pub total: String,
    pub placed_at: String,
    pub customer: String,
}

impl From<&Order> for OrderSummaryView {
    fn from(order: &Order) -> Self {
        let id = order.id.to_string();
        Self {
            short_id: id.chars().take(8).collect(),
            id,
            status: order.status.to_string(),
            total: order.total.to_string(),
            placed_at: order.created_at.format("%Y-%m-%d %H:%M").to_string(),
            customer: order.customer.name.clone().unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct OrderItemView {
    pub title: String,
    pub size: Option<String>,
    pub quantity: i32,
    pub price: String,
    pub line_total: String,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            title: item
                .product_title
                .clone()
                .unwrap_or_else(|| "Removed product".to_owned()),
            size: item.size_label.clone(),
            quantity: item.quantity,
            price: item.price.to_string(),
            line_total: item.line_total().to_string(),
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "orders/show.html")]
pub struct OrderShowTemplate {
    pub nav: Nav,
    pub order: OrderSummaryView,
    pub items: Vec<OrderItemView>,
    pub subtotal: String,
    pub shipping: String,
    pub address_lines: Vec<String>,
    pub notes: Option<String>,
    pub error: Option<String>,
    pub success: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "orders/dashboard.html")]
pub struct DashboardTemplate {
    pub nav: Nav,
    pub name: String,
    pub email: String,
    pub wallet: String,
    pub orders: Vec<OrderSummaryView>,
}

#[derive(Template, WebTemplate)]
#[template(path = "orders/list.html")]
pub struct OrderListTemplate {
    pub nav: Nav,
    pub heading: &'static str,
    pub scope: &'static str,
    pub orders: Vec<OrderSummaryView>,
}

/// Display one order to its owner or an administrator.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
    Query(query): Query<PlacedQuery>,
) -> Result<impl IntoResponse> {
    let orders = OrderRepository::new(state.pool());
    let order = orders
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_owned()))?;
    if order.user_id != user.id && !is_admin(&state, &user).await {
        return Err(AppError::NotFound("Order not found".to_owned()));
    }
    let items = orders.items(id).await?;

    let address_lines = [
        &order.customer.name,
        &order.customer.address,
        &order.customer.city,
        &order.customer.postal_code,
        &order.customer.country,
        &order.customer.phone,
    ]
    .into_iter()
    .flatten()
    .cloned()
    .collect();

    Ok(OrderShowTemplate {
        nav: Nav::load(&state, Some(&user)).await,
        order: OrderSummaryView::from(&order),
        items: items.iter().map(OrderItemView::from).collect(),
        subtotal: order.subtotal.to_string(),
        shipping: order.shipping.to_string(),
        address_lines,
        notes: order.customer.notes.clone(),
        error: None,
        success: query.placed.map(|_| "Thank you! Your order was placed.".to_owned()),
    })
}

/// Account overview: profile, wallet and recent orders.
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse> {
    let profile = ProfileRepository::new(state.pool())
        .get(user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let orders = OrderRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;

    Ok(DashboardTemplate {
        nav: Nav::load(&state, Some(&user)).await,
        name: profile.display_name().to_owned(),
        email: profile.email.to_string(),
        wallet: profile.wallet.to_string(),
        orders: orders
            .iter()
            .take(RECENT_ORDERS)
            .map(OrderSummaryView::from)
            .collect(),
    })
}

/// The customer's full order history, refreshed live.
pub async fn dashboard_orders(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;

    Ok(OrderListTemplate {
        nav: Nav::load(&state, Some(&user)).await,
        heading: "Your orders",
        scope: "mine",
        orders: orders.iter().map(OrderSummaryView::from).collect(),
    })
}

async fn resolve_scope(
    state: &AppState,
    user: &CurrentUser,
    query: &ScopeQuery,
) -> ApiResult<FeedScope> {
    match query.scope.as_deref() {
        None | Some("mine") => Ok(FeedScope::Owner(user.id)),
        Some("all") => {
            if is_admin(state, user).await {
                Ok(FeedScope::All)
            } else {
                Err(ApiError(AppError::Forbidden))
            }
        }
        Some(other) => Err(ApiError(AppError::BadRequest(format!(
            "Unknown scope: {other}"
        )))),
    }
}

/// Current orders, newest first, with line items.
pub async fn snapshot(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Json<Vec<OrderRecord>>> {
    let owner = match resolve_scope(&state, &user, &query).await? {
        FeedScope::All => None,
        FeedScope::Owner(id) => Some(id),
    };
    let records = OrderRepository::new(state.pool()).snapshot(owner).await?;
    Ok(Json(records))
}

/// Server-Sent Events stream of order changes.
///
/// Each change is sent as an event named `insert`, `update` or `delete`
/// whose data is the JSON-encoded change. A `resync` event means changes
/// may have been missed and the snapshot should be reloaded.
pub async fn feed(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let scope = resolve_scope(&state, &user, &query).await?;
    let mut subscription = state.order_feed().subscribe(scope);
    tracing::debug!(user_id = %user.id, ?scope, "Order feed subscriber connected");

    let stream = async_stream::stream! {
        while let Some(event) = subscription.next().await {
            yield Ok(to_sse(&event));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &FeedEvent) -> Event {
    match event {
        FeedEvent::Change(change) => match serde_json::to_string(change.as_ref()) {
            Ok(data) => Event::default().event(change.kind().as_str()).data(data),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode order change");
                resync_event()
            }
        },
        FeedEvent::Resync => resync_event(),
    }
}

fn resync_event() -> Event {
    Event::default().event("resync").data("{}")
}
