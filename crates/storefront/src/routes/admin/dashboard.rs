//! Back office overview.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;
use tracing::instrument;

use crate::db::{CatalogRepository, OrderRepository, ProfileRepository};
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::routes::Nav;
use crate::state::AppState;

/// Headline counts.
#[derive(Debug, Clone)]
pub struct DashboardMetrics {
    pub users: i64,
    pub products: i64,
    pub inactive_products: i64,
    pub orders: i64,
    pub pending_orders: i64,
    pub sales: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/dashboard.html")]
pub struct AdminDashboardTemplate {
    pub nav: Nav,
    pub current_path: &'static str,
    pub metrics: DashboardMetrics,
}

/// GET /admin
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<AdminDashboardTemplate> {
    let pool = state.pool();
    let users = ProfileRepository::new(pool).count().await?;
    let (products, inactive_products) = CatalogRepository::new(pool).counts().await?;
    let stats = OrderRepository::new(pool).stats().await?;

    Ok(AdminDashboardTemplate {
        nav: Nav::load(&state, Some(&admin)).await,
        current_path: "/admin",
        metrics: DashboardMetrics {
            users,
            products,
            inactive_products,
            orders: stats.total_orders,
            pending_orders: stats.pending_orders,
            sales: stats.sales_total.to_string(),
        },
    })
}
