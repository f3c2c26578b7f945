//! Product views and sales.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;
use tracing::instrument;

use crate::db::{AnalyticsRepository, OrderRepository};
use crate::db::analytics::ProductViewCount;
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::routes::Nav;
use crate::state::AppState;

#[derive(Template, WebTemplate)]
#[template(path = "admin/analytics.html")]
pub struct AnalyticsTemplate {
    pub nav: Nav,
    pub current_path: &'static str,
    pub sales: String,
    pub total_views: i64,
    pub top_products: Vec<ProductViewCount>,
}

/// GET /admin/analytics
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<AnalyticsTemplate> {
    let analytics = AnalyticsRepository::new(state.pool());
    let total_views = analytics.total_views().await?;
    let top_products = analytics.top_products().await?;
    let stats = OrderRepository::new(state.pool()).stats().await?;

    Ok(AnalyticsTemplate {
        nav: Nav::load(&state, Some(&admin)).await,
        current_path: "/admin/analytics",
        sales: stats.sales_total.to_string(),
        total_views,
        top_products,
    })
}
