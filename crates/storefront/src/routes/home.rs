//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};

use crate::db::catalog::HOME_FEED_LIMIT;
use crate::db::{CatalogRepository, SettingsRepository};
use crate::error::Result;
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::routes::{Nav, ProductCard};
use crate::services::storage::COVERS_BUCKET;
use crate::state::AppState;

#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub nav: Nav,
    pub cover_url: Option<String>,
    pub products: Vec<ProductCard>,
}

/// Display the home page: cover image and the newest active products.
pub async fn home(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
) -> Result<impl IntoResponse> {
    let settings = SettingsRepository::new(state.pool()).get().await?;
    let products = CatalogRepository::new(state.pool())
        .latest_active(HOME_FEED_LIMIT)
        .await?;

    Ok(HomeTemplate {
        nav: Nav::load(&state, user.as_ref()).await,
        cover_url: settings
            .cover_image_path
            .as_deref()
            .map(|path| state.public_url(COVERS_BUCKET, path)),
        products: products
            .iter()
            .map(|product| ProductCard::new(&state, product))
            .collect(),
    })
}
