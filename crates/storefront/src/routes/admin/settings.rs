//! Site settings: the homepage cover image.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Query, State};

use crate::db::SettingsRepository;
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::routes::Nav;
use crate::routes::admin::FlashQuery;
use crate::services::storage::COVERS_BUCKET;
use crate::state::AppState;

#[derive(Template, WebTemplate)]
#[template(path = "admin/settings.html")]
pub struct SettingsTemplate {
    pub nav: Nav,
    pub current_path: &'static str,
    pub cover_url: Option<String>,
    pub updated_at: Option<String>,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// GET /admin/settings
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(flash): Query<FlashQuery>,
) -> Result<SettingsTemplate> {
    let settings = SettingsRepository::new(state.pool()).get().await?;
    let (error, success) = flash.into_messages();

    Ok(SettingsTemplate {
        nav: Nav::load(&state, Some(&admin)).await,
        current_path: "/admin/settings",
        cover_url: settings
            .cover_image_path
            .as_deref()
            .map(|path| state.public_url(COVERS_BUCKET, path)),
        updated_at: settings
            .updated_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string()),
        error,
        success,
    })
}
