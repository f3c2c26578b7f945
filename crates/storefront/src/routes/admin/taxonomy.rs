//! Categories and sizes.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;
use tracing::instrument;

use denim_core::{CategoryId, SizeId};

use crate::db::TaxonomyRepository;
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::routes::Nav;
use crate::routes::admin::{FlashQuery, back_to};
use crate::routes::cart::redirect_with_error;
use crate::state::AppState;

const CATEGORIES_PAGE: &str = "/admin/categories";
const SIZES_PAGE: &str = "/admin/sizes";

/// One row of a name list.
#[derive(Clone)]
pub struct TaxonView {
    pub id: String,
    pub name: String,
}

/// Shared page for both lists.
#[derive(Template, WebTemplate)]
#[template(path = "admin/taxonomy.html")]
pub struct TaxonomyTemplate {
    pub nav: Nav,
    pub current_path: &'static str,
    pub heading: &'static str,
    pub field_label: &'static str,
    pub items: Vec<TaxonView>,
    pub error: Option<String>,
    pub success: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NameForm {
    pub name: String,
}

/// GET /admin/categories
pub async fn categories(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(flash): Query<FlashQuery>,
) -> Result<TaxonomyTemplate> {
    let items = TaxonomyRepository::new(state.pool())
        .list_categories()
        .await?
        .into_iter()
        .map(|c| TaxonView {
            id: c.id.to_string(),
            name: c.name,
        })
        .collect();
    let (error, success) = flash.into_messages();

    Ok(TaxonomyTemplate {
        nav: Nav::load(&state, Some(&admin)).await,
        current_path: CATEGORIES_PAGE,
        heading: "Categories",
        field_label: "Name",
        items,
        error,
        success,
    })
}

/// POST /admin/categories
#[instrument(skip(state, admin, form), fields(admin = %admin.id))]
pub async fn create_category(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Form(form): Form<NameForm>,
) -> Result<Response> {
    let name = form.name.trim();
    if name.is_empty() {
        return Ok(redirect_with_error(CATEGORIES_PAGE, "Name is required"));
    }
    let result = TaxonomyRepository::new(state.pool())
        .create_category(name)
        .await
        .map(|_| ());
    back_to(CATEGORIES_PAGE, result)
}

/// POST /admin/categories/{id}/delete
#[instrument(skip(state, admin), fields(admin = %admin.id))]
pub async fn delete_category(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<CategoryId>,
) -> Result<Response> {
    let result = TaxonomyRepository::new(state.pool())
        .delete_category(id)
        .await;
    back_to(CATEGORIES_PAGE, result)
}

/// GET /admin/sizes
pub async fn sizes(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(flash): Query<FlashQuery>,
) -> Result<TaxonomyTemplate> {
    let items = TaxonomyRepository::new(state.pool())
        .list_sizes()
        .await?
        .into_iter()
        .map(|s| TaxonView {
            id: s.id.to_string(),
            name: s.label,
        })
        .collect();
    let (error, success) = flash.into_messages();

    Ok(TaxonomyTemplate {
        nav: Nav::load(&state, Some(&admin)).await,
        current_path: SIZES_PAGE,
        heading: "Sizes",
        field_label: "Label",
        items,
        error,
        success,
    })
}

/// POST /admin/sizes
#[instrument(skip(state, admin, form), fields(admin = %admin.id))]
pub async fn create_size(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Form(form): Form<NameForm>,
) -> Result<Response> {
    let label = form.name.trim();
    if label.is_empty() {
        return Ok(redirect_with_error(SIZES_PAGE, "Label is required"));
    }
    let result = TaxonomyRepository::new(state.pool())
        .create_size(label)
        .await
        .map(|_| ());
    back_to(SIZES_PAGE, result)
}

/// POST /admin/sizes/{id}/delete
#[instrument(skip(state, admin), fields(admin = %admin.id))]
pub async fn delete_size(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<SizeId>,
) -> Result<Response> {
    let result = TaxonomyRepository::new(state.pool()).delete_size(id).await;
    back_to(SIZES_PAGE, result)
}
