//! Product management: catalog list, create, galleries and sizes.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Multipart, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use denim_core::{Cents, CategoryId, ImageId, ProductId, SizeId, VariantId};

use crate::db::{CatalogRepository, ImageRepository, TaxonomyRepository, VariantRepository};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::models::{NewProduct, Product};
use crate::routes::Nav;
use crate::routes::admin::{FlashQuery, back_to};
use crate::routes::cart::redirect_with_error;
use crate::routes::uploads::{MultipartForm, read_multipart};
use crate::services::storage::PRODUCT_IMAGES_BUCKET;
use crate::services::{CatalogMaintenance, UploadService};
use crate::state::AppState;

const PRODUCTS_PAGE: &str = "/admin/products";

#[derive(Clone)]
pub struct AdminProductRow {
    pub id: String,
    pub title: String,
    pub price: String,
    pub color: String,
    pub is_active: bool,
    pub thumbnail_url: Option<String>,
}

impl AdminProductRow {
    fn new(state: &AppState, product: &Product) -> Self {
        Self {
            id: product.id.to_string(),
            title: product.title.clone(),
            price: product.price.to_string(),
            color: product.color.clone().unwrap_or_default(),
            is_active: product.is_active,
            thumbnail_url: product
                .thumbnail_path
                .as_deref()
                .map(|path| state.public_url(PRODUCT_IMAGES_BUCKET, path)),
        }
    }
}

#[derive(Clone)]
pub struct OptionView {
    pub id: String,
    pub label: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/products.html")]
pub struct AdminProductsTemplate {
    pub nav: Nav,
    pub current_path: &'static str,
    pub products: Vec<AdminProductRow>,
    pub categories: Vec<OptionView>,
    pub error: Option<String>,
    pub success: Option<String>,
}

#[derive(Clone)]
pub struct ImageView {
    pub id: String,
    pub url: String,
    pub is_primary: bool,
}

#[derive(Clone)]
pub struct VariantView {
    pub id: String,
    pub size: String,
    pub stock: i32,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/product.html")]
pub struct AdminProductTemplate {
    pub nav: Nav,
    pub current_path: &'static str,
    pub product: AdminProductRow,
    pub description: String,
    pub images: Vec<ImageView>,
    pub variants: Vec<VariantView>,
    pub sizes: Vec<OptionView>,
    pub error: Option<String>,
    pub success: Option<String>,
}

fn product_page(id: ProductId) -> String {
    format!("{PRODUCTS_PAGE}/{id}")
}

/// GET /admin/products
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(flash): Query<FlashQuery>,
) -> Result<AdminProductsTemplate> {
    let products = CatalogRepository::new(state.pool()).list_all().await?;
    let categories = TaxonomyRepository::new(state.pool())
        .list_categories()
        .await?;
    let (error, success) = flash.into_messages();

    Ok(AdminProductsTemplate {
        nav: Nav::load(&state, Some(&admin)).await,
        current_path: PRODUCTS_PAGE,
        products: products
            .iter()
            .map(|p| AdminProductRow::new(&state, p))
            .collect(),
        categories: categories
            .into_iter()
            .map(|c| OptionView {
                id: c.id.to_string(),
                label: c.name,
            })
            .collect(),
        error,
        success,
    })
}

/// Read the create form's text fields.
fn new_product(form: &MultipartForm) -> std::result::Result<NewProduct, &'static str> {
    let title = form.text("title").ok_or("Title is required")?;
    let price = form
        .text("price")
        .ok_or("Price is required")
        .and_then(|p| Cents::parse_major(p).map_err(|_| "Price must be a non-negative number"))?;
    let category_id = form
        .text("category_id")
        .map(str::parse::<CategoryId>)
        .transpose()
        .map_err(|_| "Unknown category")?;

    Ok(NewProduct {
        title: title.to_owned(),
        description: form.text("description").map(str::to_owned),
        price,
        color: form.text("color").map(str::to_owned),
        category_id,
    })
}

/// POST /admin/products
///
/// An attached image becomes the product's primary image.
#[instrument(skip(state, admin, multipart), fields(admin = %admin.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    multipart: Multipart,
) -> Result<Response> {
    let form = read_multipart(multipart).await?;
    let new = match new_product(&form) {
        Ok(new) => new,
        Err(msg) => return Ok(redirect_with_error(PRODUCTS_PAGE, msg)),
    };

    let product = CatalogRepository::new(state.pool()).create(&new).await?;
    tracing::info!(product_id = %product.id, "Product created");

    if let Some(file) = form.file {
        if let Err(e) = UploadService::new(state.pool(), state.storage())
            .upload_product_image(product.id, file, true)
            .await
        {
            tracing::warn!(product_id = %product.id, error = %e, "Product created without image");
            let message = e.message().unwrap_or_else(|| "Upload failed".to_owned());
            return Ok(redirect_with_error(&product_page(product.id), &message));
        }
    }

    Ok(Redirect::to(&format!("{}?success=1", product_page(product.id))).into_response())
}

/// GET /admin/products/{id}
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Query(flash): Query<FlashQuery>,
) -> Result<AdminProductTemplate> {
    let detail = CatalogRepository::new(state.pool())
        .get_detail(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_owned()))?;
    let sizes = TaxonomyRepository::new(state.pool()).list_sizes().await?;
    let (error, success) = flash.into_messages();

    Ok(AdminProductTemplate {
        nav: Nav::load(&state, Some(&admin)).await,
        current_path: PRODUCTS_PAGE,
        product: AdminProductRow::new(&state, &detail.product),
        description: detail.product.description.clone().unwrap_or_default(),
        images: detail
            .images
            .iter()
            .map(|image| ImageView {
                id: image.id.to_string(),
                url: state.public_url(PRODUCT_IMAGES_BUCKET, &image.storage_path),
                is_primary: image.is_primary,
            })
            .collect(),
        variants: detail
            .variants
            .iter()
            .map(|v| VariantView {
                id: v.id.to_string(),
                size: v.size_label.clone(),
                stock: v.stock,
            })
            .collect(),
        sizes: sizes
            .into_iter()
            .map(|s| OptionView {
                id: s.id.to_string(),
                label: s.label,
            })
            .collect(),
        error,
        success,
    })
}

/// POST /admin/products/{id}/toggle
#[instrument(skip(state, admin), fields(admin = %admin.id))]
pub async fn toggle(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<Response> {
    let result = CatalogRepository::new(state.pool())
        .toggle_active(id)
        .await
        .map(|active| tracing::info!(product_id = %id, active, "Product visibility changed"));
    back_to(PRODUCTS_PAGE, result)
}

/// POST /admin/products/{id}/delete
#[instrument(skip(state, admin), fields(admin = %admin.id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<Response> {
    let result = CatalogMaintenance::new(state.pool(), state.storage())
        .delete_product(id)
        .await;
    back_to(PRODUCTS_PAGE, result)
}

#[derive(Debug, Deserialize)]
pub struct ConfirmForm {
    #[serde(default)]
    pub confirm: Option<String>,
}

/// POST /admin/products/delete-all
#[instrument(skip(state, admin, form), fields(admin = %admin.id))]
pub async fn delete_all(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Form(form): Form<ConfirmForm>,
) -> Result<Response> {
    if form.confirm.as_deref() != Some("DELETE") {
        return Ok(redirect_with_error(PRODUCTS_PAGE, "Type DELETE to confirm"));
    }
    CatalogMaintenance::new(state.pool(), state.storage())
        .purge()
        .await?;
    Ok(Redirect::to("/admin/products?success=1").into_response())
}

/// POST /admin/products/{id}/images/{image_id}/primary
#[instrument(skip(state, admin), fields(admin = %admin.id))]
pub async fn set_primary_image(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path((id, image_id)): Path<(ProductId, ImageId)>,
) -> Result<Response> {
    let result = ImageRepository::new(state.pool())
        .set_primary(id, image_id)
        .await;
    back_to(&product_page(id), result)
}

/// POST /admin/products/{id}/images/{image_id}/delete
#[instrument(skip(state, admin), fields(admin = %admin.id))]
pub async fn delete_image(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path((id, image_id)): Path<(ProductId, ImageId)>,
) -> Result<Response> {
    let result = CatalogMaintenance::new(state.pool(), state.storage())
        .delete_image(id, image_id)
        .await;
    back_to(&product_page(id), result)
}

#[derive(Debug, Deserialize)]
pub struct VariantForm {
    pub size_id: SizeId,
    #[serde(default)]
    pub stock: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StockForm {
    pub stock: String,
}

/// Stock typed into a form; blank or invalid counts as zero.
fn parse_stock(value: Option<&str>) -> i32 {
    value
        .and_then(|v| v.trim().parse::<i32>().ok())
        .unwrap_or(0)
        .max(0)
}

/// POST /admin/products/{id}/variants
#[instrument(skip(state, admin, form), fields(admin = %admin.id))]
pub async fn add_variant(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Form(form): Form<VariantForm>,
) -> Result<Response> {
    let result = VariantRepository::new(state.pool())
        .create(id, form.size_id, parse_stock(form.stock.as_deref()))
        .await
        .map(|_| ());
    back_to(&product_page(id), result)
}

/// POST /admin/products/{id}/variants/{variant_id}/stock
#[instrument(skip(state, admin, form), fields(admin = %admin.id))]
pub async fn set_stock(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path((id, variant_id)): Path<(ProductId, VariantId)>,
    Form(form): Form<StockForm>,
) -> Result<Response> {
    let result = VariantRepository::new(state.pool())
        .set_stock(variant_id, parse_stock(Some(&form.stock)))
        .await;
    back_to(&product_page(id), result)
}

/// POST /admin/products/{id}/variants/{variant_id}/delete
#[instrument(skip(state, admin), fields(admin = %admin.id))]
pub async fn delete_variant(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path((id, variant_id)): Path<(ProductId, VariantId)>,
) -> Result<Response> {
    let result = VariantRepository::new(state.pool())
        .delete(variant_id)
        .await;
    back_to(&product_page(id), result)
}
