//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use denim_core::{Cents, ProductId};

use crate::db::{AnalyticsRepository, CatalogRepository, TaxonomyRepository};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::models::ProductFilter;
use crate::routes::{Nav, ProductCard};
use crate::services::storage::PRODUCT_IMAGES_BUCKET;
use crate::state::AppState;

/// Listing query string. Prices are in major units (`min=50&max=100`).
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub q: Option<String>,
    pub color: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub size: Option<String>,
}

impl ListingQuery {
    /// Unparseable prices are ignored rather than rejected.
    fn to_filter(&self) -> ProductFilter {
        let price = |raw: Option<&str>| {
            raw.map(str::trim)
                .filter(|value| !value.is_empty())
                .and_then(|value| Cents::parse_major(value).ok())
        };
        ProductFilter {
            query: self.q.clone(),
            color: self.color.clone(),
            min_price: price(self.min.as_deref()),
            max_price: price(self.max.as_deref()),
            size: self.size.clone(),
        }
        .normalized()
    }
}

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    pub added: Option<String>,
    pub error: Option<String>,
}

/// Option in a filter dropdown.
#[derive(Clone)]
pub struct Choice {
    pub value: String,
    pub selected: bool,
}

fn choices(values: Vec<String>, current: Option<&str>) -> Vec<Choice> {
    values
        .into_iter()
        .map(|value| Choice {
            selected: current == Some(value.as_str()),
            value,
        })
        .collect()
}

/// Size option on the add-to-cart form.
#[derive(Clone)]
pub struct SizeOption {
    pub size_id: String,
    pub label: String,
    pub in_stock: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub nav: Nav,
    pub products: Vec<ProductCard>,
    pub colors: Vec<Choice>,
    pub sizes: Vec<Choice>,
    pub q: String,
    pub min: String,
    pub max: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub nav: Nav,
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub price: String,
    pub color: Option<String>,
    pub image_urls: Vec<String>,
    pub sizes: Vec<SizeOption>,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Display the product listing with optional filters.
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<ListingQuery>,
) -> Result<impl IntoResponse> {
    let filter = query.to_filter();
    let catalog = CatalogRepository::new(state.pool());
    let products = catalog.list_active(&filter).await?;
    let colors = catalog.active_colors().await?;
    let sizes: Vec<String> = TaxonomyRepository::new(state.pool())
        .list_sizes()
        .await?
        .into_iter()
        .map(|size| size.label)
        .collect();

    Ok(ProductsIndexTemplate {
        nav: Nav::load(&state, user.as_ref()).await,
        products: products
            .iter()
            .map(|product| ProductCard::new(&state, product))
            .collect(),
        colors: choices(colors, filter.color.as_deref()),
        sizes: choices(sizes, filter.size.as_deref()),
        q: query.q.unwrap_or_default(),
        min: query.min.unwrap_or_default(),
        max: query.max.unwrap_or_default(),
    })
}

/// Display a product and record the view.
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<ProductId>,
    Query(query): Query<DetailQuery>,
) -> Result<impl IntoResponse> {
    let detail = CatalogRepository::new(state.pool())
        .get_detail(id)
        .await?
        .filter(|detail| detail.product.is_active)
        .ok_or_else(|| AppError::NotFound("Product not found".to_owned()))?;

    if let Err(e) = AnalyticsRepository::new(state.pool())
        .record_view(id, user.as_ref().map(|u| u.id))
        .await
    {
        tracing::warn!(product_id = %id, error = %e, "Failed to record product view");
    }

    let product = detail.product;
    Ok(ProductShowTemplate {
        nav: Nav::load(&state, user.as_ref()).await,
        id: product.id.to_string(),
        title: product.title,
        description: product.description,
        price: product.price.to_string(),
        color: product.color,
        image_urls: detail
            .images
            .iter()
            .map(|image| state.public_url(PRODUCT_IMAGES_BUCKET, &image.storage_path))
            .collect(),
        sizes: detail
            .variants
            .into_iter()
            .map(|variant| SizeOption {
                size_id: variant.size_id.to_string(),
                label: variant.size_label,
                in_stock: variant.stock > 0,
            })
            .collect(),
        error: query.error,
        success: query.added.map(|_| "Added to cart".to_owned()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_query_to_filter() {
        let query = ListingQuery {
            min: Some("50".to_owned()),
            max: Some("100".to_owned()),
            color: Some("blue".to_owned()),
            ..ListingQuery::default()
        };
        let filter = query.to_filter();
        assert_eq!(filter.min_price, Some(Cents::new(5_000)));
        assert_eq!(filter.max_price, Some(Cents::new(10_000)));
        assert_eq!(filter.color.as_deref(), Some("blue"));
        assert_eq!(filter.query, None);
    }

    #[test]
    fn test_unparseable_price_ignored() {
        let query = ListingQuery {
            min: Some("cheap".to_owned()),
            max: Some(String::new()),
            ..ListingQuery::default()
        };
        assert!(query.to_filter().is_empty());
    }
}
