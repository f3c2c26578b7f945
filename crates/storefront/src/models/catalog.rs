//! Catalog domain types: products, images, variants, sizes, categories.

use chrono::{DateTime, Utc};

use denim_core::{Cents, CategoryId, ImageId, ProductId, SizeId, VariantId};

#[derive(Debug, Clone)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub description: Option<String>,
    pub price: Cents,
    pub color: Option<String>,
    pub category_id: Option<CategoryId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Storage path of the primary image, else the oldest image.
    pub thumbnail_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProductImage {
    pub id: ImageId,
    pub product_id: ProductId,
    pub storage_path: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// A (product, size) pairing with its own stock count.
#[derive(Debug, Clone)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub size_id: SizeId,
    pub size_label: String,
    pub stock: i32,
}

/// A product with its images (primary first) and variants.
#[derive(Debug, Clone)]
pub struct ProductDetail {
    pub product: Product,
    pub images: Vec<ProductImage>,
    pub variants: Vec<ProductVariant>,
}

#[derive(Debug, Clone)]
pub struct Size {
    pub id: SizeId,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// Input for creating a product from the admin form.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub title: String,
    pub description: Option<String>,
    pub price: Cents,
    pub color: Option<String>,
    pub category_id: Option<CategoryId>,
}

/// Filters for the public product listing.
///
/// Every field is optional; blank strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    /// Case-insensitive substring of the title.
    pub query: Option<String>,
    /// Exact color match.
    pub color: Option<String>,
    /// Inclusive lower price bound.
    pub min_price: Option<Cents>,
    /// Inclusive upper price bound.
    pub max_price: Option<Cents>,
    /// Size label, resolved through the product's variants.
    pub size: Option<String>,
}

impl ProductFilter {
    /// Trim text filters and drop the ones left empty.
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        }

        Self {
            query: clean(self.query),
            color: clean(self.color),
            size: clean(self.size),
            ..self
        }
    }

    /// `true` when no filter is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.query.is_none()
            && self.color.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
            && self.size.is_none()
    }

    /// `ILIKE` pattern for the title search, with wildcards in the input escaped.
    #[must_use]
    pub fn title_pattern(&self) -> Option<String> {
        self.query.as_ref().map(|q| {
            let escaped = q
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{escaped}%")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_drops_blank_filters() {
        let filter = ProductFilter {
            query: Some("  ".to_owned()),
            color: Some(" blue ".to_owned()),
            size: Some(String::new()),
            ..ProductFilter::default()
        }
        .normalized();

        assert_eq!(filter.query, None);
        assert_eq!(filter.color.as_deref(), Some("blue"));
        assert_eq!(filter.size, None);
        assert!(!filter.is_empty());
        assert!(ProductFilter::default().normalized().is_empty());
    }

    #[test]
    fn test_title_pattern_escapes_wildcards() {
        let filter = ProductFilter {
            query: Some("50%_off".to_owned()),
            ..ProductFilter::default()
        };
        assert_eq!(filter.title_pattern().as_deref(), Some("%50\\%\\_off%"));
        assert_eq!(ProductFilter::default().title_pattern(), None);
    }
}
