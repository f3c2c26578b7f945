//! Catalog repository: product listing, detail and admin product maintenance.
//!
//! Reads are never cached; every call goes to the database.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use denim_core::{Cents, CategoryId, ProductId};

use super::{ImageRepository, RepositoryError, VariantRepository};
use crate::models::{NewProduct, Product, ProductDetail, ProductFilter};

/// Homepage feed size.
pub const HOME_FEED_LIMIT: i64 = 20;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    title: String,
    description: Option<String>,
    price_cents: Cents,
    color: Option<String>,
    category_id: Option<CategoryId>,
    is_active: bool,
    created_at: DateTime<Utc>,
    thumbnail_path: Option<String>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            price: row.price_cents,
            color: row.color,
            category_id: row.category_id,
            is_active: row.is_active,
            created_at: row.created_at,
            thumbnail_path: row.thumbnail_path,
        }
    }
}

/// Product columns plus the thumbnail: primary image first, else the oldest.
const PRODUCT_SELECT: &str = r"
    SELECT p.id, p.title, p.description, p.price_cents, p.color, p.category_id,
           p.is_active, p.created_at,
           (SELECT i.storage_path
              FROM product_images i
             WHERE i.product_id = p.id
             ORDER BY i.is_primary DESC, i.created_at ASC
             LIMIT 1) AS thumbnail_path
    FROM products p
";

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog reads and admin product writes.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Active products matching `filter`, ordered by title.
    ///
    /// The size filter resolves through `product_variants` joined to `sizes`
    /// on the size label; an unknown label yields no products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r"{PRODUCT_SELECT}
            WHERE p.is_active
              AND ($1::text IS NULL OR p.title ILIKE $1)
              AND ($2::text IS NULL OR p.color = $2)
              AND ($3::bigint IS NULL OR p.price_cents >= $3)
              AND ($4::bigint IS NULL OR p.price_cents <= $4)
              AND ($5::text IS NULL OR EXISTS (
                    SELECT 1
                      FROM product_variants v
                      JOIN sizes s ON s.id = v.size_id
                     WHERE v.product_id = p.id AND s.label = $5))
            ORDER BY p.title ASC
            "
        ))
        .bind(filter.title_pattern())
        .bind(filter.color.as_deref())
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(filter.size.as_deref())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Newest active products, for the homepage.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest_active(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{PRODUCT_SELECT} WHERE p.is_active ORDER BY p.created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Distinct colors of active products, for the filter form.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active_colors(&self) -> Result<Vec<String>, RepositoryError> {
        let colors = sqlx::query_scalar::<_, String>(
            r"
            SELECT DISTINCT color FROM products
            WHERE is_active AND color IS NOT NULL AND color <> ''
            ORDER BY color
            ",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(colors)
    }

    /// Get a single product row (active or not).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("{PRODUCT_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// Get a product with its images and variants.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any query fails.
    pub async fn get_detail(&self, id: ProductId) -> Result<Option<ProductDetail>, RepositoryError> {
        let Some(product) = self.get(id).await? else {
            return Ok(None);
        };
        let images = ImageRepository::new(self.pool).list_for_product(id).await?;
        let variants = VariantRepository::new(self.pool).list_for_product(id).await?;

        Ok(Some(ProductDetail {
            product,
            images,
            variants,
        }))
    }

    /// All products for the admin list, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{PRODUCT_SELECT} ORDER BY p.created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Create a product (active by default).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO products (title, description, price_cents, color, category_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, description, price_cents, color, category_id,
                      is_active, created_at, NULL::text AS thumbnail_path
            ",
        )
        .bind(&product.title)
        .bind(product.description.as_deref())
        .bind(product.price)
        .bind(product.color.as_deref())
        .bind(product.category_id)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Flip the active flag, returning the new value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn toggle_active(&self, id: ProductId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>(
            r"
            UPDATE products SET is_active = NOT is_active, updated_at = now()
            WHERE id = $1
            RETURNING is_active
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a product, returning the storage paths of its images so the
    /// caller can remove the objects.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<Vec<String>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let paths = sqlx::query_scalar::<_, String>(
            "SELECT storage_path FROM product_images WHERE product_id = $1",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(paths)
    }

    /// Delete every product. Images and variants cascade.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM products")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Total and inactive product counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn counts(&self) -> Result<(i64, i64), RepositoryError> {
        let counts = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE NOT is_active) FROM products",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(counts)
    }
}
