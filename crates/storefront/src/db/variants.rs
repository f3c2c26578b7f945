//! Product variants: one row per (product, size) with a stock count.

use sqlx::PgPool;

use denim_core::{ProductId, SizeId, VariantId};

use super::{RepositoryError, conflict_on_unique};
use crate::models::ProductVariant;

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: VariantId,
    product_id: ProductId,
    size_id: SizeId,
    size_label: String,
    stock: i32,
}

impl From<VariantRow> for ProductVariant {
    fn from(row: VariantRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            size_id: row.size_id,
            size_label: row.size_label,
            stock: row.stock,
        }
    }
}

pub struct VariantRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> VariantRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Variants of a product ordered by size label.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<ProductVariant>, RepositoryError> {
        let rows = sqlx::query_as::<_, VariantRow>(
            r"
            SELECT v.id, v.product_id, v.size_id, s.label AS size_label, v.stock
            FROM product_variants v
            JOIN sizes s ON s.id = v.size_id
            WHERE v.product_id = $1
            ORDER BY s.label ASC
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// The variant for a product and size, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find(
        &self,
        product_id: ProductId,
        size_id: SizeId,
    ) -> Result<Option<ProductVariant>, RepositoryError> {
        let row = sqlx::query_as::<_, VariantRow>(
            r"
            SELECT v.id, v.product_id, v.size_id, s.label AS size_label, v.stock
            FROM product_variants v
            JOIN sizes s ON s.id = v.size_id
            WHERE v.product_id = $1 AND v.size_id = $2
            ",
        )
        .bind(product_id)
        .bind(size_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Add a size to a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the product already has that size.
    pub async fn create(
        &self,
        product_id: ProductId,
        size_id: SizeId,
        stock: i32,
    ) -> Result<VariantId, RepositoryError> {
        sqlx::query_scalar::<_, VariantId>(
            r"
            INSERT INTO product_variants (product_id, size_id, stock)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(product_id)
        .bind(size_id)
        .bind(stock.max(0))
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "variant for this size"))
    }

    /// Set a variant's stock count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the variant does not exist.
    pub async fn set_stock(&self, id: VariantId, stock: i32) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE product_variants SET stock = $2 WHERE id = $1")
            .bind(id)
            .bind(stock.max(0))
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete a variant.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the variant does not exist.
    pub async fn delete(&self, id: VariantId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM product_variants WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
