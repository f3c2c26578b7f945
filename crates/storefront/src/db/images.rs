//! Product image metadata with single-primary bookkeeping.
//!
//! Every write that can change which image is primary runs in one
//! transaction holding the product row lock, and clears the flag on the
//! other rows first. The partial unique index
//! `product_images_single_primary_idx` backs this up.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use denim_core::{ImageId, ProductId};

use super::RepositoryError;
use crate::models::ProductImage;

#[derive(Debug, sqlx::FromRow)]
struct ImageRow {
    id: ImageId,
    product_id: ProductId,
    storage_path: String,
    is_primary: bool,
    created_at: DateTime<Utc>,
}

impl From<ImageRow> for ProductImage {
    fn from(row: ImageRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            storage_path: row.storage_path,
            is_primary: row.is_primary,
            created_at: row.created_at,
        }
    }
}

/// Whether a newly uploaded image becomes primary: when asked to, or when
/// the product has no images yet.
#[must_use]
pub const fn should_be_primary(requested: bool, existing_images: i64) -> bool {
    requested || existing_images == 0
}

pub struct ImageRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ImageRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Images of a product, primary first then oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<ProductImage>, RepositoryError> {
        let rows = sqlx::query_as::<_, ImageRow>(
            r"
            SELECT id, product_id, storage_path, is_primary, created_at
            FROM product_images
            WHERE product_id = $1
            ORDER BY is_primary DESC, created_at ASC
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Record an uploaded image.
    ///
    /// The image is primary if `requested_primary` is set or it is the
    /// product's first image; in either case every other image of the
    /// product loses the flag in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Database` if any statement fails.
    pub async fn insert(
        &self,
        product_id: ProductId,
        storage_path: &str,
        requested_primary: bool,
    ) -> Result<ProductImage, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        lock_product(&mut tx, product_id).await?;

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM product_images WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;

        let is_primary = should_be_primary(requested_primary, existing);
        if is_primary {
            clear_primary(&mut tx, product_id).await?;
        }

        let row = sqlx::query_as::<_, ImageRow>(
            r"
            INSERT INTO product_images (product_id, storage_path, is_primary)
            VALUES ($1, $2, $3)
            RETURNING id, product_id, storage_path, is_primary, created_at
            ",
        )
        .bind(product_id)
        .bind(storage_path)
        .bind(is_primary)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    /// Make an existing image the product's only primary image.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the image does not belong to the product.
    pub async fn set_primary(
        &self,
        product_id: ProductId,
        image_id: ImageId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        lock_product(&mut tx, product_id).await?;
        clear_primary(&mut tx, product_id).await?;

        let result = sqlx::query(
            "UPDATE product_images SET is_primary = TRUE WHERE id = $1 AND product_id = $2",
        )
        .bind(image_id)
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete an image row, returning its storage path. If it was primary,
    /// the oldest remaining image is promoted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the image does not belong to the product.
    pub async fn delete(
        &self,
        product_id: ProductId,
        image_id: ImageId,
    ) -> Result<String, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        lock_product(&mut tx, product_id).await?;

        let (path, was_primary) = sqlx::query_as::<_, (String, bool)>(
            r"
            DELETE FROM product_images WHERE id = $1 AND product_id = $2
            RETURNING storage_path, is_primary
            ",
        )
        .bind(image_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if was_primary {
            sqlx::query(
                r"
                UPDATE product_images SET is_primary = TRUE
                WHERE id = (
                    SELECT id FROM product_images
                    WHERE product_id = $1
                    ORDER BY created_at ASC
                    LIMIT 1
                )
                ",
            )
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(path)
    }

    /// Storage paths of every product image.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn all_paths(&self) -> Result<Vec<String>, RepositoryError> {
        let paths = sqlx::query_scalar::<_, String>("SELECT storage_path FROM product_images")
            .fetch_all(self.pool)
            .await?;
        Ok(paths)
    }
}

async fn lock_product(
    tx: &mut Transaction<'_, Postgres>,
    product_id: ProductId,
) -> Result<(), RepositoryError> {
    sqlx::query_scalar::<_, ProductId>("SELECT id FROM products WHERE id = $1 FOR UPDATE")
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    Ok(())
}

async fn clear_primary(
    tx: &mut Transaction<'_, Postgres>,
    product_id: ProductId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE product_images SET is_primary = FALSE WHERE product_id = $1 AND is_primary",
    )
    .bind(product_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_image_is_always_primary() {
        assert!(should_be_primary(false, 0));
        assert!(should_be_primary(true, 0));
    }

    #[test]
    fn test_later_images_primary_only_on_request() {
        assert!(!should_be_primary(false, 3));
        assert!(should_be_primary(true, 3));
    }
}
