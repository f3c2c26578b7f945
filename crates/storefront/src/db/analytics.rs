//! Product view tracking and admin analytics aggregates.

use sqlx::PgPool;

use denim_core::{ProductId, UserId};

use super::RepositoryError;

/// Upper bound on view rows scanned for the top-products ranking.
pub const VIEW_SCAN_LIMIT: i64 = 10_000;
/// Upper bound on products considered for the ranking.
pub const PRODUCT_SCAN_LIMIT: i64 = 1_000;
/// Products shown in the top-products table.
pub const TOP_PRODUCTS: i64 = 5;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductViewCount {
    pub product_id: ProductId,
    pub title: String,
    pub views: i64,
}

pub struct AnalyticsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AnalyticsRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record one product page view.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record_view(
        &self,
        product_id: ProductId,
        user_id: Option<UserId>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO product_views (product_id, user_id) VALUES ($1, $2)")
            .bind(product_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn total_views(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM product_views")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Most viewed products over the most recent views.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_products(&self) -> Result<Vec<ProductViewCount>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductViewCount>(
            r"
            WITH recent AS (
                SELECT product_id FROM product_views
                ORDER BY created_at DESC
                LIMIT $1
            ), candidates AS (
                SELECT id, title FROM products
                ORDER BY created_at DESC
                LIMIT $2
            )
            SELECT c.id AS product_id, c.title, COUNT(*)::bigint AS views
            FROM recent r
            JOIN candidates c ON c.id = r.product_id
            GROUP BY c.id, c.title
            ORDER BY views DESC, c.title ASC
            LIMIT $3
            ",
        )
        .bind(VIEW_SCAN_LIMIT)
        .bind(PRODUCT_SCAN_LIMIT)
        .bind(TOP_PRODUCTS)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
