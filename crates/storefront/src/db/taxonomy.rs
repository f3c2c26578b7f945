//! Sizes and categories.

use sqlx::PgPool;

use denim_core::{CategoryId, SizeId};

use super::{RepositoryError, conflict_on_unique};
use crate::models::{Category, Size};

pub struct TaxonomyRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TaxonomyRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_sizes(&self) -> Result<Vec<Size>, RepositoryError> {
        let rows = sqlx::query_as::<_, (SizeId, String)>(
            "SELECT id, label FROM sizes ORDER BY label ASC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, label)| Size { id, label })
            .collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the label is taken.
    pub async fn create_size(&self, label: &str) -> Result<Size, RepositoryError> {
        let id = sqlx::query_scalar::<_, SizeId>("INSERT INTO sizes (label) VALUES ($1) RETURNING id")
            .bind(label)
            .fetch_one(self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "size"))?;
        Ok(Size {
            id,
            label: label.to_owned(),
        })
    }

    /// Delete a size. Sizes still used by variants cannot be deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if variants reference the size.
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn delete_size(&self, id: SizeId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM sizes WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_foreign_key_violation()
                {
                    return RepositoryError::Conflict("size is used by product variants".to_owned());
                }
                RepositoryError::Database(e)
            })?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, (CategoryId, String)>(
            "SELECT id, name FROM categories ORDER BY name ASC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| Category { id, name })
            .collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create_category(&self, name: &str) -> Result<Category, RepositoryError> {
        let id = sqlx::query_scalar::<_, CategoryId>(
            "INSERT INTO categories (name) VALUES ($1) RETURNING id",
        )
        .bind(name)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "category"))?;
        Ok(Category {
            id,
            name: name.to_owned(),
        })
    }

    /// Delete a category. Products in it become uncategorised.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
