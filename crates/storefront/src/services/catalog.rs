//! Catalog maintenance that spans the database and object storage.

use sqlx::PgPool;
use thiserror::Error;

use denim_core::{ImageId, ProductId};

use crate::db::{CatalogRepository, ImageRepository, RepositoryError};
use crate::services::storage::{ObjectStorage, PRODUCT_IMAGES_BUCKET, StorageError};

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// What a purge removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub products: u64,
    pub objects: usize,
}

pub struct CatalogMaintenance<'a> {
    pool: &'a PgPool,
    storage: &'a dyn ObjectStorage,
}

impl<'a> CatalogMaintenance<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, storage: &'a dyn ObjectStorage) -> Self {
        Self { pool, storage }
    }

    /// Delete a product and then its image objects.
    ///
    /// Objects that fail to delete are logged and left behind.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let paths = CatalogRepository::new(self.pool).delete(id).await?;
        self.remove_objects(&paths).await;
        tracing::info!(product_id = %id, images = paths.len(), "Product deleted");
        Ok(())
    }

    /// Delete one gallery image: the stored object, then the row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the image is not on the product.
    #[tracing::instrument(skip(self))]
    pub async fn delete_image(
        &self,
        product_id: ProductId,
        image_id: ImageId,
    ) -> Result<(), RepositoryError> {
        let images = ImageRepository::new(self.pool);
        let image = images
            .list_for_product(product_id)
            .await?
            .into_iter()
            .find(|image| image.id == image_id)
            .ok_or(RepositoryError::NotFound)?;

        self.remove_objects(std::slice::from_ref(&image.storage_path))
            .await;
        images.delete(product_id, image_id).await?;
        Ok(())
    }

    /// Remove every product image object, then every product row.
    ///
    /// # Errors
    ///
    /// Returns `PurgeError::Storage` before any row is touched if the
    /// objects cannot be removed.
    #[tracing::instrument(skip(self))]
    pub async fn purge(&self) -> Result<PurgeReport, PurgeError> {
        let paths = ImageRepository::new(self.pool).all_paths().await?;
        if !paths.is_empty() {
            self.storage.remove(PRODUCT_IMAGES_BUCKET, &paths).await?;
        }
        let products = CatalogRepository::new(self.pool).delete_all().await?;

        tracing::warn!(products, objects = paths.len(), "Catalog purged");
        Ok(PurgeReport {
            products,
            objects: paths.len(),
        })
    }

    async fn remove_objects(&self, paths: &[String]) {
        if paths.is_empty() {
            return;
        }
        if let Err(e) = self.storage.remove(PRODUCT_IMAGES_BUCKET, paths).await {
            tracing::warn!(error = %e, count = paths.len(), "Failed to remove image objects");
        }
    }
}
