//! Catalog maintenance.

use denim_storefront::config::StorageConfig;
use denim_storefront::services::{CatalogMaintenance, HttpObjectStorage};

/// Delete every product: stored images first, then the rows (images,
/// variants and cart lines cascade; order lines keep their snapshot).
///
/// # Errors
///
/// Returns an error if configuration is missing, storage removal fails,
/// or the database delete fails.
pub async fn purge() -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;

    let storage_config = StorageConfig::from_env()?;
    if storage_config.service_role_key.is_none() {
        return Err("STORAGE_SERVICE_ROLE_KEY not set".into());
    }
    let storage = HttpObjectStorage::new(&storage_config)?;

    tracing::warn!("Purging all products...");
    let report = CatalogMaintenance::new(&pool, &storage).purge().await?;

    tracing::info!("Purge complete!");
    tracing::info!("  Products deleted: {}", report.products);
    tracing::info!("  Stored objects removed: {}", report.objects);
    Ok(())
}
