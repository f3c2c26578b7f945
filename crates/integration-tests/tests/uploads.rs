//! Upload validation and primary-image bookkeeping against the database.
//!
//! Storage is replaced by [`RecordingStorage`]; rows are real.

#![allow(clippy::unwrap_used)]

use denim_core::ProductId;
use denim_integration_tests::{RecordingStorage, create_product, pool};
use denim_storefront::db::{ImageRepository, RepositoryError};
use denim_storefront::services::{UploadError, UploadService};
use denim_storefront::services::uploads::UploadedFile;

fn image(name: &str, content_type: &str, len: usize) -> UploadedFile {
    UploadedFile {
        file_name: name.to_string(),
        content_type: content_type.to_string(),
        bytes: vec![0xAB; len],
    }
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_rejected_files_leave_no_trace() {
    let pool = pool().await;
    let storage = RecordingStorage::default();
    let product = create_product(&pool, 45_000, "blue").await;
    let uploads = UploadService::new(&pool, &storage);

    let wrong_type = uploads
        .upload_product_image(product.id, image("notes.pdf", "application/pdf", 128), true)
        .await;
    assert!(matches!(wrong_type, Err(UploadError::InvalidType(_))));

    let too_large = uploads
        .upload_product_image(
            product.id,
            image("huge.png", "image/png", 20 * 1024 * 1024 + 1),
            false,
        )
        .await;
    assert!(matches!(too_large, Err(UploadError::TooLarge(_))));

    assert!(storage.uploaded().is_empty());
    assert!(
        ImageRepository::new(&pool)
            .list_for_product(product.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_first_image_is_primary_and_stays_unique() {
    let pool = pool().await;
    let storage = RecordingStorage::default();
    let product = create_product(&pool, 45_000, "blue").await;
    let uploads = UploadService::new(&pool, &storage);

    let first = uploads
        .upload_product_image(product.id, image("front.jpg", "image/jpeg", 64), false)
        .await
        .unwrap();
    assert!(first.is_primary);

    let second = uploads
        .upload_product_image(product.id, image("back.jpg", "image/jpeg", 64), false)
        .await
        .unwrap();
    assert!(!second.is_primary);

    let third = uploads
        .upload_product_image(product.id, image("detail.webp", "image/webp", 64), true)
        .await
        .unwrap();
    assert!(third.is_primary);

    let images = ImageRepository::new(&pool)
        .list_for_product(product.id)
        .await
        .unwrap();
    let primaries: Vec<_> = images.iter().filter(|i| i.is_primary).collect();
    assert_eq!(images.len(), 3);
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].id, third.id);

    let paths = storage.uploaded();
    assert_eq!(paths.len(), 3);
    assert!(paths.iter().all(|p| p.starts_with(&product.id.to_string())));
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_failed_metadata_insert_removes_stored_object() {
    let pool = pool().await;
    let storage = RecordingStorage::default();
    let uploads = UploadService::new(&pool, &storage);

    let result = uploads
        .upload_product_image(ProductId::generate(), image("x.png", "image/png", 64), false)
        .await;
    assert!(matches!(
        result,
        Err(UploadError::Repository(RepositoryError::NotFound))
    ));

    let uploaded = storage.uploaded();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(*storage.removed.lock().unwrap(), uploaded);
}
