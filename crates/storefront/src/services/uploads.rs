//! Validated image uploads for the back office.
//!
//! A file is checked against its [`UploadKind`] policy before any write.
//! The object is stored first and the metadata row written second; if the
//! metadata write fails the stored object is removed again.

use std::future::Future;

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;

use denim_core::ProductId;

use super::storage::{COVERS_BUCKET, ObjectStorage, PRODUCT_IMAGES_BUCKET, StorageError};
use crate::db::{ImageRepository, RepositoryError, SettingsRepository};
use crate::models::ProductImage;

const MIB: usize = 1024 * 1024;

/// What an uploaded file is for. Each kind has its own type and size policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    ProductImage,
    Cover,
}

impl UploadKind {
    #[must_use]
    pub const fn allowed_types(self) -> &'static [&'static str] {
        match self {
            Self::ProductImage => &["image/jpeg", "image/png", "image/webp", "image/gif"],
            Self::Cover => &["image/jpeg", "image/png", "image/webp"],
        }
    }

    #[must_use]
    pub const fn max_bytes(self) -> usize {
        match self {
            Self::ProductImage => 20 * MIB,
            Self::Cover => 10 * MIB,
        }
    }

    #[must_use]
    pub const fn bucket(self) -> &'static str {
        match self {
            Self::ProductImage => PRODUCT_IMAGES_BUCKET,
            Self::Cover => COVERS_BUCKET,
        }
    }

    /// Covers replace in place; product images never overwrite.
    #[must_use]
    pub const fn upsert(self) -> bool {
        matches!(self, Self::Cover)
    }

    const fn type_message(self) -> &'static str {
        match self {
            Self::ProductImage => "Invalid file type. Only JPEG, PNG, WebP, and GIF are allowed.",
            Self::Cover => "Invalid file type. Only JPEG, PNG, and WebP are allowed for covers.",
        }
    }

    const fn size_message(self) -> &'static str {
        match self {
            Self::ProductImage => "File too large. Maximum size is 20MB.",
            Self::Cover => "File too large. Maximum size for covers is 10MB.",
        }
    }
}

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file provided")]
    NoFile,

    #[error("no product provided")]
    NoProduct,

    #[error("{0}")]
    InvalidType(&'static str),

    #[error("{0}")]
    TooLarge(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl UploadError {
    /// Value of the `error` query parameter on the redirect back.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoFile => "nofile",
            Self::NoProduct => "noproduct",
            Self::InvalidType(_) | Self::TooLarge(_) | Self::Storage(_) | Self::Repository(_) => {
                "upload"
            }
        }
    }

    /// Value of the `message` query parameter, if any.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::NoFile | Self::NoProduct => None,
            Self::InvalidType(msg) | Self::TooLarge(msg) => Some((*msg).to_owned()),
            Self::Storage(e) => Some(format!("Upload failed: {e}")),
            Self::Repository(RepositoryError::NotFound) => Some("Product not found".to_owned()),
            Self::Repository(_) => Some("Database error".to_owned()),
        }
    }
}

/// Check the file against the policy for `kind`.
///
/// # Errors
///
/// Returns `UploadError::NoFile` for an empty file, `InvalidType` or
/// `TooLarge` when the policy rejects it.
pub fn validate(kind: UploadKind, file: &UploadedFile) -> Result<(), UploadError> {
    if file.bytes.is_empty() {
        return Err(UploadError::NoFile);
    }
    if !kind.allowed_types().contains(&file.content_type.as_str()) {
        return Err(UploadError::InvalidType(kind.type_message()));
    }
    if file.bytes.len() > kind.max_bytes() {
        return Err(UploadError::TooLarge(kind.size_message()));
    }
    Ok(())
}

/// Replace every character outside `[a-zA-Z0-9.-]` with `_`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `{product_id}/{millis}-{name}` for product images, `cover/{millis}-{name}`
/// for covers.
#[must_use]
pub fn object_path(product_id: Option<ProductId>, millis: i64, file_name: &str) -> String {
    let name = sanitize_filename(file_name);
    product_id.map_or_else(
        || format!("cover/{millis}-{name}"),
        |id| format!("{id}/{millis}-{name}"),
    )
}

/// Store the object, then run `record`. Removes the object if `record` fails.
async fn store_then_record<T, F, Fut>(
    storage: &dyn ObjectStorage,
    kind: UploadKind,
    path: &str,
    file: UploadedFile,
    record: F,
) -> Result<T, UploadError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    storage
        .upload(kind.bucket(), path, file.bytes, &file.content_type, kind.upsert())
        .await?;

    match record().await {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(path, error = %e, "Metadata write failed, removing stored object");
            if let Err(cleanup) = storage.remove(kind.bucket(), &[path.to_owned()]).await {
                tracing::error!(path, error = %cleanup, "Failed to remove orphaned object");
            }
            Err(e.into())
        }
    }
}

pub struct UploadService<'a> {
    pool: &'a PgPool,
    storage: &'a dyn ObjectStorage,
}

impl<'a> UploadService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, storage: &'a dyn ObjectStorage) -> Self {
        Self { pool, storage }
    }

    /// Add an image to a product's gallery.
    ///
    /// # Errors
    ///
    /// Returns a validation error before anything is written, or a storage
    /// or database error (with the stored object cleaned up).
    #[tracing::instrument(skip(self, file), fields(file_name = %file.file_name))]
    pub async fn upload_product_image(
        &self,
        product_id: ProductId,
        file: UploadedFile,
        requested_primary: bool,
    ) -> Result<ProductImage, UploadError> {
        validate(UploadKind::ProductImage, &file)?;
        let path = object_path(Some(product_id), Utc::now().timestamp_millis(), &file.file_name);

        let images = ImageRepository::new(self.pool);
        let image = store_then_record(self.storage, UploadKind::ProductImage, &path, file, || {
            images.insert(product_id, &path, requested_primary)
        })
        .await?;

        tracing::info!(image_id = %image.id, is_primary = image.is_primary, "Product image uploaded");
        Ok(image)
    }

    /// Replace the homepage cover. Returns the stored path.
    ///
    /// # Errors
    ///
    /// Same as [`Self::upload_product_image`].
    #[tracing::instrument(skip(self, file), fields(file_name = %file.file_name))]
    pub async fn upload_cover(&self, file: UploadedFile) -> Result<String, UploadError> {
        validate(UploadKind::Cover, &file)?;
        let path = object_path(None, Utc::now().timestamp_millis(), &file.file_name);

        let settings = SettingsRepository::new(self.pool);
        store_then_record(self.storage, UploadKind::Cover, &path, file, || {
            settings.set_cover(&path)
        })
        .await?;

        tracing::info!(path = %path, "Cover image updated");
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::storage::memory::MemoryStorage;

    fn file(content_type: &str, size: usize) -> UploadedFile {
        UploadedFile {
            file_name: "front view.png".to_owned(),
            content_type: content_type.to_owned(),
            bytes: vec![0u8; size],
        }
    }

    #[test]
    fn test_product_image_policy() {
        assert!(validate(UploadKind::ProductImage, &file("image/gif", 10)).is_ok());
        assert!(validate(UploadKind::ProductImage, &file("image/png", 20 * MIB)).is_ok());

        let err = validate(UploadKind::ProductImage, &file("image/png", 20 * MIB + 1)).unwrap_err();
        assert_eq!(err.message().as_deref(), Some("File too large. Maximum size is 20MB."));

        let err = validate(UploadKind::ProductImage, &file("image/svg+xml", 10)).unwrap_err();
        assert_eq!(err.code(), "upload");
        assert_eq!(
            err.message().as_deref(),
            Some("Invalid file type. Only JPEG, PNG, WebP, and GIF are allowed.")
        );
    }

    #[test]
    fn test_cover_policy() {
        assert!(validate(UploadKind::Cover, &file("image/webp", 10 * MIB)).is_ok());

        let err = validate(UploadKind::Cover, &file("image/gif", 10)).unwrap_err();
        assert_eq!(
            err.message().as_deref(),
            Some("Invalid file type. Only JPEG, PNG, and WebP are allowed for covers.")
        );

        let err = validate(UploadKind::Cover, &file("image/jpeg", 15 * MIB)).unwrap_err();
        assert_eq!(
            err.message().as_deref(),
            Some("File too large. Maximum size for covers is 10MB.")
        );
    }

    #[test]
    fn test_empty_file_is_missing() {
        let err = validate(UploadKind::Cover, &file("image/png", 0)).unwrap_err();
        assert_eq!(err.code(), "nofile");
    }

    #[test]
    fn test_object_paths() {
        assert_eq!(sanitize_filename("my jeans (1).JPG"), "my_jeans__1_.JPG");
        assert_eq!(object_path(None, 1_700_000_000_000, "hero.webp"), "cover/1700000000000-hero.webp");

        let id = ProductId::generate();
        assert_eq!(object_path(Some(id), 5, "a/b.png"), format!("{id}/5-a_b.png"));
    }

    #[tokio::test]
    async fn test_failed_record_removes_object() {
        let storage = MemoryStorage::default();
        let result: Result<(), UploadError> = store_then_record(
            &storage,
            UploadKind::ProductImage,
            "p/1-a.png",
            file("image/png", 4),
            || async { Err(RepositoryError::NotFound) },
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.message().as_deref(), Some("Product not found"));
        assert!(storage.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_record_keeps_object() {
        let storage = MemoryStorage::default();
        let value = store_then_record(
            &storage,
            UploadKind::Cover,
            "cover/1-a.png",
            file("image/png", 4),
            || async { Ok(7) },
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
        let objects = storage.objects.lock().unwrap();
        assert!(objects.contains_key(&("covers".to_owned(), "cover/1-a.png".to_owned())));
    }

    #[tokio::test]
    async fn test_storage_failure_skips_record() {
        let storage = MemoryStorage {
            fail_uploads: true,
            ..MemoryStorage::default()
        };
        let mut called = false;
        let result: Result<(), UploadError> = store_then_record(
            &storage,
            UploadKind::Cover,
            "cover/1-a.png",
            file("image/png", 4),
            || {
                called = true;
                async { Ok(()) }
            },
        )
        .await;

        assert!(matches!(result, Err(UploadError::Storage(_))));
        assert!(!called);
    }
}
