//! Object storage client for product images and homepage covers.
//!
//! Objects are addressed by `(bucket, path)`. Public URLs are derived from
//! the storage base URL, so only the path is kept in the database.

use std::fmt;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::StorageConfig;

/// Bucket holding product gallery images.
pub const PRODUCT_IMAGES_BUCKET: &str = "product-images";

/// Bucket holding the homepage cover image.
pub const COVERS_BUCKET: &str = "covers";

/// Errors that can occur when talking to object storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Storage returned an error response.
    #[error("storage error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Client could not be configured.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Write and delete objects in a bucket.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path`. With `upsert == false` an existing object
    /// at the same path is an error.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError>;

    /// Delete objects. Missing paths are not an error.
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StorageError>;
}

/// Public URL of an object.
#[must_use]
pub fn public_url(base_url: &str, bucket: &str, path: &str) -> String {
    format!(
        "{}/storage/v1/object/public/{bucket}/{path}",
        base_url.trim_end_matches('/')
    )
}

/// Storage over the REST object API.
#[derive(Clone)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for HttpObjectStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpObjectStorage")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpObjectStorage {
    /// Create a storage client. Writes authenticate with the service role
    /// key when configured, otherwise with the public key.
    ///
    /// # Errors
    ///
    /// Returns error if a key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let key = match &config.service_role_key {
            Some(key) => key.expose_secret().to_owned(),
            None => {
                tracing::warn!("STORAGE_SERVICE_ROLE_KEY not set, uploads use the public key");
                config.public_key.clone()
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| StorageError::Config(format!("Invalid storage key format: {e}")))?,
        );
        headers.insert(
            "apikey",
            HeaderValue::from_str(&key)
                .map_err(|e| StorageError::Config(format!("Invalid storage key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{bucket}/{path}", self.base_url)
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError> {
        let response = self
            .client
            .post(self.object_url(bucket, path))
            .header("Content-Type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, paths), fields(count = paths.len()))]
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StorageError> {
        if paths.is_empty() {
            return Ok(());
        }

        let url = format!("{}/storage/v1/object/{bucket}", self.base_url);
        let response = self
            .client
            .delete(&url)
            .json(&serde_json::json!({ "prefixes": paths }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}
