//! Site settings (singleton row).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::RepositoryError;

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct SiteSettings {
    pub cover_image_path: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct SettingsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SettingsRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Current settings; defaults when the row has never been written.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self) -> Result<SiteSettings, RepositoryError> {
        let settings = sqlx::query_as::<_, SiteSettings>(
            "SELECT cover_image_path, updated_at FROM site_settings WHERE id",
        )
        .fetch_optional(self.pool)
        .await?;
        Ok(settings.unwrap_or_default())
    }

    /// Point the homepage cover at a new storage path, creating the row if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    pub async fn set_cover(&self, path: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO site_settings (id, cover_image_path, updated_at)
            VALUES (TRUE, $1, now())
            ON CONFLICT (id) DO UPDATE
            SET cover_image_path = EXCLUDED.cover_image_path, updated_at = now()
            ",
        )
        .bind(path)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}
