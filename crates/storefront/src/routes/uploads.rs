//! Admin image upload endpoints.
//!
//! Both endpoints take `multipart/form-data` and answer with a redirect back
//! to the admin page that posted the form, carrying `?success=1` or
//! `?error=<code>&message=<text>`.

use std::collections::HashMap;

use axum::{
    extract::{Multipart, State},
    response::Redirect,
};
use tracing::instrument;

use denim_core::ProductId;

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::services::UploadService;
use crate::services::uploads::{UploadError, UploadedFile};
use crate::state::AppState;

const PRODUCTS_PAGE: &str = "/admin/products";
const SETTINGS_PAGE: &str = "/admin/settings";

/// A parsed `multipart/form-data` body: the `file` part plus text fields.
#[derive(Debug, Default)]
pub(crate) struct MultipartForm {
    /// `None` when no file part was sent or the browser sent an empty one.
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl MultipartForm {
    /// A text field, trimmed; blank values read as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

pub(crate) async fn read_multipart(mut multipart: Multipart) -> Result<MultipartForm> {
    let mut form = MultipartForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let content_type = field.content_type().unwrap_or_default().to_owned();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Invalid file field: {e}")))?;
            if !bytes.is_empty() {
                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Invalid form field: {e}")))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

/// Build the redirect target for an upload outcome.
fn outcome_target(page: &str, outcome: std::result::Result<(), &UploadError>) -> String {
    match outcome {
        Ok(()) => format!("{page}?success=1"),
        Err(e) => {
            let mut target = format!("{page}?error={}", e.code());
            if let Some(message) = e.message() {
                target.push_str("&message=");
                target.push_str(&urlencoding::encode(&message));
            }
            target
        }
    }
}

fn log_failure(e: &UploadError) {
    match e {
        UploadError::Storage(_) | UploadError::Repository(_) => {
            tracing::error!(error = %e, "Upload failed");
        }
        _ => tracing::info!(error = %e, "Upload rejected"),
    }
}

async fn store_product_image(
    state: &AppState,
    form: MultipartForm,
) -> std::result::Result<(), UploadError> {
    if form.file.is_none() {
        return Err(UploadError::NoFile);
    }
    let product_id = form
        .text("productId")
        .ok_or(UploadError::NoProduct)?
        .parse::<ProductId>()
        .map_err(|_| UploadError::NoProduct)?;
    let is_primary = form.text("isPrimary") == Some("true");
    let file = form.file.ok_or(UploadError::NoFile)?;

    UploadService::new(state.pool(), state.storage())
        .upload_product_image(product_id, file, is_primary)
        .await?;
    Ok(())
}

/// Upload a product image.
///
/// POST /api/upload
#[instrument(skip(state, multipart), fields(admin = %admin.id))]
pub async fn product_image(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    multipart: Multipart,
) -> Result<Redirect> {
    let form = read_multipart(multipart).await?;
    let outcome = store_product_image(&state, form).await;

    if let Err(e) = &outcome {
        log_failure(e);
    }
    Ok(Redirect::to(&outcome_target(PRODUCTS_PAGE, outcome.as_ref().map(|_| ()))))
}

/// Replace the homepage cover image.
///
/// POST /api/upload/cover
#[instrument(skip(state, multipart), fields(admin = %admin.id))]
pub async fn cover(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    multipart: Multipart,
) -> Result<Redirect> {
    let form = read_multipart(multipart).await?;

    let outcome = match form.file {
        Some(file) => UploadService::new(state.pool(), state.storage())
            .upload_cover(file)
            .await
            .map(|_| ()),
        None => Err(UploadError::NoFile),
    };

    if let Err(e) = &outcome {
        log_failure(e);
    }
    Ok(Redirect::to(&outcome_target(SETTINGS_PAGE, outcome.as_ref().map(|_| ()))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_target() {
        assert_eq!(outcome_target(PRODUCTS_PAGE, Ok(())), "/admin/products?success=1");
    }

    #[test]
    fn test_error_targets_carry_code_and_message() {
        assert_eq!(
            outcome_target(PRODUCTS_PAGE, Err(&UploadError::NoFile)),
            "/admin/products?error=nofile"
        );
        assert_eq!(
            outcome_target(PRODUCTS_PAGE, Err(&UploadError::NoProduct)),
            "/admin/products?error=noproduct"
        );
        assert_eq!(
            outcome_target(
                SETTINGS_PAGE,
                Err(&UploadError::TooLarge("File too large. Maximum size for covers is 10MB."))
            ),
            "/admin/settings?error=upload&message=File%20too%20large.%20Maximum%20size%20for%20covers%20is%2010MB."
        );
    }
}
