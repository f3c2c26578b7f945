//! Contact messages inbox.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use denim_core::ContactMessageId;

use crate::db::ContactRepository;
use crate::error::{ApiResult, AppError, Result};
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::models::ContactMessage;
use crate::routes::Nav;
use crate::state::AppState;

#[derive(Template, WebTemplate)]
#[template(path = "admin/contact.html")]
pub struct ContactInboxTemplate {
    pub nav: Nav,
    pub current_path: &'static str,
    pub messages: Vec<ContactMessageView>,
    pub unread: i64,
}

#[derive(Clone)]
pub struct ContactMessageView {
    pub id: String,
    pub sender: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub is_read: bool,
    pub received_at: String,
}

impl From<ContactMessage> for ContactMessageView {
    fn from(m: ContactMessage) -> Self {
        let sender = match m.last_name {
            Some(last) => format!("{} {last}", m.name),
            None => m.name,
        };
        Self {
            id: m.id.to_string(),
            sender,
            email: m.email,
            subject: m.subject.unwrap_or_default(),
            message: m.message,
            is_read: m.is_read,
            received_at: m.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// GET /admin/contact
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<ContactInboxTemplate> {
    let repo = ContactRepository::new(state.pool());
    let messages = repo.list().await?;
    let unread = repo.unread_count().await?;

    Ok(ContactInboxTemplate {
        nav: Nav::load(&state, Some(&admin)).await,
        current_path: "/admin/contact",
        messages: messages.into_iter().map(Into::into).collect(),
        unread,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    #[serde(default)]
    pub message_id: Option<String>,
}

impl MarkReadRequest {
    fn id(&self) -> std::result::Result<ContactMessageId, AppError> {
        self.message_id
            .as_deref()
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| AppError::BadRequest("Message ID is required".to_owned()))
    }
}

/// POST /api/admin/contact-messages/mark-read
#[instrument(skip(state, admin), fields(admin = %admin.id))]
pub async fn mark_read(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<MarkReadRequest>,
) -> ApiResult<Response> {
    let id = request.id()?;
    if let Err(e) = ContactRepository::new(state.pool()).mark_read(id).await {
        tracing::error!(message_id = %id, error = %e, "Failed to mark message read");
        return Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Failed to update message" })),
        )
            .into_response());
    }

    Ok(Json(json!({ "success": true })).into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_read_requires_message_id() {
        let missing: MarkReadRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(
            missing.id().unwrap_err().public_message(),
            "Message ID is required"
        );

        let present: MarkReadRequest =
            serde_json::from_str(r#"{"messageId":"7c9e6679-7425-40de-944b-e07fc1f90ae7"}"#)
                .unwrap();
        assert!(present.id().is_ok());
    }
}
