//! Contact form route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use denim_core::Email;

use crate::db::ContactRepository;
use crate::error::Result;
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::models::NewContactMessage;
use crate::routes::cart::redirect_with_error;
use crate::routes::{Nav, non_empty};
use crate::state::AppState;

/// Contact form body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl ContactForm {
    /// Check required fields and the email address.
    ///
    /// # Errors
    ///
    /// Returns the message to show next to the form.
    pub fn validate(self) -> std::result::Result<NewContactMessage, &'static str> {
        let name = self.name.trim();
        let message = self.message.trim();
        if name.is_empty() || message.is_empty() {
            return Err("Name, email and message are required");
        }
        let email = Email::parse(&self.email).map_err(|_| "Please enter a valid email address")?;

        Ok(NewContactMessage {
            name: name.to_owned(),
            last_name: non_empty(self.last_name),
            email,
            subject: non_empty(self.subject),
            message: message.to_owned(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ContactQuery {
    pub error: Option<String>,
    pub sent: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "contact.html")]
pub struct ContactTemplate {
    pub nav: Nav,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Display the contact form.
pub async fn page(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<ContactQuery>,
) -> ContactTemplate {
    ContactTemplate {
        nav: Nav::load(&state, user.as_ref()).await,
        error: query.error,
        success: query
            .sent
            .map(|_| "Thanks! We'll get back to you soon.".to_owned()),
    }
}

/// Store a contact message as unread.
#[instrument(skip(state, form))]
pub async fn submit(State(state): State<AppState>, Form(form): Form<ContactForm>) -> Result<Response> {
    let message = match form.validate() {
        Ok(message) => message,
        Err(msg) => return Ok(redirect_with_error("/contact", msg)),
    };

    let id = ContactRepository::new(state.pool()).create(&message).await?;
    tracing::info!(message_id = %id, "Contact message received");

    Ok(Redirect::to("/contact?sent=1").into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::FromRequest, http::Request};

    async fn form(body: &'static str) -> ContactForm {
        let request = Request::post("/contact")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        let Form(form) = Form::<ContactForm>::from_request(request, &()).await.unwrap();
        form
    }

    #[tokio::test]
    async fn test_valid_message_trims_optional_fields() {
        let message = form("name=Selma&lastName=+&email=selma%40shop.na&subject=Sizing&message=Hi")
            .await
            .validate()
            .unwrap();
        assert_eq!(message.name, "Selma");
        assert_eq!(message.last_name, None);
        assert_eq!(message.subject.as_deref(), Some("Sizing"));
        assert_eq!(message.email.as_str(), "selma@shop.na");
    }

    #[tokio::test]
    async fn test_rejects_missing_message_and_bad_email() {
        assert!(form("name=Selma&email=selma%40shop.na").await.validate().is_err());
        assert_eq!(
            form("name=Selma&email=nope&message=Hi")
                .await
                .validate()
                .unwrap_err(),
            "Please enter a valid email address"
        );
    }
}
