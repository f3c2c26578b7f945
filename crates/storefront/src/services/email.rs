//! Transactional email over SMTP via lettre, rendered from Askama templates.
//!
//! Without SMTP settings the mailer stays usable: messages are logged
//! instead of sent, so password reset works on a development machine.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetEmailHtml<'a> {
    link: &'a str,
    ttl_minutes: i64,
}

#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetEmailText<'a> {
    link: &'a str,
    ttl_minutes: i64,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Clone)]
struct Smtp {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

/// Sends storefront mail, or logs it when SMTP is not configured.
#[derive(Clone, Default)]
pub struct Mailer {
    smtp: Option<Smtp>,
}

impl Mailer {
    /// Build a mailer. `None` gives one that only logs.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: Option<&EmailConfig>) -> Result<Self, SmtpError> {
        let Some(config) = config else {
            return Ok(Self::default());
        };

        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            smtp: Some(Smtp {
                mailer,
                from_address: config.from_address.clone(),
            }),
        })
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.smtp.is_some()
    }

    /// Send a password reset link.
    ///
    /// # Errors
    ///
    /// Returns error if the template fails to render or the message cannot
    /// be sent.
    pub async fn send_password_reset(
        &self,
        to: &str,
        link: &str,
        ttl_minutes: i64,
    ) -> Result<(), EmailError> {
        let Some(smtp) = &self.smtp else {
            tracing::info!(to = %to, link = %link, "SMTP not configured, password reset link logged");
            return Ok(());
        };

        let html = PasswordResetEmailHtml { link, ttl_minutes }.render()?;
        let text = PasswordResetEmailText { link, ttl_minutes }.render()?;
        smtp.send_multipart(to, "Reset your password", &text, &html)
            .await
    }
}

impl Smtp {
    async fn send_multipart(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LINK: &str = "https://denim.na/reset/update?token=ab12";

    #[test]
    fn test_reset_email_bodies_carry_link() {
        let html = PasswordResetEmailHtml {
            link: LINK,
            ttl_minutes: 60,
        }
        .render()
        .unwrap();
        let text = PasswordResetEmailText {
            link: LINK,
            ttl_minutes: 60,
        }
        .render()
        .unwrap();
        assert!(html.contains("<a href="));
        assert!(html.contains("token=ab12"));
        assert!(text.contains(LINK));
        assert!(text.contains("60 minutes"));
    }

    #[tokio::test]
    async fn test_unconfigured_mailer_logs_instead_of_sending() {
        let mailer = Mailer::new(None).unwrap();
        assert!(!mailer.is_configured());
        mailer
            .send_password_reset("selma@shop.na", LINK, 60)
            .await
            .unwrap();
    }
}
