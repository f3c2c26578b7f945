//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during registration and login.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] denim_core::EmailError),

    /// Wrong password or no account for the email.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("name is required")]
    MissingName,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Unknown, used or expired reset token.
    #[error("invalid reset token")]
    InvalidResetToken,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("password hashing error")]
    PasswordHash,
}

impl AuthError {
    /// Message safe to show next to the form.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidEmail(_) => "Please enter a valid email address".to_owned(),
            Self::InvalidCredentials => "Invalid email or password".to_owned(),
            Self::UserAlreadyExists => "An account with this email already exists".to_owned(),
            Self::MissingName => "Please enter your name".to_owned(),
            Self::PasswordMismatch => "Passwords do not match".to_owned(),
            Self::WeakPassword(msg) => msg.clone(),
            Self::InvalidResetToken => "This reset link is invalid or has expired".to_owned(),
            Self::Repository(_) | Self::PasswordHash => {
                "Something went wrong, please try again".to_owned()
            }
        }
    }
}
