//! Authentication service.
//!
//! Email and password accounts hashed with Argon2id. A successful
//! registration creates the profile (zero wallet, not admin) and the
//! password row in one transaction.
//!
//! Password reset issues a random one-time token valid for
//! [`RESET_TOKEN_TTL_MINUTES`]. Only its SHA-256 is stored; redeeming it
//! rehashes the new password and spends every open token of the account.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use denim_core::{Email, UserId};

use crate::db::{PasswordResetRepository, ProfileRepository, RepositoryError};
use crate::models::{CurrentUser, Profile};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// How long a reset link stays valid.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;

const RESET_TOKEN_BYTES: usize = 32;

/// A reset token issued for an existing account, to be mailed as a link.
#[derive(Debug)]
pub struct ResetToken {
    pub user_id: UserId,
    pub email: Email,
    pub token: String,
}

/// Registration form input.
#[derive(Debug)]
pub struct Registration<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub password_confirmation: &'a str,
}

pub struct AuthService<'a> {
    profiles: ProfileRepository<'a>,
    resets: PasswordResetRepository<'a>,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            profiles: ProfileRepository::new(pool),
            resets: PasswordResetRepository::new(pool),
        }
    }

    /// Register a new customer.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingName`, `AuthError::InvalidEmail`,
    /// `AuthError::PasswordMismatch` or `AuthError::WeakPassword` for bad input.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(&self, form: &Registration<'_>) -> Result<Profile, AuthError> {
        let name = validate_registration(form)?;
        let email = Email::parse(form.email)?;
        let password_hash = hash_password(form.password)?;

        self.profiles
            .create_with_password(&email, name, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })
    }

    /// Check an email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (id, password_hash) = self
            .profiles
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        Ok(CurrentUser { id, email })
    }

    /// Issue a reset token for the account behind `email`. `Ok(None)` when
    /// there is no such account; callers answer the same either way.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for a malformed address and
    /// `AuthError::Repository` if the token cannot be stored.
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<ResetToken>, AuthError> {
        let email = Email::parse(email)?;
        let Some((user_id, _)) = self.profiles.get_password_hash(&email).await? else {
            return Ok(None);
        };

        let token = generate_reset_token();
        let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
        self.resets
            .create(user_id, &hash_reset_token(&token), expires_at)
            .await?;

        Ok(Some(ResetToken {
            user_id,
            email,
            token,
        }))
    }

    /// Redeem a reset token and set a new password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PasswordMismatch` or `AuthError::WeakPassword` for
    /// bad input and `AuthError::InvalidResetToken` when the token is
    /// unknown, used or expired. Nothing changes in any of these cases.
    pub async fn reset_password(
        &self,
        token: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<UserId, AuthError> {
        if password != password_confirmation {
            return Err(AuthError::PasswordMismatch);
        }
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        self.resets
            .consume(&hash_reset_token(token.trim()), &password_hash)
            .await?
            .ok_or(AuthError::InvalidResetToken)
    }
}

/// Random token for a reset link, hex encoded.
fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Stored form of a reset token.
fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Field checks that need no database. Returns the trimmed name.
fn validate_registration<'f>(form: &Registration<'f>) -> Result<&'f str, AuthError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(AuthError::MissingName);
    }
    if form.password != form.password_confirmation {
        return Err(AuthError::PasswordMismatch);
    }
    validate_password(form.password)?;
    Ok(name)
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a stored hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form<'a>(name: &'a str, password: &'a str, confirmation: &'a str) -> Registration<'a> {
        Registration {
            name,
            email: "shopper@denim.na",
            password,
            password_confirmation: confirmation,
        }
    }

    #[test]
    fn test_registration_requires_name() {
        let err = validate_registration(&form("   ", "secret1", "secret1")).unwrap_err();
        assert!(matches!(err, AuthError::MissingName));
    }

    #[test]
    fn test_registration_passwords_must_match() {
        let err = validate_registration(&form("Tangeni", "secret1", "secret2")).unwrap_err();
        assert!(matches!(err, AuthError::PasswordMismatch));
    }

    #[test]
    fn test_registration_min_length() {
        let err = validate_registration(&form("Tangeni", "abc12", "abc12")).unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword(_)));
        assert_eq!(
            validate_registration(&form(" Tangeni ", "abc123", "abc123")).unwrap(),
            "Tangeni"
        );
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("denim-jacket").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("denim-jacket", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_reset_tokens_are_random_hex() {
        let first = generate_reset_token();
        let second = generate_reset_token();
        assert_eq!(first.len(), RESET_TOKEN_BYTES * 2);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn test_reset_token_hash_is_stable_and_hides_token() {
        let token = generate_reset_token();
        let hash = hash_reset_token(&token);
        assert_eq!(hash, hash_reset_token(&token));
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, token);
        assert_ne!(hash, hash_reset_token(&generate_reset_token()));
    }

    #[test]
    fn test_reset_token_error_message() {
        assert_eq!(
            AuthError::InvalidResetToken.user_message(),
            "This reset link is invalid or has expired"
        );
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }
}
