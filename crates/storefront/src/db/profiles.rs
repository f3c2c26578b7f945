//! Profile repository: identity rows, password hashes, admin flag, wallet.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use denim_core::{Cents, Email, UserId, WalletTransactionKind};

use super::{RepositoryError, conflict_on_unique};
use crate::models::Profile;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: UserId,
    email: String,
    full_name: Option<String>,
    username: Option<String>,
    wallet_cents: Cents,
    is_admin: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = RepositoryError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            email,
            full_name: row.full_name,
            username: row.username,
            wallet: row.wallet_cents,
            is_admin: row.is_admin,
            created_at: row.created_at,
        })
    }
}

const PROFILE_COLUMNS: &str =
    "id, email, full_name, username, wallet_cents, is_admin, created_at";

// =============================================================================
// Repository
// =============================================================================

/// Repository for profile database operations.
pub struct ProfileRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProfileRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a profile by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored email is invalid.
    pub async fn get(&self, id: UserId) -> Result<Option<Profile>, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a profile by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<Profile>, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Read only the admin flag. `None` when the profile does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn is_admin(&self, id: UserId) -> Result<Option<bool>, RepositoryError> {
        let flag = sqlx::query_scalar::<_, bool>("SELECT is_admin FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(flag)
    }

    /// All profiles, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Profile>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Count all profiles.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Create a profile together with its password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create_with_password(
        &self,
        email: &Email,
        full_name: &str,
        password_hash: &str,
    ) -> Result<Profile, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "INSERT INTO profiles (email, full_name) VALUES ($1, $2) RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(email.as_str())
        .bind(full_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?;

        sqlx::query("INSERT INTO user_passwords (user_id, password_hash) VALUES ($1, $2)")
            .bind(row.id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        row.try_into()
    }

    /// Get the stored password hash for an email, with the profile ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(UserId, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, (UserId, String)>(
            r"
            SELECT p.id, up.password_hash
            FROM profiles p
            JOIN user_passwords up ON up.user_id = p.id
            WHERE p.email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Set or clear the admin flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the profile does not exist.
    pub async fn set_admin(&self, id: UserId, is_admin: bool) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE profiles SET is_admin = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(is_admin)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Set the wallet balance, recording the difference in the ledger.
    ///
    /// The profile row is locked for the duration so a concurrent checkout
    /// debit is not lost.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the profile does not exist.
    pub async fn set_wallet(&self, id: UserId, balance: Cents) -> Result<(), RepositoryError> {
        if balance.is_negative() {
            return Err(RepositoryError::Conflict(
                "wallet balance cannot be negative".to_owned(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_scalar::<_, Cents>(
            "SELECT wallet_cents FROM profiles WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        sqlx::query("UPDATE profiles SET wallet_cents = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(balance)
            .execute(&mut *tx)
            .await?;

        let delta = balance - current;
        if delta != Cents::ZERO {
            sqlx::query(
                "INSERT INTO wallet_transactions (user_id, amount_cents, kind) VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(delta)
            .bind(WalletTransactionKind::Adjustment.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
