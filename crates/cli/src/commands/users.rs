//! Profile management: admin flag and wallet balance.

use denim_core::{Cents, Email};
use denim_storefront::db::ProfileRepository;
use denim_storefront::models::Profile;
use sqlx::PgPool;

use super::CommandError;

async fn find(pool: &PgPool, email: &str) -> Result<Profile, CommandError> {
    let parsed = Email::parse(email).map_err(|_| CommandError::InvalidEmail(email.to_owned()))?;
    ProfileRepository::new(pool)
        .get_by_email(&parsed)
        .await?
        .ok_or_else(|| CommandError::UnknownUser(parsed.to_string()))
}

/// Grant or revoke administrator access.
///
/// # Errors
///
/// Returns an error if the email is invalid, unknown, or the update fails.
pub async fn set_admin(email: &str, is_admin: bool) -> Result<(), CommandError> {
    let pool = super::connect().await?;
    let profile = find(&pool, email).await?;

    ProfileRepository::new(&pool)
        .set_admin(profile.id, is_admin)
        .await?;

    tracing::info!(
        user_id = %profile.id,
        email = %profile.email,
        is_admin,
        "Admin flag updated"
    );
    Ok(())
}

/// Set a wallet balance, given in major units (e.g. `1250.00`).
///
/// # Errors
///
/// Returns an error if the amount is not a non-negative number, or the
/// email is invalid or unknown.
pub async fn set_wallet(email: &str, amount: &str) -> Result<(), CommandError> {
    let balance = parse_amount(amount)?;
    let pool = super::connect().await?;
    let profile = find(&pool, email).await?;

    ProfileRepository::new(&pool)
        .set_wallet(profile.id, balance)
        .await?;

    tracing::info!(
        user_id = %profile.id,
        email = %profile.email,
        previous = %profile.wallet,
        balance = %balance,
        "Wallet balance set"
    );
    Ok(())
}

fn parse_amount(amount: &str) -> Result<Cents, CommandError> {
    Cents::parse_major(amount).map_err(|_| CommandError::InvalidAmount(amount.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1250.5").unwrap().get(), 125_050);
        assert_eq!(parse_amount("0").unwrap().get(), 0);
        assert!(matches!(
            parse_amount("-3"),
            Err(CommandError::InvalidAmount(a)) if a == "-3"
        ));
        assert!(parse_amount("lots").is_err());
    }
}
