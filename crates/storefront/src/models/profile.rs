//! Customer profile.

use chrono::{DateTime, Utc};

use denim_core::{Cents, Email, UserId};

/// A customer profile row.
///
/// Created at registration. Only admin actions change `wallet` and
/// `is_admin`, apart from wallet checkout debits.
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: UserId,
    pub email: Email,
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub wallet: Cents,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Name to greet the customer with.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or_else(|| self.email.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn profile(full_name: Option<&str>, username: Option<&str>) -> Profile {
        Profile {
            id: UserId::generate(),
            email: Email::parse("ndapewa@shop.na").unwrap(),
            full_name: full_name.map(String::from),
            username: username.map(String::from),
            wallet: Cents::ZERO,
            is_admin: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(profile(Some("Ndapewa"), Some("nda")).display_name(), "Ndapewa");
        assert_eq!(profile(None, Some("nda")).display_name(), "nda");
        assert_eq!(profile(None, None).display_name(), "ndapewa@shop.na");
    }
}
