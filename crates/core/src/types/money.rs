//! Money in integer minor currency units.
//!
//! Every amount in the store (prices, order totals, wallet balances, ledger
//! entries) is a whole number of cents. Decimal arithmetic is only used at
//! the edges, when an admin or shopper types an amount in major units.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub};
use std::sync::OnceLock;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Display prefix used until [`set_currency_prefix`] is called.
pub const DEFAULT_CURRENCY_PREFIX: &str = "N$";

static CURRENCY_PREFIX: OnceLock<String> = OnceLock::new();

/// Set the prefix every [`Cents`] is displayed with. Only the first call
/// takes effect; returns `false` for later calls.
pub fn set_currency_prefix(prefix: impl Into<String>) -> bool {
    CURRENCY_PREFIX.set(prefix.into()).is_ok()
}

/// The prefix amounts are currently displayed with.
#[must_use]
pub fn currency_prefix() -> &'static str {
    CURRENCY_PREFIX
        .get()
        .map_or(DEFAULT_CURRENCY_PREFIX, String::as_str)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount is not a number: {0}")]
    Invalid(String),
    #[error("amount cannot be negative")]
    Negative,
    #[error("amount is too large")]
    Overflow,
}

/// An amount of money in minor currency units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(transparent))]
pub struct Cents(i64);

impl Cents {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Line total for `quantity` units at this unit price.
    #[must_use]
    pub fn times(self, quantity: i32) -> Self {
        Self(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Convert a major-unit amount (e.g. `49.99`) to cents, rounding half
    /// away from zero at the second decimal place.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] for amounts below zero and
    /// [`MoneyError::Overflow`] when the result does not fit in `i64`.
    pub fn from_major(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        let cents = amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::Overflow)?
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
        cents.to_i64().map(Self).ok_or(MoneyError::Overflow)
    }

    /// Parse a major-unit amount typed into a form field.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Invalid`] when the input is not a decimal number,
    /// plus the errors of [`Cents::from_major`].
    pub fn parse_major(input: &str) -> Result<Self, MoneyError> {
        let trimmed = input.trim();
        let amount = trimmed
            .parse::<Decimal>()
            .map_err(|_| MoneyError::Invalid(trimmed.to_owned()))?;
        Self::from_major(amount)
    }

    /// Amount in major units, for payment providers that want decimals.
    #[must_use]
    pub fn to_major(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Render with the configured [`currency_prefix`] and two decimals.
    #[must_use]
    pub fn display(self) -> String {
        self.to_string()
    }

    /// Render with an explicit prefix, e.g. `N$1299.99`.
    #[must_use]
    pub fn display_with(self, prefix: &str) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{prefix}{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_with(currency_prefix()))
    }
}

impl Add for Cents {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Cents {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Cents {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<i64> for Cents {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_two_decimals_with_prefix() {
        assert_eq!(Cents::new(0).display_with("N$"), "N$0.00");
        assert_eq!(Cents::new(5).display_with("N$"), "N$0.05");
        assert_eq!(Cents::new(129_999).display_with("N$"), "N$1299.99");
        assert_eq!(Cents::new(-4500).display_with("N$"), "N$-45.00");
    }

    #[test]
    fn test_display_uses_configured_prefix() {
        assert_eq!(Cents::new(45_000).display_with("R "), "R 450.00");
        assert_eq!(
            Cents::new(45_000).to_string(),
            Cents::new(45_000).display_with(currency_prefix())
        );
    }

    #[test]
    fn test_parse_major_units() {
        assert_eq!(Cents::parse_major("50").unwrap(), Cents::new(5000));
        assert_eq!(Cents::parse_major(" 499.99 ").unwrap(), Cents::new(49_999));
        assert_eq!(Cents::parse_major("0.005").unwrap(), Cents::new(1));
        assert_eq!(Cents::parse_major("12.344").unwrap(), Cents::new(1234));
    }

    #[test]
    fn test_parse_major_rejects_bad_input() {
        assert_eq!(Cents::parse_major("-1"), Err(MoneyError::Negative));
        assert!(matches!(Cents::parse_major("ten"), Err(MoneyError::Invalid(_))));
        assert!(matches!(Cents::parse_major(""), Err(MoneyError::Invalid(_))));
    }

    #[test]
    fn test_line_totals_and_sum() {
        let lines = [(Cents::new(45_000), 2), (Cents::new(1_999), 3)];
        let total: Cents = lines.iter().map(|(p, q)| p.times(*q)).sum();
        assert_eq!(total, Cents::new(95_997));
    }

    #[test]
    fn test_to_major() {
        assert_eq!(Cents::new(1050).to_major().to_string(), "10.50");
    }
}
