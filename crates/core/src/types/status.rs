//! Status enums stored as database text columns.
//!
//! Repositories bind `as_str()` and parse rows back with `FromStr`.

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// The usual path is `pending -> paid -> shipped -> delivered`, with
/// `cancelled` reachable from anything not yet delivered. Admins may set any
/// status directly; no transition is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Paid,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses whose totals count as revenue in admin analytics.
    #[must_use]
    pub const fn counts_as_sale(self) -> bool {
        matches!(self, Self::Paid | Self::Shipped | Self::Delivered)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// Kind tag on a wallet ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionKind {
    /// Wallet checkout debit (negative amount).
    Purchase,
    /// Balance set by an admin; amount is the signed difference.
    Adjustment,
}

impl std::fmt::Display for WalletTransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WalletTransactionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Adjustment => "adjustment",
        }
    }
}

impl std::str::FromStr for WalletTransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(Self::Purchase),
            "adjustment" => Ok(Self::Adjustment),
            _ => Err(format!("invalid wallet transaction kind: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<OrderStatus>().is_err());
        assert!("Paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_sales_statuses() {
        let sales: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(|s| s.counts_as_sale())
            .collect();
        assert_eq!(
            sales,
            vec![OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered]
        );
    }

    #[test]
    fn test_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert_eq!(
            serde_json::to_string(&WalletTransactionKind::Purchase).unwrap(),
            "\"purchase\""
        );
    }
}
