//! Wire types for the order change feed.
//!
//! The storefront serves an order snapshot (`GET /api/orders`) and a
//! Server-Sent Events stream of [`OrderChange`]s (`GET /api/orders/feed`).
//! Both sides of that contract live here so the server and the
//! `order-sync` client cannot drift apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cents, OrderId, OrderStatus, ProductId, SizeId, UserId};

/// An order as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub subtotal_cents: Cents,
    pub shipping_cents: Cents,
    pub total_cents: Cents,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub shipping_address: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_postal_code: Option<String>,
    pub shipping_country: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Line items. Missing from a payload means none were sent.
    #[serde(default)]
    pub items: Vec<OrderItemRecord>,
}

/// One order line with the product title resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRecord {
    pub product_id: Option<ProductId>,
    pub product_title: Option<String>,
    pub size_id: Option<SizeId>,
    pub quantity: i32,
    pub price_cents: Cents,
}

/// Row-level change kind, matching the SSE `event:` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A single change to the `orders` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderChange {
    Insert { order: OrderRecord },
    Update { order: OrderRecord },
    Delete { id: OrderId, user_id: UserId },
}

impl OrderChange {
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert { .. } => ChangeKind::Insert,
            Self::Update { .. } => ChangeKind::Update,
            Self::Delete { .. } => ChangeKind::Delete,
        }
    }

    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        match self {
            Self::Insert { order } | Self::Update { order } => order.id,
            Self::Delete { id, .. } => *id,
        }
    }

    /// Owner of the changed row, used to scope non-admin subscriptions.
    #[must_use]
    pub const fn owner(&self) -> UserId {
        match self {
            Self::Insert { order } | Self::Update { order } => order.user_id,
            Self::Delete { user_id, .. } => *user_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_change_wire_format() {
        let id: OrderId = "0b3f1c52-8f0e-4c59-9a43-5d7a0e2d1b11".parse().unwrap();
        let user_id = UserId::generate();
        let change = OrderChange::Delete { id, user_id };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["type"], "delete");
        assert_eq!(json["id"], "0b3f1c52-8f0e-4c59-9a43-5d7a0e2d1b11");
        assert_eq!(change.kind().as_str(), "delete");
        assert_eq!(change.order_id(), id);
        assert_eq!(change.owner(), user_id);
    }

    #[test]
    fn test_feed_rows_default_to_no_items() {
        let json = serde_json::json!({
            "type": "update",
            "order": {
                "id": "0b3f1c52-8f0e-4c59-9a43-5d7a0e2d1b11",
                "user_id": "5f1d7c2a-3b4e-4f60-8a71-92c3d4e5f607",
                "status": "shipped",
                "subtotal_cents": 1000,
                "shipping_cents": 0,
                "total_cents": 1000,
                "customer_name": null,
                "customer_email": null,
                "customer_phone": null,
                "shipping_address": null,
                "shipping_city": null,
                "shipping_postal_code": null,
                "shipping_country": null,
                "notes": null,
                "created_at": "2026-01-05T10:00:00Z",
                "updated_at": "2026-01-06T10:00:00Z"
            }
        });
        let change: OrderChange = serde_json::from_value(json).unwrap();
        let OrderChange::Update { order } = &change else {
            panic!("expected update");
        };
        assert!(order.items.is_empty());
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(
            change.owner().to_string(),
            "5f1d7c2a-3b4e-4f60-8a71-92c3d4e5f607"
        );
    }
}
