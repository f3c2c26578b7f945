//! Order domain types.

use chrono::{DateTime, Utc};

use denim_core::{
    Cents, OrderId, OrderItemId, OrderItemRecord, OrderRecord, OrderStatus, ProductId, SizeId,
    UserId,
};

#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub subtotal: Cents,
    pub shipping: Cents,
    pub total: Cents,
    pub customer: CustomerDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One order line. `price` is the unit price copied when the order was placed.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: Option<ProductId>,
    pub product_title: Option<String>,
    pub size_id: Option<SizeId>,
    pub size_label: Option<String>,
    pub quantity: i32,
    pub price: Cents,
}

impl OrderItem {
    #[must_use]
    pub fn line_total(&self) -> Cents {
        self.price.times(self.quantity)
    }
}

/// Contact and shipping fields captured on an order.
///
/// Wallet checkouts leave these empty; direct orders require name, email,
/// address and city.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub notes: Option<String>,
}

impl Order {
    /// Wire form used by the order snapshot API and change feed.
    #[must_use]
    pub fn into_record(self, items: Vec<OrderItem>) -> OrderRecord {
        OrderRecord {
            id: self.id,
            user_id: self.user_id,
            status: self.status,
            subtotal_cents: self.subtotal,
            shipping_cents: self.shipping,
            total_cents: self.total,
            customer_name: self.customer.name,
            customer_email: self.customer.email,
            customer_phone: self.customer.phone,
            shipping_address: self.customer.address,
            shipping_city: self.customer.city,
            shipping_postal_code: self.customer.postal_code,
            shipping_country: self.customer.country,
            notes: self.customer.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items: items
                .into_iter()
                .map(|item| OrderItemRecord {
                    product_id: item.product_id,
                    product_title: item.product_title,
                    size_id: item.size_id,
                    quantity: item.quantity,
                    price_cents: item.price,
                })
                .collect(),
        }
    }
}
