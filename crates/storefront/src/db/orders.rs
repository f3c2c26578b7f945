//! Order repository.
//!
//! Reads for confirmation pages, dashboards and the order snapshot API, plus
//! the transaction-scoped writes that checkout and direct orders compose in
//! [`crate::services::checkout`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use denim_core::{
    Cents, OrderId, OrderItemId, OrderRecord, OrderStatus, ProductId, SizeId, UserId,
    WalletTransactionKind,
};

use super::RepositoryError;
use crate::models::{CustomerDetails, Order, OrderItem};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    status: String,
    subtotal_cents: Cents,
    shipping_cents: Cents,
    total_cents: Cents,
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    shipping_address: Option<String>,
    shipping_city: Option<String>,
    shipping_postal_code: Option<String>,
    shipping_country: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(RepositoryError::DataCorruption)?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            status,
            subtotal: row.subtotal_cents,
            shipping: row.shipping_cents,
            total: row.total_cents,
            customer: CustomerDetails {
                name: row.customer_name,
                email: row.customer_email,
                phone: row.customer_phone,
                address: row.shipping_address,
                city: row.shipping_city,
                postal_code: row.shipping_postal_code,
                country: row.shipping_country,
                notes: row.notes,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: Option<ProductId>,
    product_title: Option<String>,
    size_id: Option<SizeId>,
    size_label: Option<String>,
    quantity: i32,
    price_cents: Cents,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_title: row.product_title,
            size_id: row.size_id,
            size_label: row.size_label,
            quantity: row.quantity,
            price: row.price_cents,
        }
    }
}

const ORDER_COLUMNS: &str = r"
    id, user_id, status, subtotal_cents, shipping_cents, total_cents,
    customer_name, customer_email, customer_phone, shipping_address,
    shipping_city, shipping_postal_code, shipping_country, notes,
    created_at, updated_at
";

const ITEM_SELECT: &str = r"
    SELECT oi.id, oi.order_id, oi.product_id, p.title AS product_title,
           oi.size_id, s.label AS size_label, oi.quantity, oi.price_cents
    FROM order_items oi
    LEFT JOIN products p ON p.id = oi.product_id
    LEFT JOIN sizes s ON s.id = oi.size_id
";

/// Order totals for the admin dashboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderStats {
    pub total_orders: i64,
    pub pending_orders: i64,
    /// Sum of totals over paid, shipped and delivered orders.
    pub sales_total: Cents,
}

/// Values for a new order row.
#[derive(Debug)]
pub struct NewOrder<'a> {
    pub user_id: UserId,
    pub status: OrderStatus,
    pub subtotal: Cents,
    pub shipping: Cents,
    pub total: Cents,
    pub customer: &'a CustomerDetails,
    pub idempotency_key: Option<Uuid>,
    pub payment_session_id: Option<&'a str>,
}

/// Values for a new order line.
#[derive(Debug, Clone, Copy)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub size_id: Option<SizeId>,
    pub quantity: i32,
    pub unit_price: Cents,
}

// =============================================================================
// Repository
// =============================================================================

pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get any order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get an order only if it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_for_user(
        &self,
        id: OrderId,
        user_id: UserId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Lines of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "{ITEM_SELECT} WHERE oi.order_id = $1 ORDER BY p.title NULLS LAST"
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Orders placed by a customer, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Every order, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Snapshot for the change feed: orders newest first with their items.
    /// `None` means every customer's orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn snapshot(
        &self,
        owner: Option<UserId>,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let orders = match owner {
            Some(user_id) => self.list_for_user(user_id).await?,
            None => self.list_all().await?,
        };
        let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();

        let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "{ITEM_SELECT} WHERE oi.order_id = ANY($1) ORDER BY p.title NULLS LAST"
        ))
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            by_order.entry(row.order_id).or_default().push(row.into());
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                order.into_record(items)
            })
            .collect())
    }

    /// One order with its items, as the change feed publishes it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn record(&self, id: OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let Some(order) = self.get(id).await? else {
            return Ok(None);
        };
        let items = self.items(id).await?;
        Ok(Some(order.into_record(items)))
    }

    /// Set an order's status. Any status may be set from any other.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Order counts and sales total.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        let (total_orders, pending_orders, sales_total) = sqlx::query_as::<_, (i64, i64, i64)>(
            r"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'pending'),
                   COALESCE(SUM(total_cents) FILTER (
                       WHERE status IN ('paid', 'shipped', 'delivered')), 0)::bigint
            FROM orders
            ",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(OrderStats {
            total_orders,
            pending_orders,
            sales_total: Cents::new(sales_total),
        })
    }
}

// =============================================================================
// Transaction-scoped writes
// =============================================================================

/// The order already created for this idempotency key by this customer.
pub(crate) async fn find_by_idempotency_key(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    key: Uuid,
) -> Result<Option<OrderId>, RepositoryError> {
    let id = sqlx::query_scalar::<_, OrderId>(
        "SELECT id FROM orders WHERE idempotency_key = $1 AND user_id = $2",
    )
    .bind(key)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(id)
}

/// Whether a card checkout session has already been recorded.
pub(crate) async fn find_by_payment_session(
    tx: &mut Transaction<'_, Postgres>,
    session_id: &str,
) -> Result<Option<OrderId>, RepositoryError> {
    let id =
        sqlx::query_scalar::<_, OrderId>("SELECT id FROM orders WHERE payment_session_id = $1")
            .bind(session_id)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(id)
}

/// Current wallet balance, re-read inside the transaction.
pub(crate) async fn wallet_balance(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
) -> Result<Cents, RepositoryError> {
    sqlx::query_scalar::<_, Cents>("SELECT wallet_cents FROM profiles WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// Decrement the balance only if it covers `amount`. Returns `false` when
/// the balance was too low and nothing changed.
pub(crate) async fn debit_wallet(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    amount: Cents,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE profiles
        SET wallet_cents = wallet_cents - $2, updated_at = now()
        WHERE id = $1 AND wallet_cents >= $2
        ",
    )
    .bind(user_id)
    .bind(amount)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn insert_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &NewOrder<'_>,
) -> Result<OrderId, RepositoryError> {
    let id = sqlx::query_scalar::<_, OrderId>(
        r"
        INSERT INTO orders (
            user_id, status, subtotal_cents, shipping_cents, total_cents,
            customer_name, customer_email, customer_phone, shipping_address,
            shipping_city, shipping_postal_code, shipping_country, notes,
            idempotency_key, payment_session_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING id
        ",
    )
    .bind(order.user_id)
    .bind(order.status.as_str())
    .bind(order.subtotal)
    .bind(order.shipping)
    .bind(order.total)
    .bind(order.customer.name.as_deref())
    .bind(order.customer.email.as_deref())
    .bind(order.customer.phone.as_deref())
    .bind(order.customer.address.as_deref())
    .bind(order.customer.city.as_deref())
    .bind(order.customer.postal_code.as_deref())
    .bind(order.customer.country.as_deref())
    .bind(order.customer.notes.as_deref())
    .bind(order.idempotency_key)
    .bind(order.payment_session_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

pub(crate) async fn insert_items(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
    items: &[NewOrderItem],
) -> Result<(), RepositoryError> {
    for item in items {
        sqlx::query(
            r"
            INSERT INTO order_items (order_id, product_id, size_id, quantity, price_cents)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(order_id)
        .bind(item.product_id)
        .bind(item.size_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Append a ledger entry.
pub(crate) async fn insert_wallet_transaction(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    amount: Cents,
    kind: WalletTransactionKind,
    order_id: Option<OrderId>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO wallet_transactions (user_id, amount_cents, kind, order_id)
        VALUES ($1, $2, $3, $4)
        ",
    )
    .bind(user_id)
    .bind(amount)
    .bind(kind.as_str())
    .bind(order_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
