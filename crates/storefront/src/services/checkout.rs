//! Cart and order mutations: wallet checkout, direct orders, card payments.
//!
//! Each operation runs as one database transaction. Totals are always
//! recomputed from the rows read inside that transaction; nothing the
//! client submits besides the idempotency key and form fields is trusted.
//!
//! Wallet checkout:
//! 1. Lock the customer's cart row (serialises concurrent checkouts).
//! 2. Return the existing order if this idempotency key was already used.
//! 3. Re-read cart lines and wallet balance, then [`plan_cart`] and
//!    [`ensure_affordable`].
//! 4. Conditionally debit the wallet, insert the `paid` order, its items
//!    (unit price snapshot) and the negative ledger entry, clear the cart.
//! 5. Commit. Any error before this point rolls everything back.

use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use denim_core::{Cents, OrderId, OrderStatus, ProductId, SizeId, UserId, WalletTransactionKind};

use crate::db::orders::{self, NewOrder, NewOrderItem};
use crate::db::{RepositoryError, carts};
use crate::models::{CartLine, CustomerDetails};
use crate::services::payments::PurchaseSource;

/// Shipping is free for now.
pub const SHIPPING: Cents = Cents::ZERO;

/// Default country on the direct order form.
pub const DEFAULT_COUNTRY: &str = "Namibia";

/// Longest accepted order note, in characters.
pub const NOTES_MAX_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("insufficient wallet balance: have {balance}, need {total}")]
    InsufficientBalance { balance: Cents, total: Cents },

    #[error("missing required order fields")]
    MissingFields,

    #[error("order notes longer than {NOTES_MAX_CHARS} characters")]
    NotesTooLong,

    #[error("product not found")]
    ProductNotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl CheckoutError {
    /// Message safe to show on the checkout or order page.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyCart => "Your cart is empty",
            Self::InsufficientBalance { .. } => "Insufficient wallet balance",
            Self::MissingFields => "Please fill in all required fields",
            Self::NotesTooLong => "Order notes are too long",
            Self::ProductNotFound => "Product not found",
            Self::Repository(_) => "We could not place your order, please try again",
        }
    }
}

/// One priced order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedLine {
    pub product_id: ProductId,
    pub size_id: Option<SizeId>,
    pub quantity: i32,
    pub unit_price: Cents,
}

impl PlannedLine {
    #[must_use]
    pub fn line_total(&self) -> Cents {
        self.unit_price.times(self.quantity)
    }
}

/// Priced order ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    pub lines: Vec<PlannedLine>,
    pub subtotal: Cents,
    pub shipping: Cents,
    pub total: Cents,
}

impl CheckoutPlan {
    fn from_lines(lines: Vec<PlannedLine>) -> Self {
        let subtotal: Cents = lines.iter().map(PlannedLine::line_total).sum();
        Self {
            lines,
            subtotal,
            shipping: SHIPPING,
            total: subtotal + SHIPPING,
        }
    }

    fn items(&self) -> Vec<NewOrderItem> {
        self.lines
            .iter()
            .map(|line| NewOrderItem {
                product_id: line.product_id,
                size_id: line.size_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect()
    }
}

/// Price the cart at current product prices.
///
/// # Errors
///
/// Returns `CheckoutError::EmptyCart` when there are no lines.
pub fn plan_cart(lines: &[CartLine]) -> Result<CheckoutPlan, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    Ok(CheckoutPlan::from_lines(
        lines
            .iter()
            .map(|line| PlannedLine {
                product_id: line.product_id,
                size_id: Some(line.size_id),
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect(),
    ))
}

/// Price a single-product order. Quantities below one are raised to one.
#[must_use]
pub fn plan_single(product_id: ProductId, unit_price: Cents, quantity: i32) -> CheckoutPlan {
    CheckoutPlan::from_lines(vec![PlannedLine {
        product_id,
        size_id: None,
        quantity: quantity.max(1),
        unit_price,
    }])
}

/// Order lines for a paid card session. Cart sessions take the cart lines
/// read inside the recording transaction, product sessions the product and
/// price the session was created with. An unreadable source records no
/// lines.
#[must_use]
pub fn plan_card_order(
    source: Option<&PurchaseSource>,
    cart: Option<&[CartLine]>,
) -> Vec<NewOrderItem> {
    match source {
        Some(PurchaseSource::Cart) => cart
            .and_then(|lines| plan_cart(lines).ok())
            .map(|plan| plan.items())
            .unwrap_or_default(),
        Some(&PurchaseSource::Product {
            product_id,
            quantity,
            unit_amount,
        }) => plan_single(product_id, unit_amount, quantity).items(),
        None => Vec::new(),
    }
}

/// # Errors
///
/// Returns `CheckoutError::InsufficientBalance` when `balance < plan.total`.
pub const fn ensure_affordable(plan: &CheckoutPlan, balance: Cents) -> Result<(), CheckoutError> {
    if balance.get() < plan.total.get() {
        return Err(CheckoutError::InsufficientBalance {
            balance,
            total: plan.total,
        });
    }
    Ok(())
}

/// Raw direct-order form fields.
#[derive(Debug, Default, Clone)]
pub struct DirectOrderForm {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_postal_code: String,
    pub shipping_country: String,
    pub notes: String,
}

impl DirectOrderForm {
    /// Trim fields and check that name, email, address and city are present.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::MissingFields` if a required field is blank,
    /// `CheckoutError::NotesTooLong` past [`NOTES_MAX_CHARS`].
    pub fn validate(&self) -> Result<CustomerDetails, CheckoutError> {
        fn optional(value: &str) -> Option<String> {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }

        let name = optional(&self.customer_name);
        let email = optional(&self.customer_email);
        let address = optional(&self.shipping_address);
        let city = optional(&self.shipping_city);
        if name.is_none() || email.is_none() || address.is_none() || city.is_none() {
            return Err(CheckoutError::MissingFields);
        }
        let notes = optional(&self.notes);
        if notes.as_ref().is_some_and(|n| n.chars().count() > NOTES_MAX_CHARS) {
            return Err(CheckoutError::NotesTooLong);
        }

        Ok(CustomerDetails {
            name,
            email,
            phone: optional(&self.customer_phone),
            address,
            city,
            postal_code: optional(&self.shipping_postal_code),
            country: optional(&self.shipping_country)
                .or_else(|| Some(DEFAULT_COUNTRY.to_owned())),
            notes,
        })
    }
}

/// Outcome of a checkout call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub order_id: OrderId,
    /// `true` when the idempotency key matched an earlier order.
    pub replayed: bool,
}

pub struct CheckoutService<'a> {
    pool: &'a PgPool,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Pay for the whole cart from the wallet.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` or `CheckoutError::InsufficientBalance`
    /// with no changes made, or `CheckoutError::Repository` if the
    /// transaction fails (also with no changes made).
    #[tracing::instrument(skip(self), fields(order_id))]
    pub async fn pay_with_wallet(
        &self,
        user_id: UserId,
        idempotency_key: Uuid,
    ) -> Result<Receipt, CheckoutError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let Some((cart_id, lines)) = carts::lock_lines(&mut tx, user_id).await? else {
            return Err(CheckoutError::EmptyCart);
        };

        if let Some(order_id) = orders::find_by_idempotency_key(&mut tx, user_id, idempotency_key).await? {
            tracing::info!(%order_id, "Checkout replayed with existing idempotency key");
            return Ok(Receipt {
                order_id,
                replayed: true,
            });
        }

        let plan = plan_cart(&lines)?;
        let balance = orders::wallet_balance(&mut tx, user_id).await?;
        ensure_affordable(&plan, balance)?;

        if !orders::debit_wallet(&mut tx, user_id, plan.total).await? {
            return Err(CheckoutError::InsufficientBalance {
                balance,
                total: plan.total,
            });
        }

        let customer = CustomerDetails::default();
        let order_id = orders::insert_order(
            &mut tx,
            &NewOrder {
                user_id,
                status: OrderStatus::Paid,
                subtotal: plan.subtotal,
                shipping: plan.shipping,
                total: plan.total,
                customer: &customer,
                idempotency_key: Some(idempotency_key),
                payment_session_id: None,
            },
        )
        .await?;
        orders::insert_items(&mut tx, order_id, &plan.items()).await?;
        orders::insert_wallet_transaction(
            &mut tx,
            user_id,
            -plan.total,
            WalletTransactionKind::Purchase,
            Some(order_id),
        )
        .await?;
        carts::clear(&mut tx, cart_id).await?;

        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::Span::current().record("order_id", tracing::field::display(order_id));
        tracing::info!(%order_id, total = %plan.total, "Wallet checkout completed");
        Ok(Receipt {
            order_id,
            replayed: false,
        })
    }

    /// Place a `pending` order for a single product. The cart is not touched.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ProductNotFound` if the product is missing or
    /// inactive, `CheckoutError::Repository` if the transaction fails.
    #[tracing::instrument(skip(self, customer))]
    pub async fn place_direct_order(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
        customer: &CustomerDetails,
        idempotency_key: Uuid,
    ) -> Result<Receipt, CheckoutError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        if let Some(order_id) = orders::find_by_idempotency_key(&mut tx, user_id, idempotency_key).await? {
            return Ok(Receipt {
                order_id,
                replayed: true,
            });
        }

        let price = sqlx::query_scalar::<_, Cents>(
            "SELECT price_cents FROM products WHERE id = $1 AND is_active",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(RepositoryError::from)?
        .ok_or(CheckoutError::ProductNotFound)?;

        let plan = plan_single(product_id, price, quantity);
        let order_id = orders::insert_order(
            &mut tx,
            &NewOrder {
                user_id,
                status: OrderStatus::Pending,
                subtotal: plan.subtotal,
                shipping: plan.shipping,
                total: plan.total,
                customer,
                idempotency_key: Some(idempotency_key),
                payment_session_id: None,
            },
        )
        .await;

        let order_id = match order_id {
            Ok(id) => id,
            // A concurrent submission with the same key won the insert.
            Err(RepositoryError::Database(sqlx::Error::Database(db_err)))
                if db_err.is_unique_violation() =>
            {
                drop(tx);
                return self.existing_order(user_id, idempotency_key).await;
            }
            Err(e) => return Err(e.into()),
        };
        orders::insert_items(&mut tx, order_id, &plan.items()).await?;

        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(%order_id, total = %plan.total, "Direct order placed");
        Ok(Receipt {
            order_id,
            replayed: false,
        })
    }

    /// Record a completed card checkout as a `paid` order for
    /// `amount_total`. Items come from `source` (see [`plan_card_order`]).
    ///
    /// Returns `None` if the session was already recorded.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Repository` if the transaction fails.
    #[tracing::instrument(skip(self))]
    pub async fn record_card_payment(
        &self,
        user_id: UserId,
        session_id: &str,
        amount_total: Cents,
        source: Option<PurchaseSource>,
    ) -> Result<Option<OrderId>, CheckoutError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let cart = match source {
            Some(PurchaseSource::Cart) => carts::lock_lines(&mut tx, user_id).await?,
            _ => None,
        };
        if orders::find_by_payment_session(&mut tx, session_id).await?.is_some() {
            tracing::info!(session_id, "Card payment already recorded");
            return Ok(None);
        }

        let lines = cart.as_ref().map(|(_, lines)| lines.as_slice());
        let items = plan_card_order(source.as_ref(), lines);

        let customer = CustomerDetails::default();
        let order_id = orders::insert_order(
            &mut tx,
            &NewOrder {
                user_id,
                status: OrderStatus::Paid,
                subtotal: amount_total,
                shipping: SHIPPING,
                total: amount_total,
                customer: &customer,
                idempotency_key: None,
                payment_session_id: Some(session_id),
            },
        )
        .await?;
        orders::insert_items(&mut tx, order_id, &items).await?;
        if let Some((cart_id, _)) = cart {
            carts::clear(&mut tx, cart_id).await?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(%order_id, total = %amount_total, "Card payment recorded");
        Ok(Some(order_id))
    }

    async fn existing_order(
        &self,
        user_id: UserId,
        idempotency_key: Uuid,
    ) -> Result<Receipt, CheckoutError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let order_id = orders::find_by_idempotency_key(&mut tx, user_id, idempotency_key)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(Receipt {
            order_id,
            replayed: true,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use denim_core::{CartItemId, VariantId};

    fn line(unit_price: i64, quantity: i32) -> CartLine {
        CartLine {
            item_id: CartItemId::generate(),
            variant_id: VariantId::generate(),
            product_id: ProductId::generate(),
            product_title: "Straight Leg".to_owned(),
            size_id: SizeId::generate(),
            size_label: "32".to_owned(),
            unit_price: Cents::new(unit_price),
            quantity,
            thumbnail_path: None,
        }
    }

    #[test]
    fn test_plan_sums_lines_with_free_shipping() {
        let plan = plan_cart(&[line(45_000, 2), line(12_550, 1)]).unwrap();
        assert_eq!(plan.subtotal, Cents::new(102_550));
        assert_eq!(plan.shipping, Cents::ZERO);
        assert_eq!(plan.total, plan.subtotal);
        let items_total: Cents = plan.lines.iter().map(PlannedLine::line_total).sum();
        assert_eq!(items_total, plan.total);
    }

    #[test]
    fn test_plan_copies_unit_prices() {
        let cart = [line(9_999, 3)];
        let plan = plan_cart(&cart).unwrap();
        let items = plan.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price, Cents::new(9_999));
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].size_id, Some(cart[0].size_id));
    }

    #[test]
    fn test_empty_cart_rejected() {
        assert!(matches!(plan_cart(&[]), Err(CheckoutError::EmptyCart)));
    }

    #[test]
    fn test_balance_checks() {
        let plan = plan_cart(&[line(5_000, 2)]).unwrap();
        assert!(ensure_affordable(&plan, Cents::new(10_000)).is_ok());
        assert!(ensure_affordable(&plan, Cents::new(25_000)).is_ok());

        let err = ensure_affordable(&plan, Cents::new(9_999)).unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientBalance { balance, total }
                if balance == Cents::new(9_999) && total == Cents::new(10_000)
        ));
        assert_eq!(err.user_message(), "Insufficient wallet balance");
    }

    #[test]
    fn test_single_product_plan_clamps_quantity() {
        let product = ProductId::generate();
        let plan = plan_single(product, Cents::new(30_000), 0);
        assert_eq!(plan.lines[0].quantity, 1);
        assert_eq!(plan.total, Cents::new(30_000));
        assert_eq!(plan.lines[0].size_id, None);

        let plan = plan_single(product, Cents::new(30_000), 3);
        assert_eq!(plan.total, Cents::new(90_000));
    }

    #[test]
    fn test_card_order_from_cart_session() {
        let cart = [line(45_000, 2), line(12_550, 1)];
        let items = plan_card_order(Some(&PurchaseSource::Cart), Some(cart.as_slice()));
        assert_eq!(items.len(), 2);
        let total: Cents = items.iter().map(|i| i.unit_price.times(i.quantity)).sum();
        assert_eq!(total, Cents::new(102_550));

        assert!(plan_card_order(Some(&PurchaseSource::Cart), None).is_empty());
    }

    #[test]
    fn test_card_order_from_product_session_ignores_cart() {
        let product_id = ProductId::generate();
        let source = PurchaseSource::Product {
            product_id,
            quantity: 3,
            unit_amount: Cents::new(30_000),
        };
        let cart = [line(45_000, 2)];
        let items = plan_card_order(Some(&source), Some(cart.as_slice()));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, product_id);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].unit_price.times(3), Cents::new(90_000));
        assert_eq!(items[0].size_id, None);

        assert!(plan_card_order(None, Some(cart.as_slice())).is_empty());
    }

    #[test]
    fn test_direct_order_form_requires_fields() {
        let form = DirectOrderForm {
            customer_name: "Selma".to_owned(),
            customer_email: "selma@shop.na".to_owned(),
            shipping_address: "12 Independence Ave".to_owned(),
            shipping_city: "  ".to_owned(),
            ..DirectOrderForm::default()
        };
        let err = form.validate().unwrap_err();
        assert_eq!(err.user_message(), "Please fill in all required fields");
    }

    #[test]
    fn test_direct_order_form_caps_notes() {
        let mut form = DirectOrderForm {
            customer_name: "Selma".to_owned(),
            customer_email: "selma@shop.na".to_owned(),
            shipping_address: "12 Independence Ave".to_owned(),
            shipping_city: "Windhoek".to_owned(),
            notes: "x".repeat(8_500),
            ..DirectOrderForm::default()
        };
        let err = form.validate().unwrap_err();
        assert!(matches!(err, CheckoutError::NotesTooLong));
        assert_eq!(err.user_message(), "Order notes are too long");

        form.notes = "ü".repeat(NOTES_MAX_CHARS);
        let details = form.validate().unwrap();
        assert_eq!(details.notes.map(|n| n.chars().count()), Some(NOTES_MAX_CHARS));
    }

    #[test]
    fn test_direct_order_form_defaults_country() {
        let form = DirectOrderForm {
            customer_name: " Selma ".to_owned(),
            customer_email: "selma@shop.na".to_owned(),
            shipping_address: "12 Independence Ave".to_owned(),
            shipping_city: "Windhoek".to_owned(),
            ..DirectOrderForm::default()
        };
        let details = form.validate().unwrap();
        assert_eq!(details.name.as_deref(), Some("Selma"));
        assert_eq!(details.country.as_deref(), Some("Namibia"));
        assert_eq!(details.phone, None);
        assert_eq!(details.notes, None);
    }
}
