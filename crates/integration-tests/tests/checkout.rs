//! Wallet checkout, direct orders and cart upserts against the database.
//!
//! Run with: `cargo test -p denim-integration-tests -- --ignored`

#![allow(clippy::unwrap_used)]

use denim_core::{Cents, OrderStatus, UserId};
use denim_integration_tests::{create_customer, create_product, create_variant, pool};
use denim_storefront::db::{CartRepository, MAX_LINE_QUANTITY, OrderRepository, ProfileRepository};
use denim_storefront::models::CustomerDetails;
use denim_storefront::services::{CheckoutError, CheckoutService};
use sqlx::PgPool;
use uuid::Uuid;

async fn purchase_ledger(pool: &PgPool, user_id: UserId) -> Vec<(i64, Option<Uuid>)> {
    sqlx::query_as::<_, (i64, Option<Uuid>)>(
        "SELECT amount_cents, order_id FROM wallet_transactions WHERE user_id = $1 AND kind = 'purchase'",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .expect("Failed to read wallet ledger")
}

async fn wallet(pool: &PgPool, user_id: UserId) -> Cents {
    ProfileRepository::new(pool)
        .get(user_id)
        .await
        .expect("Failed to load profile")
        .expect("profile exists")
        .wallet
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_add_to_cart_twice_sums_quantity() {
    let pool = pool().await;
    let customer = create_customer(&pool).await;
    let product = create_product(&pool, 45_000, "indigo").await;
    let (_, variant) = create_variant(&pool, product.id).await;

    let carts = CartRepository::new(&pool);
    assert_eq!(carts.add_item(customer.id, variant, 2).await.unwrap(), 2);
    assert_eq!(carts.add_item(customer.id, variant, 3).await.unwrap(), 5);

    let lines = carts.lines(customer.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 5);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_cart_line_quantity_saturates() {
    let pool = pool().await;
    let customer = create_customer(&pool).await;
    let product = create_product(&pool, 45_000, "indigo").await;
    let (_, variant) = create_variant(&pool, product.id).await;

    let carts = CartRepository::new(&pool);
    carts.add_item(customer.id, variant, 2).await.unwrap();
    let total = carts.add_item(customer.id, variant, i32::MAX).await.unwrap();
    assert_eq!(total, MAX_LINE_QUANTITY);
    let total = carts.add_item(customer.id, variant, i32::MAX).await.unwrap();
    assert_eq!(total, MAX_LINE_QUANTITY);

    let lines = carts.lines(customer.id).await.unwrap();
    carts
        .set_quantity(customer.id, lines[0].item_id, i32::MAX)
        .await
        .unwrap();
    let lines = carts.lines(customer.id).await.unwrap();
    assert_eq!(lines[0].quantity, MAX_LINE_QUANTITY);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_insufficient_balance_changes_nothing() {
    let pool = pool().await;
    let customer = create_customer(&pool).await;
    let product = create_product(&pool, 60_000, "black").await;
    let (_, variant) = create_variant(&pool, product.id).await;

    ProfileRepository::new(&pool)
        .set_wallet(customer.id, Cents::new(59_999))
        .await
        .unwrap();
    CartRepository::new(&pool)
        .add_item(customer.id, variant, 1)
        .await
        .unwrap();

    let result = CheckoutService::new(&pool)
        .pay_with_wallet(customer.id, Uuid::new_v4())
        .await;
    assert!(matches!(
        result,
        Err(CheckoutError::InsufficientBalance { balance, total })
            if balance.get() == 59_999 && total.get() == 60_000
    ));

    assert_eq!(wallet(&pool, customer.id).await.get(), 59_999);
    assert!(purchase_ledger(&pool, customer.id).await.is_empty());
    assert!(
        OrderRepository::new(&pool)
            .list_for_user(customer.id)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        CartRepository::new(&pool).lines(customer.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_wallet_checkout_debits_and_clears_cart() {
    let pool = pool().await;
    let customer = create_customer(&pool).await;
    let jeans = create_product(&pool, 45_000, "blue").await;
    let jacket = create_product(&pool, 80_000, "blue").await;
    let (_, jeans_variant) = create_variant(&pool, jeans.id).await;
    let (_, jacket_variant) = create_variant(&pool, jacket.id).await;

    ProfileRepository::new(&pool)
        .set_wallet(customer.id, Cents::new(200_000))
        .await
        .unwrap();
    let carts = CartRepository::new(&pool);
    carts.add_item(customer.id, jeans_variant, 2).await.unwrap();
    carts.add_item(customer.id, jacket_variant, 1).await.unwrap();

    let receipt = CheckoutService::new(&pool)
        .pay_with_wallet(customer.id, Uuid::new_v4())
        .await
        .unwrap();
    assert!(!receipt.replayed);

    let total = 2 * 45_000 + 80_000;
    assert_eq!(wallet(&pool, customer.id).await.get(), 200_000 - total);
    assert_eq!(
        purchase_ledger(&pool, customer.id).await,
        [(-total, Some(receipt.order_id.as_uuid()))]
    );
    assert!(carts.lines(customer.id).await.unwrap().is_empty());

    let orders = OrderRepository::new(&pool);
    let order = orders.get(receipt.order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total.get(), total);
    let items = orders.items(receipt.order_id).await.unwrap();
    let item_sum: i64 = items
        .iter()
        .map(|item| item.price.get() * i64::from(item.quantity))
        .sum();
    assert_eq!(item_sum, total);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_repeated_idempotency_key_returns_first_order() {
    let pool = pool().await;
    let customer = create_customer(&pool).await;
    let product = create_product(&pool, 10_000, "grey").await;
    let (_, variant) = create_variant(&pool, product.id).await;

    ProfileRepository::new(&pool)
        .set_wallet(customer.id, Cents::new(50_000))
        .await
        .unwrap();
    let carts = CartRepository::new(&pool);
    carts.add_item(customer.id, variant, 1).await.unwrap();

    let key = Uuid::new_v4();
    let checkout = CheckoutService::new(&pool);
    let first = checkout.pay_with_wallet(customer.id, key).await.unwrap();

    // A double-submitted form arrives after the cart was refilled.
    carts.add_item(customer.id, variant, 1).await.unwrap();
    let second = checkout.pay_with_wallet(customer.id, key).await.unwrap();

    assert_eq!(second.order_id, first.order_id);
    assert!(second.replayed);
    assert_eq!(wallet(&pool, customer.id).await.get(), 40_000);
    assert_eq!(
        OrderRepository::new(&pool)
            .list_for_user(customer.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_concurrent_checkouts_debit_once() {
    let pool = pool().await;
    let customer = create_customer(&pool).await;
    let product = create_product(&pool, 30_000, "blue").await;
    let (_, variant) = create_variant(&pool, product.id).await;

    ProfileRepository::new(&pool)
        .set_wallet(customer.id, Cents::new(30_000))
        .await
        .unwrap();
    CartRepository::new(&pool)
        .add_item(customer.id, variant, 1)
        .await
        .unwrap();

    let checkout = CheckoutService::new(&pool);
    let (a, b) = tokio::join!(
        checkout.pay_with_wallet(customer.id, Uuid::new_v4()),
        checkout.pay_with_wallet(customer.id, Uuid::new_v4()),
    );
    assert_eq!(u8::from(a.is_ok()) + u8::from(b.is_ok()), 1);
    assert_eq!(wallet(&pool, customer.id).await.get(), 0);
    assert_eq!(purchase_ledger(&pool, customer.id).await.len(), 1);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_direct_order_is_pending_and_keeps_cart() {
    let pool = pool().await;
    let customer = create_customer(&pool).await;
    let product = create_product(&pool, 45_000, "blue").await;
    let (_, variant) = create_variant(&pool, product.id).await;
    CartRepository::new(&pool)
        .add_item(customer.id, variant, 1)
        .await
        .unwrap();

    let details = CustomerDetails {
        name: Some("Selma Nghipondoka".to_string()),
        email: Some("selma@example.com".to_string()),
        address: Some("12 Independence Ave".to_string()),
        city: Some("Windhoek".to_string()),
        country: Some("Namibia".to_string()),
        ..CustomerDetails::default()
    };
    let receipt = CheckoutService::new(&pool)
        .place_direct_order(customer.id, product.id, 2, &details, Uuid::new_v4())
        .await
        .unwrap();

    let orders = OrderRepository::new(&pool);
    let order = orders.get(receipt.order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total.get(), 90_000);
    assert_eq!(order.customer.city.as_deref(), Some("Windhoek"));
    assert_eq!(orders.items(receipt.order_id).await.unwrap().len(), 1);

    assert_eq!(wallet(&pool, customer.id).await.get(), 0);
    assert_eq!(
        CartRepository::new(&pool).lines(customer.id).await.unwrap().len(),
        1
    );
}
