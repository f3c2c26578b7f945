//! Order snapshot and change feed, consumed through `denim-order-sync`.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use denim_core::{Email, OrderStatus, UserId};
use denim_integration_tests::{
    client, create_customer, create_product, pool, register, session_client, session_cookie,
    storefront_base_url,
};
use denim_order_sync::{FeedSubscriber, SubscriberConfig, ViewScope};
use denim_storefront::db::{OrderRepository, ProfileRepository};
use denim_storefront::models::CustomerDetails;
use denim_storefront::services::CheckoutService;
use reqwest::StatusCode;
use secrecy::SecretString;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(10);

async fn place_order(pool: &PgPool, user_id: UserId) -> denim_core::OrderId {
    place_order_with_notes(pool, user_id, None).await
}

async fn place_order_with_notes(
    pool: &PgPool,
    user_id: UserId,
    notes: Option<String>,
) -> denim_core::OrderId {
    let product = create_product(pool, 45_000, "blue").await;
    let details = CustomerDetails {
        name: Some("Feed Test".to_string()),
        email: Some("feed@example.com".to_string()),
        address: Some("1 Sam Nujoma Dr".to_string()),
        city: Some("Swakopmund".to_string()),
        country: Some("Namibia".to_string()),
        notes,
        ..CustomerDetails::default()
    };
    CheckoutService::new(pool)
        .place_direct_order(user_id, product.id, 1, &details, Uuid::new_v4())
        .await
        .unwrap()
        .order_id
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_customer_feed_tracks_own_orders_only() {
    let pool = pool().await;
    let (http, jar) = session_client();
    let email = register(&http).await;
    let me = ProfileRepository::new(&pool)
        .get_by_email(&Email::parse(&email).unwrap())
        .await
        .unwrap()
        .unwrap();
    let stranger = create_customer(&pool).await;

    let subscriber = FeedSubscriber::new(SubscriberConfig {
        base_url: Url::parse(&storefront_base_url()).unwrap(),
        scope: ViewScope::Owner(me.id),
        session_cookie: session_cookie(&jar).map(SecretString::from),
    })
    .unwrap();
    let mut orders = subscriber.orders();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(subscriber.run(shutdown.clone()));

    let mine = place_order(&pool, me.id).await;
    let theirs = place_order(&pool, stranger.id).await;

    tokio::time::timeout(WAIT, orders.wait_for(|list| list.iter().any(|o| o.id == mine)))
        .await
        .expect("own order never arrived")
        .unwrap();

    OrderRepository::new(&pool)
        .update_status(mine, OrderStatus::Shipped)
        .await
        .unwrap();
    tokio::time::timeout(
        WAIT,
        orders.wait_for(|list| {
            list.iter()
                .any(|o| o.id == mine && o.status == OrderStatus::Shipped)
        }),
    )
    .await
    .expect("status change never arrived")
    .unwrap();

    let list = orders.borrow().clone();
    assert!(list.iter().all(|o| o.user_id == me.id));
    assert!(list.iter().all(|o| o.id != theirs));

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_order_with_long_notes_is_placed_and_published() {
    let pool = pool().await;
    let (http, jar) = session_client();
    let email = register(&http).await;
    let me = ProfileRepository::new(&pool)
        .get_by_email(&Email::parse(&email).unwrap())
        .await
        .unwrap()
        .unwrap();

    let subscriber = FeedSubscriber::new(SubscriberConfig {
        base_url: Url::parse(&storefront_base_url()).unwrap(),
        scope: ViewScope::Owner(me.id),
        session_cookie: session_cookie(&jar).map(SecretString::from),
    })
    .unwrap();
    let mut orders = subscriber.orders();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(subscriber.run(shutdown.clone()));

    // Larger than a NOTIFY payload may be.
    let notes = "n".repeat(10_000);
    let order_id = place_order_with_notes(&pool, me.id, Some(notes.clone())).await;

    let stored = OrderRepository::new(&pool).get(order_id).await.unwrap().unwrap();
    assert_eq!(stored.customer.notes.as_deref(), Some(notes.as_str()));

    tokio::time::timeout(
        WAIT,
        orders.wait_for(|list| list.iter().any(|o| o.id == order_id)),
    )
    .await
    .expect("order never arrived")
    .unwrap();

    let list = orders.borrow().clone();
    let published = list.iter().find(|o| o.id == order_id).unwrap();
    assert_eq!(published.notes.as_deref(), Some(notes.as_str()));
    assert_eq!(published.items.len(), 1);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_order_api_requires_session_and_admin_for_all() {
    let base = storefront_base_url();

    let anonymous = client()
        .get(format!("{base}/api/orders"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let customer = client();
    register(&customer).await;
    let mine = customer
        .get(format!("{base}/api/orders?scope=mine"))
        .send()
        .await
        .unwrap();
    assert_eq!(mine.status(), StatusCode::OK);
    let snapshot: serde_json::Value = mine.json().await.unwrap();
    assert_eq!(snapshot, serde_json::json!([]));

    let all = customer
        .get(format!("{base}/api/orders?scope=all"))
        .send()
        .await
        .unwrap();
    assert_eq!(all.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_other_customers_order_page_is_not_found() {
    let pool = pool().await;
    let stranger = create_customer(&pool).await;
    let order_id = place_order(&pool, stranger.id).await;

    let customer = client();
    register(&customer).await;
    let resp = customer
        .get(format!("{}/orders/{order_id}", storefront_base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
