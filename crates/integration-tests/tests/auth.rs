//! Admin gate and password reset over HTTP.

#![allow(clippy::unwrap_used)]

use reqwest::{Client, Response, StatusCode, header::LOCATION};
use uuid::Uuid;

use denim_core::Email;
use denim_integration_tests::{PASSWORD, client, pool, register, storefront_base_url};
use denim_storefront::db::ProfileRepository;
use denim_storefront::services::AuthService;

fn location(resp: &Response) -> Option<&str> {
    resp.headers().get(LOCATION).and_then(|v| v.to_str().ok())
}

fn fresh_ip() -> String {
    let [a, b, c, ..] = Uuid::new_v4().into_bytes();
    format!("10.{a}.{b}.{c}")
}

async fn login(client: &Client, email: &str, password: &str) -> Response {
    client
        .post(format!("{}/login", storefront_base_url()))
        .header("x-forwarded-for", fresh_ip())
        .form(&[("email", email), ("password", password)])
        .send()
        .await
        .unwrap()
}

async fn submit_new_password(client: &Client, token: &str, password: &str) -> Response {
    client
        .post(format!("{}/reset/update", storefront_base_url()))
        .header("x-forwarded-for", fresh_ip())
        .form(&[
            ("token", token),
            ("password", password),
            ("password_confirm", password),
        ])
        .send()
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_admin_gate_redirects_by_role() {
    let base = storefront_base_url();

    let anonymous = client().get(format!("{base}/admin")).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&anonymous), Some("/login"));

    let customer = client();
    let email = register(&customer).await;
    let denied = customer.get(format!("{base}/admin")).send().await.unwrap();
    assert_eq!(denied.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&denied), Some("/"));

    let denied = customer
        .get(format!("{base}/admin/orders"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&denied), Some("/"));

    let pool = pool().await;
    let profiles = ProfileRepository::new(&pool);
    let profile = profiles
        .get_by_email(&Email::parse(&email).unwrap())
        .await
        .unwrap()
        .unwrap();
    profiles.set_admin(profile.id, true).await.unwrap();

    let allowed = customer.get(format!("{base}/admin")).send().await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_reset_request_does_not_reveal_accounts() {
    let base = storefront_base_url();
    let http = client();

    let unknown = http
        .post(format!("{base}/reset"))
        .header("x-forwarded-for", fresh_ip())
        .form(&[("email", "nobody-here@example.com")])
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::SEE_OTHER);
    let unknown_location = location(&unknown).unwrap().to_owned();
    assert!(unknown_location.starts_with("/reset?success="));

    let email = register(&client()).await;
    let known = http
        .post(format!("{base}/reset"))
        .header("x-forwarded-for", fresh_ip())
        .form(&[("email", email.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(location(&known), Some(unknown_location.as_str()));
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_reset_token_sets_password_once() {
    let pool = pool().await;
    let email = register(&client()).await;

    let issued = AuthService::new(&pool)
        .request_password_reset(&email)
        .await
        .unwrap()
        .expect("registered account gets a token");

    let http = client();
    let new_password = "new-indigo-password";
    let resp = submit_new_password(&http, &issued.token, new_password).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).unwrap().starts_with("/login?success="));

    let old = login(&client(), &email, PASSWORD).await;
    assert!(location(&old).unwrap().starts_with("/login?error="));
    let new = login(&client(), &email, new_password).await;
    assert_eq!(location(&new), Some("/dashboard"));

    let replay = submit_new_password(&http, &issued.token, "another-password").await;
    assert!(location(&replay).unwrap().starts_with("/reset?error="));
    let still_new = login(&client(), &email, new_password).await;
    assert_eq!(location(&still_new), Some("/dashboard"));
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_reset_with_mismatched_passwords_keeps_token() {
    let pool = pool().await;
    let email = register(&client()).await;
    let issued = AuthService::new(&pool)
        .request_password_reset(&email)
        .await
        .unwrap()
        .unwrap();

    let http = client();
    let resp = http
        .post(format!("{}/reset/update", storefront_base_url()))
        .header("x-forwarded-for", fresh_ip())
        .form(&[
            ("token", issued.token.as_str()),
            ("password", "first-choice"),
            ("password_confirm", "second-choice"),
        ])
        .send()
        .await
        .unwrap();
    let target = location(&resp).unwrap();
    assert!(target.starts_with("/reset/update?token="));
    assert!(target.contains("error="));

    let resp = submit_new_password(&http, &issued.token, "first-choice").await;
    assert!(location(&resp).unwrap().starts_with("/login?success="));
}
