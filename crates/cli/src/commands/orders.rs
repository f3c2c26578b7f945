//! Follow the live order feed from a terminal.
//!
//! Signs in with a session cookie copied from a browser and logs the order
//! list every time it changes. Useful for checking the change feed after a
//! deploy.

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use url::Url;

use denim_core::UserId;
use denim_order_sync::{FeedSubscriber, SubscriberConfig, ViewScope};

/// Watch orders until Ctrl+C.
///
/// `user_id` scopes the view to one customer; without it every order is
/// shown, which requires an admin session.
///
/// # Errors
///
/// Returns an error if the URL or user id is invalid, or the session
/// cookie is missing.
pub async fn watch(base_url: &str, user_id: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let base_url = Url::parse(base_url)?;
    let scope = match user_id {
        Some(id) => ViewScope::Owner(id.parse::<UserId>()?),
        None => ViewScope::All,
    };
    let session_cookie = std::env::var("DENIM_SESSION_COOKIE")
        .map(SecretString::from)
        .map_err(|_| "DENIM_SESSION_COOKIE not set")?;

    let subscriber = FeedSubscriber::new(SubscriberConfig {
        base_url,
        scope,
        session_cookie: Some(session_cookie),
    })?;
    let mut orders = subscriber.orders();

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(subscriber.run(shutdown.clone()));

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            changed = orders.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = orders.borrow_and_update().clone();
                tracing::info!(count = current.len(), "Orders updated");
                for order in &current {
                    tracing::info!(
                        "  {} {:<9} {} {}",
                        order.id,
                        order.status.as_str(),
                        order.total_cents,
                        order.customer_name.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
    }

    shutdown.cancel();
    task.await?;
    Ok(())
}
