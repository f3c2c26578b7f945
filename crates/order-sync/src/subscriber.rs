//! Reconnecting feed client.
//!
//! Each connection opens the SSE stream first and then fetches the
//! snapshot, so no change committed in between is lost: anything that
//! arrives while the snapshot is in flight is buffered by the view.
//! When the stream ends, fails, or asks for a resync the view is reset and
//! the client reconnects after an exponential backoff delay.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, COOKIE};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use denim_core::OrderRecord;
use denim_core::backoff::Backoff;

use crate::sse::{FeedMessage, SseParser};
use crate::view::{OrderView, ViewScope};

const SNAPSHOT_PATH: &str = "/api/orders";
const FEED_PATH: &str = "/api/orders/feed";
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid storefront URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Where to subscribe and as whom.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Storefront base URL, e.g. `https://shop.example.com`.
    pub base_url: Url,
    pub scope: ViewScope,
    /// Raw `Cookie` header carrying the signed-in session.
    pub session_cookie: Option<SecretString>,
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    Shutdown,
    Closed,
    Resync,
}

/// Keeps an [`OrderView`] in sync with the storefront and publishes the
/// current list on a watch channel.
pub struct FeedSubscriber {
    client: reqwest::Client,
    config: SubscriberConfig,
    orders: watch::Sender<Vec<OrderRecord>>,
}

impl FeedSubscriber {
    /// # Errors
    ///
    /// Returns `SyncError::Http` if the HTTP client cannot be built.
    pub fn new(config: SubscriberConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let (orders, _) = watch::channel(Vec::new());
        Ok(Self {
            client,
            config,
            orders,
        })
    }

    /// Receiver for the current order list. Updated after the snapshot
    /// loads and after every change that alters the list.
    #[must_use]
    pub fn orders(&self) -> watch::Receiver<Vec<OrderRecord>> {
        self.orders.subscribe()
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        let mut url = self.config.base_url.join(path)?;
        url.query_pairs_mut()
            .append_pair("scope", self.config.scope.query_value());
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.config.session_cookie {
            Some(cookie) => request.header(COOKIE, cookie.expose_secret()),
            None => request,
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut view = OrderView::new(self.config.scope);
        let mut backoff = Backoff::default();

        loop {
            match self.connect(&mut view, &shutdown).await {
                Ok(Disconnect::Shutdown) => return,
                Ok(Disconnect::Closed) => tracing::info!("Order feed closed by server"),
                Ok(Disconnect::Resync) => tracing::info!("Order feed requested resync"),
                Err(e) => tracing::warn!(error = %e, "Order feed connection failed"),
            }

            if view.is_loaded() {
                backoff.reset();
            }
            view.reset();

            let delay = backoff.next_delay();
            tracing::debug!(delay_ms = delay.as_millis(), "Reconnecting to order feed");
            tokio::select! {
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect(
        &self,
        view: &mut OrderView,
        shutdown: &CancellationToken,
    ) -> Result<Disconnect, SyncError> {
        let response = self
            .get(self.endpoint(FEED_PATH)?)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;
        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        tracing::info!(scope = view.scope().query_value(), "Order feed connected");

        let snapshot = self.fetch_snapshot();
        tokio::pin!(snapshot);
        let mut snapshot_pending = true;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(Disconnect::Shutdown),
                result = &mut snapshot, if snapshot_pending => {
                    snapshot_pending = false;
                    let replayed = view.load_snapshot(result?);
                    tracing::debug!(orders = view.len(), replayed, "Order snapshot loaded");
                    self.publish(view);
                }
                chunk = stream.next() => {
                    let Some(chunk) = chunk else {
                        return Ok(Disconnect::Closed);
                    };
                    let mut changed = false;
                    for frame in parser.push(&chunk?) {
                        match FeedMessage::decode(&frame) {
                            Ok(FeedMessage::Change(change)) => changed |= view.apply(change),
                            Ok(FeedMessage::Resync) => return Ok(Disconnect::Resync),
                            Ok(FeedMessage::Other(event)) => {
                                tracing::debug!(event = %event, "Ignoring unknown feed event");
                            }
                            Err(e) => tracing::warn!(error = %e, "Dropping malformed order change"),
                        }
                    }
                    if changed {
                        self.publish(view);
                    }
                }
            }
        }
    }

    async fn fetch_snapshot(&self) -> Result<Vec<OrderRecord>, SyncError> {
        let orders = self
            .get(self.endpoint(SNAPSHOT_PATH)?)
            .timeout(SNAPSHOT_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<OrderRecord>>()
            .await?;
        Ok(orders)
    }

    fn publish(&self, view: &OrderView) {
        self.orders.send_replace(view.orders());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use denim_core::UserId;

    use super::*;

    fn subscriber(base: &str, scope: ViewScope) -> FeedSubscriber {
        FeedSubscriber::new(SubscriberConfig {
            base_url: Url::parse(base).unwrap(),
            scope,
            session_cookie: Some(SecretString::from("id=abc".to_string())),
        })
        .unwrap()
    }

    #[test]
    fn test_endpoints_carry_scope() {
        let admin = subscriber("https://shop.example.com", ViewScope::All);
        assert_eq!(
            admin.endpoint(FEED_PATH).unwrap().as_str(),
            "https://shop.example.com/api/orders/feed?scope=all"
        );

        let customer = subscriber(
            "https://shop.example.com/",
            ViewScope::Owner(UserId::generate()),
        );
        assert_eq!(
            customer.endpoint(SNAPSHOT_PATH).unwrap().as_str(),
            "https://shop.example.com/api/orders?scope=mine"
        );
    }

    #[test]
    fn test_starts_with_empty_list() {
        let subscriber = subscriber("http://127.0.0.1:3000", ViewScope::All);
        assert!(subscriber.orders().borrow().is_empty());
    }

    #[tokio::test]
    async fn test_run_returns_once_cancelled() {
        // Nothing listens on port 9, so every attempt fails and backs off.
        let subscriber = subscriber("http://127.0.0.1:9", ViewScope::All);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(subscriber.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
