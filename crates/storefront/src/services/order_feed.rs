//! Live order change feed.
//!
//! A trigger on `orders` publishes the operation, id and owner of every
//! insert, update and delete on the `order_changes` channel. One background
//! task listens on that channel, re-reads inserted and updated rows, and
//! fans the changes out to in-process subscribers over a broadcast channel.
//!
//! Subscribers that fall behind, and all subscribers after the listener
//! reconnects, receive [`FeedEvent::Resync`] and should reload their
//! snapshot.

use std::sync::Arc;

use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use denim_core::backoff::Backoff;
use denim_core::{ChangeKind, OrderChange, OrderId, UserId};

use crate::db::{OrderRepository, RepositoryError};

/// `pg_notify` channel written by the `orders_change_feed` trigger.
pub const CHANNEL: &str = "order_changes";

const BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid notification payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

/// Event delivered to a subscriber.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Change(Arc<OrderChange>),
    /// Events may have been missed; reload the snapshot.
    Resync,
}

/// Which changes a subscriber may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedScope {
    /// Every order (administrators).
    All,
    /// Only orders owned by this user.
    Owner(UserId),
}

impl FeedScope {
    #[must_use]
    pub fn admits(self, change: &OrderChange) -> bool {
        match self {
            Self::All => true,
            Self::Owner(user_id) => change.owner() == user_id,
        }
    }
}

#[derive(Deserialize)]
struct Payload {
    op: String,
    id: OrderId,
    user_id: UserId,
}

/// A decoded trigger notification. Carries no row data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub kind: ChangeKind,
    pub id: OrderId,
    pub user_id: UserId,
}

impl Notification {
    /// Turn the notification into a publishable change, reading the current
    /// row for inserts and updates. `None` when that row is already gone;
    /// its delete notification follows.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the row cannot be read.
    pub async fn resolve(self, pool: &PgPool) -> Result<Option<OrderChange>, RepositoryError> {
        let Self { kind, id, user_id } = self;
        if kind == ChangeKind::Delete {
            return Ok(Some(OrderChange::Delete { id, user_id }));
        }
        let Some(order) = OrderRepository::new(pool).record(id).await? else {
            return Ok(None);
        };
        Ok(Some(match kind {
            ChangeKind::Insert => OrderChange::Insert { order },
            _ => OrderChange::Update { order },
        }))
    }
}

/// Decode a trigger payload `{"op": "INSERT"|"UPDATE"|"DELETE", "id": .., "user_id": ..}`.
///
/// # Errors
///
/// Returns `FeedError` if the payload is not valid JSON or the operation is
/// unknown.
pub fn parse_notification(payload: &str) -> Result<Notification, FeedError> {
    let Payload { op, id, user_id } = serde_json::from_str(payload)?;
    let kind = match op.as_str() {
        "INSERT" => ChangeKind::Insert,
        "UPDATE" => ChangeKind::Update,
        "DELETE" => ChangeKind::Delete,
        _ => return Err(FeedError::UnknownOperation(op)),
    };
    Ok(Notification { kind, id, user_id })
}

/// Fan-out point for order changes.
#[derive(Clone)]
pub struct OrderFeed {
    sender: broadcast::Sender<FeedEvent>,
}

impl Default for OrderFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderFeed {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUFFER);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self, scope: FeedScope) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            scope,
        }
    }

    pub fn publish(&self, event: FeedEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Listen for notifications until `shutdown` fires, reconnecting with
    /// backoff when the connection drops.
    pub async fn run(self, pool: PgPool, shutdown: CancellationToken) {
        let mut backoff = Backoff::default();
        let mut connected_before = false;

        loop {
            match PgListener::connect_with(&pool).await {
                Ok(mut listener) => match listener.listen(CHANNEL).await {
                    Ok(()) => {
                        tracing::info!(channel = CHANNEL, "Order change listener connected");
                        backoff.reset();
                        if connected_before {
                            self.publish(FeedEvent::Resync);
                        }
                        connected_before = true;

                        if self.pump(&pool, &mut listener, &shutdown).await {
                            return;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to LISTEN on order channel"),
                },
                Err(e) => tracing::warn!(error = %e, "Failed to connect order change listener"),
            }

            let delay = backoff.next_delay();
            tracing::info!(delay_ms = delay.as_millis(), "Reconnecting order change listener");
            tokio::select! {
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn forward(&self, pool: &PgPool, notification: Notification) {
        match notification.resolve(pool).await {
            Ok(Some(change)) => {
                tracing::debug!(
                    order_id = %change.order_id(),
                    kind = change.kind().as_str(),
                    "Order change"
                );
                self.publish(FeedEvent::Change(Arc::new(change)));
            }
            Ok(None) => {
                tracing::debug!(order_id = %notification.id, "Changed order already deleted");
            }
            Err(e) => {
                // Subscribers cannot tell what they missed.
                tracing::warn!(error = %e, order_id = %notification.id, "Failed to read changed order");
                self.publish(FeedEvent::Resync);
            }
        }
    }

    /// Forward notifications until the connection fails. Returns `true` on
    /// shutdown.
    async fn pump(
        &self,
        pool: &PgPool,
        listener: &mut PgListener,
        shutdown: &CancellationToken,
    ) -> bool {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return true,
                notification = listener.recv() => match notification {
                    Ok(notification) => match parse_notification(notification.payload()) {
                        Ok(notification) => self.forward(pool, notification).await,
                        Err(e) => tracing::warn!(error = %e, "Dropping malformed order notification"),
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Order change listener disconnected");
                        return false;
                    }
                }
            }
        }
    }
}

/// One subscriber's view of the feed.
pub struct Subscription {
    receiver: broadcast::Receiver<FeedEvent>,
    scope: FeedScope,
}

impl Subscription {
    /// Next event visible to this subscriber. `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(FeedEvent::Change(change)) => {
                    if self.scope.admits(&change) {
                        return Some(FeedEvent::Change(change));
                    }
                }
                Ok(FeedEvent::Resync) => return Some(FeedEvent::Resync),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Order feed subscriber lagged");
                    return Some(FeedEvent::Resync);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
