//! Denim order sync - a live order list fed by the storefront change feed.
//!
//! The storefront exposes an order snapshot (`GET /api/orders`) and a
//! Server-Sent Events stream (`GET /api/orders/feed`). This crate keeps an
//! in-memory copy of the subscriber's orders current:
//!
//! - [`view`] - [`OrderView`], the reducer that merges changes into a snapshot
//! - [`sse`] - incremental `text/event-stream` parser
//! - [`subscriber`] - [`FeedSubscriber`], the reconnecting client loop

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod sse;
pub mod subscriber;
pub mod view;

pub use sse::{FeedMessage, SseFrame, SseParser};
pub use subscriber::{FeedSubscriber, SubscriberConfig, SyncError};
pub use view::{OrderView, ViewScope};
