//! Denim Core - Shared domain types.
//!
//! This crate provides the types shared by every Denim component:
//! - `storefront` - Shop, checkout, account dashboard and admin back office
//! - `order-sync` - Client-side order realtime sync
//! - `cli` - Command-line tools for migrations and operations
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no
//! database access, no HTTP clients. Database encoding is available behind the `postgres`
//! feature.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, money, emails, statuses and realtime wire types
//! - [`backoff`] - Reconnect delay shared by the feed listener and subscriber

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backoff;
pub mod types;

pub use types::*;
