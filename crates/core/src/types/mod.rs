//! Core types for Denim.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod realtime;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Cents, DEFAULT_CURRENCY_PREFIX, MoneyError, currency_prefix, set_currency_prefix};
pub use realtime::{ChangeKind, OrderChange, OrderItemRecord, OrderRecord};
pub use status::*;
