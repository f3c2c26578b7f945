//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Registration, password login and password reset
//! - `catalog` - Product deletion and purge across database and storage
//! - `checkout` - Wallet checkout, direct orders and card payment recording
//! - `email` - Transactional mail (password reset links)
//! - `order_feed` - Live order changes fanned out to subscribers
//! - `payments` - Hosted card checkout and webhook verification
//! - `storage` - Object storage for product images and covers
//! - `uploads` - Validated image uploads with cleanup on failure

pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod email;
pub mod order_feed;
pub mod payments;
pub mod storage;
pub mod uploads;

pub use auth::{AuthError, AuthService};
pub use catalog::{CatalogMaintenance, PurgeError};
pub use checkout::{CheckoutError, CheckoutService};
pub use email::{EmailError, Mailer};
pub use order_feed::{FeedEvent, FeedScope, OrderFeed};
pub use payments::{PaymentError, StripeClient};
pub use storage::{HttpObjectStorage, ObjectStorage, StorageError};
pub use uploads::{UploadError, UploadService};
