//! Domain models for the storefront.
//!
//! These are validated domain objects, separate from the database row types
//! in [`crate::db`].

pub mod cart;
pub mod catalog;
pub mod contact;
pub mod order;
pub mod profile;
pub mod session;

pub use cart::CartLine;
pub use catalog::{
    Category, NewProduct, Product, ProductDetail, ProductFilter, ProductImage, ProductVariant,
    Size,
};
pub use contact::{ContactMessage, NewContactMessage};
pub use order::{CustomerDetails, Order, OrderItem};
pub use profile::Profile;
pub use session::{CurrentUser, keys as session_keys};
