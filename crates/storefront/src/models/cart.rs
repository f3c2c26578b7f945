//! Cart line as shown on the cart and checkout pages.

use denim_core::{CartItemId, Cents, ProductId, SizeId, VariantId};

#[derive(Debug, Clone)]
pub struct CartLine {
    pub item_id: CartItemId,
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub product_title: String,
    pub size_id: SizeId,
    pub size_label: String,
    /// Current product price, read at the time the cart is loaded.
    pub unit_price: Cents,
    pub quantity: i32,
    pub thumbnail_path: Option<String>,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Cents {
        self.unit_price.times(self.quantity)
    }
}
