//! Cart repository.
//!
//! One cart per customer, created on the first add-to-cart. Adding a
//! variant that is already in the cart increments its quantity in a single
//! upsert keyed by `(cart_id, product_variant_id)`. A line never holds
//! more than [`MAX_LINE_QUANTITY`] units.

use sqlx::{PgPool, Postgres, Transaction};

use denim_core::{CartId, CartItemId, Cents, ProductId, SizeId, UserId, VariantId};

use super::RepositoryError;
use crate::models::CartLine;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 99;

/// Bound a requested line quantity to `1..=MAX_LINE_QUANTITY`.
#[must_use]
pub fn line_quantity(requested: Option<i32>) -> i32 {
    requested.unwrap_or(1).clamp(1, MAX_LINE_QUANTITY)
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    item_id: CartItemId,
    variant_id: VariantId,
    product_id: ProductId,
    product_title: String,
    size_id: SizeId,
    size_label: String,
    unit_price_cents: Cents,
    quantity: i32,
    thumbnail_path: Option<String>,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        Self {
            item_id: row.item_id,
            variant_id: row.variant_id,
            product_id: row.product_id,
            product_title: row.product_title,
            size_id: row.size_id,
            size_label: row.size_label,
            unit_price: row.unit_price_cents,
            quantity: row.quantity,
            thumbnail_path: row.thumbnail_path,
        }
    }
}

const CART_LINES_SQL: &str = r"
    SELECT ci.id AS item_id, v.id AS variant_id, p.id AS product_id,
           p.title AS product_title, s.id AS size_id, s.label AS size_label,
           p.price_cents AS unit_price_cents, ci.quantity,
           (SELECT i.storage_path
              FROM product_images i
             WHERE i.product_id = p.id
             ORDER BY i.is_primary DESC, i.created_at ASC
             LIMIT 1) AS thumbnail_path
    FROM cart_items ci
    JOIN product_variants v ON v.id = ci.product_variant_id
    JOIN products p ON p.id = v.product_id
    JOIN sizes s ON s.id = v.size_id
    WHERE ci.cart_id = $1
    ORDER BY ci.created_at ASC
";

pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The customer's cart ID, creating the cart if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    pub async fn get_or_create(&self, user_id: UserId) -> Result<CartId, RepositoryError> {
        let id = sqlx::query_scalar::<_, CartId>(
            r"
            INSERT INTO carts (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = now()
            RETURNING id
            ",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    /// Add `quantity` of a variant, incrementing an existing line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the variant does not exist.
    /// Returns `RepositoryError::Database` for other failures.
    pub async fn add_item(
        &self,
        user_id: UserId,
        variant_id: VariantId,
        quantity: i32,
    ) -> Result<i32, RepositoryError> {
        let cart_id = self.get_or_create(user_id).await?;

        sqlx::query_scalar::<_, i32>(
            r"
            INSERT INTO cart_items (cart_id, product_variant_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_variant_id)
            DO UPDATE SET quantity = LEAST(cart_items.quantity::BIGINT + EXCLUDED.quantity, $4)::INT
            RETURNING quantity
            ",
        )
        .bind(cart_id)
        .bind(variant_id)
        .bind(quantity.clamp(1, MAX_LINE_QUANTITY))
        .bind(MAX_LINE_QUANTITY)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::Database(e)
        })
    }

    /// Lines in the customer's cart with current prices. Empty if no cart yet.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let Some(cart_id) = self.find(user_id).await? else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query_as::<_, CartLineRow>(CART_LINES_SQL)
            .bind(cart_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Total number of units in the cart, for the header badge.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn item_count(&self, user_id: UserId) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            r"
            SELECT COALESCE(SUM(ci.quantity), 0)::bigint
            FROM cart_items ci
            JOIN carts c ON c.id = ci.cart_id
            WHERE c.user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Set a line's quantity; zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in this customer's cart.
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        if quantity <= 0 {
            return self.remove_item(user_id, item_id).await;
        }
        let quantity = quantity.min(MAX_LINE_QUANTITY);
        let result = sqlx::query(
            r"
            UPDATE cart_items ci SET quantity = $3
            FROM carts c
            WHERE ci.cart_id = c.id AND c.user_id = $1 AND ci.id = $2
            ",
        )
        .bind(user_id)
        .bind(item_id)
        .bind(quantity)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove a line from the customer's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in this customer's cart.
    pub async fn remove_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM cart_items ci
            USING carts c
            WHERE ci.cart_id = c.id AND c.user_id = $1 AND ci.id = $2
            ",
        )
        .bind(user_id)
        .bind(item_id)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find(&self, user_id: UserId) -> Result<Option<CartId>, RepositoryError> {
        let id = sqlx::query_scalar::<_, CartId>("SELECT id FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(id)
    }
}

/// Lock the customer's cart and read its lines inside a checkout transaction.
///
/// Returns `None` when the customer has no cart.
pub(crate) async fn lock_lines(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
) -> Result<Option<(CartId, Vec<CartLine>)>, RepositoryError> {
    let Some(cart_id) =
        sqlx::query_scalar::<_, CartId>("SELECT id FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?
    else {
        return Ok(None);
    };

    let rows = sqlx::query_as::<_, CartLineRow>(CART_LINES_SQL)
        .bind(cart_id)
        .fetch_all(&mut **tx)
        .await?;

    Ok(Some((cart_id, rows.into_iter().map(Into::into).collect())))
}

/// Delete every line of a cart inside a transaction.
pub(crate) async fn clear(
    tx: &mut Transaction<'_, Postgres>,
    cart_id: CartId,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_quantity_is_bounded() {
        assert_eq!(line_quantity(None), 1);
        assert_eq!(line_quantity(Some(0)), 1);
        assert_eq!(line_quantity(Some(-4)), 1);
        assert_eq!(line_quantity(Some(3)), 3);
        assert_eq!(line_quantity(Some(MAX_LINE_QUANTITY)), MAX_LINE_QUANTITY);
        assert_eq!(line_quantity(Some(i32::MAX)), MAX_LINE_QUANTITY);
    }
}
