//! Persisted carts for signed-in users and anonymous sessions.
//!
//! Every write that depends on stock runs in a transaction that locks the
//! cart row first, so concurrent requests against one cart serialize.

use chrono::{DateTime, Utc};
use dzbf_core::{
    clamp_to_stock, merge_lines, validate_quantity, CartError, CartLine, StockAdjustment,
    MAX_LINE_QUANTITY,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::DbError;

/// Who a cart belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartOwner {
    User(i64),
    Session(Uuid),
}

impl CartOwner {
    #[must_use]
    pub fn user_id(self) -> Option<i64> {
        match self {
            CartOwner::User(id) => Some(id),
            CartOwner::Session(_) => None,
        }
    }

    #[must_use]
    pub fn session_id(self) -> Option<Uuid> {
        match self {
            CartOwner::User(_) => None,
            CartOwner::Session(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartRow {
    pub id: i64,
    pub public_id: Uuid,
    pub user_id: Option<i64>,
    pub session_id: Option<Uuid>,
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart item joined with live catalog data.
///
/// `unit_price` and `available_stock` come from the variant when the line has
/// one, otherwise from the product.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartLineRow {
    pub item_id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub product_name: String,
    pub product_slug: String,
    pub sku: String,
    pub variant_label: Option<String>,
    pub image_url: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub available_stock: i32,
    pub is_active: bool,
}

impl CartLineRow {
    /// `true` when the line could be checked out as-is.
    #[must_use]
    pub fn is_sellable(&self) -> bool {
        self.is_active && self.available_stock >= self.quantity
    }

    #[must_use]
    pub fn to_cart_line(&self) -> CartLine {
        CartLine {
            product_id: self.product_id,
            variant_id: self.variant_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
            available_stock: Some(if self.is_active {
                self.available_stock
            } else {
                0
            }),
        }
    }
}

/// A line pushed by a client, before prices and stock are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
}

/// Stock and price for one product/variant pair.
#[derive(Debug, sqlx::FromRow)]
struct Sellable {
    is_active: bool,
    has_variants: bool,
    unit_price: Decimal,
    available: i32,
}

const CART_COLUMNS: &str = "id, public_id, user_id, session_id, coupon_code, created_at, updated_at";

const LINE_SELECT: &str = "SELECT ci.id AS item_id, ci.product_id, ci.variant_id, \
            p.name AS product_name, p.slug AS product_slug, \
            COALESCE(v.sku, p.sku) AS sku, v.label AS variant_label, \
            p.image_urls[1] AS image_url, \
            COALESCE(v.price, p.price) AS unit_price, ci.quantity, \
            COALESCE(v.stock_quantity, p.stock_quantity) AS available_stock, \
            (p.is_active AND cat.is_active AND COALESCE(v.is_active, TRUE)) AS is_active \
     FROM cart_items ci \
     JOIN products p ON p.id = ci.product_id \
     JOIN categories cat ON cat.id = p.category_id \
     LEFT JOIN product_variants v ON v.id = ci.variant_id";

// ---------------------------------------------------------------------------
// Cart rows
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_cart(pool: &PgPool, owner: CartOwner) -> Result<Option<CartRow>, DbError> {
    let sql = match owner {
        CartOwner::User(_) => format!("SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1"),
        CartOwner::Session(_) => format!("SELECT {CART_COLUMNS} FROM carts WHERE session_id = $1"),
    };
    let query = sqlx::query_as::<_, CartRow>(&sql);
    let query = match owner {
        CartOwner::User(id) => query.bind(id),
        CartOwner::Session(id) => query.bind(id),
    };
    Ok(query.fetch_optional(pool).await?)
}

/// Returns the owner's cart, creating an empty one on first use.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn get_or_create_cart(pool: &PgPool, owner: CartOwner) -> Result<CartRow, DbError> {
    let mut conn = pool.acquire().await?;
    get_or_create_cart_in(&mut conn, owner).await
}

async fn get_or_create_cart_in(
    conn: &mut PgConnection,
    owner: CartOwner,
) -> Result<CartRow, DbError> {
    let row = match owner {
        CartOwner::User(user_id) => {
            sqlx::query_as::<_, CartRow>(&format!(
                "INSERT INTO carts (user_id) VALUES ($1) \
                 ON CONFLICT (user_id) DO UPDATE SET updated_at = NOW() \
                 RETURNING {CART_COLUMNS}"
            ))
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?
        }
        CartOwner::Session(session_id) => {
            sqlx::query_as::<_, CartRow>(&format!(
                "INSERT INTO carts (session_id) VALUES ($1) \
                 ON CONFLICT (session_id) DO UPDATE SET updated_at = NOW() \
                 RETURNING {CART_COLUMNS}"
            ))
            .bind(session_id)
            .fetch_one(&mut *conn)
            .await?
        }
    };
    Ok(row)
}

pub(crate) async fn lock_cart(conn: &mut PgConnection, cart_id: i64) -> Result<CartRow, DbError> {
    sqlx::query_as::<_, CartRow>(&format!(
        "SELECT {CART_COLUMNS} FROM carts WHERE id = $1 FOR UPDATE"
    ))
    .bind(cart_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(DbError::NotFound)
}

async fn touch_cart(conn: &mut PgConnection, cart_id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Lines
// ---------------------------------------------------------------------------

/// Lines of a cart in the order they were added.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_cart_lines(pool: &PgPool, cart_id: i64) -> Result<Vec<CartLineRow>, DbError> {
    let mut conn = pool.acquire().await?;
    fetch_lines(&mut conn, cart_id).await
}

pub(crate) async fn fetch_lines(
    conn: &mut PgConnection,
    cart_id: i64,
) -> Result<Vec<CartLineRow>, DbError> {
    let rows = sqlx::query_as::<_, CartLineRow>(&format!(
        "{LINE_SELECT} WHERE ci.cart_id = $1 ORDER BY ci.added_at, ci.id"
    ))
    .bind(cart_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

async fn load_sellable(
    conn: &mut PgConnection,
    product_id: i64,
    variant_id: Option<i64>,
) -> Result<Option<Sellable>, DbError> {
    let row = sqlx::query_as::<_, Sellable>(
        "SELECT (p.is_active AND cat.is_active \
                 AND ($2::BIGINT IS NULL OR COALESCE(v.is_active, FALSE))) AS is_active, \
                EXISTS ( \
                    SELECT 1 FROM product_variants pv \
                    WHERE pv.product_id = p.id AND pv.is_active \
                ) AS has_variants, \
                COALESCE(v.price, p.price) AS unit_price, \
                COALESCE(v.stock_quantity, p.stock_quantity) AS available \
         FROM products p \
         JOIN categories cat ON cat.id = p.category_id \
         LEFT JOIN product_variants v ON v.id = $2 AND v.product_id = p.id \
         WHERE p.id = $1",
    )
    .bind(product_id)
    .bind(variant_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Add `quantity` units to the cart, merging with an existing line for the
/// same product/variant.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown product, [`DbError::Cart`]
/// when the product cannot be sold in the resulting quantity, or
/// [`DbError::Sqlx`] on query failure.
pub async fn add_item(
    pool: &PgPool,
    cart_id: i64,
    product_id: i64,
    variant_id: Option<i64>,
    quantity: i32,
) -> Result<(), DbError> {
    if quantity < 1 {
        return Err(CartError::InvalidQuantity(quantity).into());
    }

    let mut tx = pool.begin().await?;
    lock_cart(&mut tx, cart_id).await?;

    let sellable = load_sellable(&mut tx, product_id, variant_id)
        .await?
        .ok_or(DbError::NotFound)?;
    if variant_id.is_none() && sellable.has_variants {
        return Err(CartError::VariantRequired { product_id }.into());
    }

    let existing: Option<(i64, i32)> = sqlx::query_as(
        "SELECT id, quantity FROM cart_items \
         WHERE cart_id = $1 AND product_id = $2 AND variant_id IS NOT DISTINCT FROM $3",
    )
    .bind(cart_id)
    .bind(product_id)
    .bind(variant_id)
    .fetch_optional(&mut *tx)
    .await?;

    let requested = existing.map_or(0, |(_, q)| q).saturating_add(quantity);
    validate_quantity(product_id, requested, sellable.available, sellable.is_active)?;

    match existing {
        Some((item_id, _)) => {
            sqlx::query("UPDATE cart_items SET quantity = $2, updated_at = NOW() WHERE id = $1")
                .bind(item_id)
                .bind(requested)
                .execute(&mut *tx)
                .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO cart_items (cart_id, product_id, variant_id, quantity) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(cart_id)
            .bind(product_id)
            .bind(variant_id)
            .bind(requested)
            .execute(&mut *tx)
            .await?;
        }
    }

    touch_cart(&mut tx, cart_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Set a line's quantity; zero removes the line.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the item is not in this cart,
/// [`DbError::Cart`] when the quantity cannot be sold, or [`DbError::Sqlx`].
pub async fn set_item_quantity(
    pool: &PgPool,
    cart_id: i64,
    item_id: i64,
    quantity: i32,
) -> Result<(), DbError> {
    if quantity < 0 {
        return Err(CartError::InvalidQuantity(quantity).into());
    }

    let mut tx = pool.begin().await?;
    lock_cart(&mut tx, cart_id).await?;

    let (product_id, variant_id): (i64, Option<i64>) = sqlx::query_as(
        "SELECT product_id, variant_id FROM cart_items WHERE id = $1 AND cart_id = $2",
    )
    .bind(item_id)
    .bind(cart_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    if quantity == 0 {
        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
    } else {
        let sellable = load_sellable(&mut tx, product_id, variant_id)
            .await?
            .ok_or(DbError::NotFound)?;
        validate_quantity(product_id, quantity, sellable.available, sellable.is_active)?;
        sqlx::query("UPDATE cart_items SET quantity = $2, updated_at = NOW() WHERE id = $1")
            .bind(item_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
    }

    touch_cart(&mut tx, cart_id).await?;
    tx.commit().await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the item is not in this cart.
pub async fn remove_item(pool: &PgPool, cart_id: i64, item_id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
        .bind(item_id)
        .bind(cart_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    let mut conn = pool.acquire().await?;
    touch_cart(&mut conn, cart_id).await
}

/// Remove every line and the applied coupon.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn clear_cart(pool: &PgPool, cart_id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    clear_cart_in(&mut tx, cart_id).await?;
    tx.commit().await?;
    Ok(())
}

pub(crate) async fn clear_cart_in(conn: &mut PgConnection, cart_id: i64) -> Result<(), DbError> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE carts SET coupon_code = NULL, updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Store (or with `None`, remove) the coupon code applied to a cart.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the cart does not exist.
pub async fn set_cart_coupon(
    pool: &PgPool,
    cart_id: i64,
    code: Option<&str>,
) -> Result<(), DbError> {
    let result =
        sqlx::query("UPDATE carts SET coupon_code = $2, updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .bind(code)
            .execute(pool)
            .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge client-side lines into a persisted cart.
///
/// Incoming lines are priced from the catalog, merged with the stored lines
/// by product/variant, and clamped to stock. Lines that cannot be sold at all
/// are reported with `granted == 0`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the cart does not exist, or
/// [`DbError::Sqlx`] if any statement fails (the merge is rolled back).
pub async fn merge_lines_into_cart(
    pool: &PgPool,
    cart_id: i64,
    incoming: &[LineRequest],
) -> Result<Vec<StockAdjustment>, DbError> {
    let mut tx = pool.begin().await?;
    lock_cart(&mut tx, cart_id).await?;
    let adjustments = merge_into(&mut tx, cart_id, incoming).await?;
    tx.commit().await?;
    Ok(adjustments)
}

/// Move an anonymous session cart into the user's cart and delete it.
///
/// The session's coupon carries over when the user cart has none. Returns
/// the stock adjustments made while merging; empty when the session had no
/// cart.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails (nothing is changed).
pub async fn merge_session_cart_into_user(
    pool: &PgPool,
    session_id: Uuid,
    user_id: i64,
) -> Result<Vec<StockAdjustment>, DbError> {
    let mut tx = pool.begin().await?;

    let Some(session_cart) = sqlx::query_as::<_, CartRow>(&format!(
        "SELECT {CART_COLUMNS} FROM carts WHERE session_id = $1 FOR UPDATE"
    ))
    .bind(session_id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Ok(Vec::new());
    };

    let user_cart = get_or_create_cart_in(&mut tx, CartOwner::User(user_id)).await?;
    lock_cart(&mut tx, user_cart.id).await?;

    let incoming: Vec<LineRequest> = fetch_lines(&mut tx, session_cart.id)
        .await?
        .iter()
        .map(|l| LineRequest {
            product_id: l.product_id,
            variant_id: l.variant_id,
            quantity: l.quantity,
        })
        .collect();
    let adjustments = merge_into(&mut tx, user_cart.id, &incoming).await?;

    if user_cart.coupon_code.is_none() && session_cart.coupon_code.is_some() {
        sqlx::query("UPDATE carts SET coupon_code = $2 WHERE id = $1")
            .bind(user_cart.id)
            .bind(&session_cart.coupon_code)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM carts WHERE id = $1")
        .bind(session_cart.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::debug!(
        %session_id,
        user_id,
        merged_lines = incoming.len(),
        adjusted = adjustments.len(),
        "merged session cart into user cart"
    );
    Ok(adjustments)
}

async fn merge_into(
    conn: &mut PgConnection,
    cart_id: i64,
    incoming: &[LineRequest],
) -> Result<Vec<StockAdjustment>, DbError> {
    let existing: Vec<CartLine> = fetch_lines(conn, cart_id)
        .await?
        .iter()
        .map(CartLineRow::to_cart_line)
        .collect();

    let mut adjustments = Vec::new();
    let mut resolved = Vec::with_capacity(incoming.len());
    for req in incoming {
        let sellable = load_sellable(conn, req.product_id, req.variant_id).await?;
        match sellable {
            Some(s) if s.is_active && !(req.variant_id.is_none() && s.has_variants) => {
                resolved.push(CartLine {
                    product_id: req.product_id,
                    variant_id: req.variant_id,
                    quantity: req.quantity,
                    unit_price: s.unit_price,
                    available_stock: Some(s.available),
                });
            }
            _ if req.quantity > 0 => adjustments.push(StockAdjustment {
                product_id: req.product_id,
                variant_id: req.variant_id,
                requested: req.quantity,
                granted: 0,
            }),
            _ => {}
        }
    }

    let (lines, clamped) = clamp_to_stock(merge_lines(&existing, &resolved));
    adjustments.extend(clamped);

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    for line in &lines {
        sqlx::query(
            "INSERT INTO cart_items (cart_id, product_id, variant_id, quantity) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(cart_id)
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(line.quantity)
        .execute(&mut *conn)
        .await?;
    }
    touch_cart(conn, cart_id).await?;

    Ok(adjustments)
}

// ---------------------------------------------------------------------------
// Housekeeping
// ---------------------------------------------------------------------------

/// Delete anonymous carts not touched since `idle_before`. Returns the count.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_stale_session_carts(
    pool: &PgPool,
    idle_before: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM carts WHERE session_id IS NOT NULL AND updated_at < $1",
    )
    .bind(idle_before)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// A stored cart line that can no longer be checked out as-is.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartAuditRow {
    pub cart_id: i64,
    pub item_id: i64,
    pub user_id: Option<i64>,
    pub session_id: Option<Uuid>,
    pub sku: String,
    pub quantity: i32,
    pub available_stock: i32,
    pub is_active: bool,
}

const AUDIT_SELECT: &str = "SELECT ci.cart_id, ci.id AS item_id, c.user_id, c.session_id, \
            COALESCE(v.sku, p.sku) AS sku, ci.quantity, \
            COALESCE(v.stock_quantity, p.stock_quantity) AS available_stock, \
            (p.is_active AND cat.is_active AND COALESCE(v.is_active, TRUE)) AS is_active \
     FROM cart_items ci \
     JOIN carts c ON c.id = ci.cart_id \
     JOIN products p ON p.id = ci.product_id \
     JOIN categories cat ON cat.id = p.category_id \
     LEFT JOIN product_variants v ON v.id = ci.variant_id \
     WHERE NOT (p.is_active AND cat.is_active AND COALESCE(v.is_active, TRUE)) \
        OR ci.quantity > COALESCE(v.stock_quantity, p.stock_quantity)";

/// Lines across all carts whose product is inactive or whose quantity exceeds
/// current stock.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_unsellable_cart_lines(pool: &PgPool) -> Result<Vec<CartAuditRow>, DbError> {
    let rows = sqlx::query_as::<_, CartAuditRow>(&format!(
        "{AUDIT_SELECT} ORDER BY ci.cart_id, ci.id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Clamp every unsellable line to its stock, deleting lines that drop to zero.
/// Returns the number of lines changed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails (nothing is changed).
pub async fn repair_unsellable_cart_lines(pool: &PgPool) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;
    let rows = sqlx::query_as::<_, CartAuditRow>(&format!(
        "{AUDIT_SELECT} ORDER BY ci.cart_id, ci.id FOR UPDATE OF ci"
    ))
    .fetch_all(&mut *tx)
    .await?;

    for row in &rows {
        let granted = if row.is_active {
            row.available_stock.clamp(0, MAX_LINE_QUANTITY)
        } else {
            0
        };
        if granted == 0 {
            sqlx::query("DELETE FROM cart_items WHERE id = $1")
                .bind(row.item_id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("UPDATE cart_items SET quantity = $2, updated_at = NOW() WHERE id = $1")
                .bind(row.item_id)
                .bind(granted)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(rows.len() as u64)
}
