//! Checkout and order lifecycle.

use chrono::{DateTime, Utc};
use dzbf_core::{
    compute_totals, generate_order_number, CartError, CheckoutDetails, CouponError, OrderError,
    OrderStatus, ShippingPolicy,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::carts::{clear_cart_in, fetch_lines, lock_cart, CartLineRow};
use crate::coupons::{lock_coupon, redeem_coupon};
use crate::DbError;

/// Attempts at drawing an unused order number before giving up.
const ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub public_id: Uuid,
    pub order_number: String,
    pub user_id: Option<i64>,
    pub status: String,
    pub customer_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub wilaya: i16,
    pub city: String,
    pub address_line: String,
    pub notes: Option<String>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidStatus`] if the stored status is unknown.
    pub fn status(&self) -> Result<OrderStatus, OrderError> {
        OrderStatus::parse(&self.status)
    }
}

/// Line snapshot taken at checkout. Product and variant ids become `NULL` if
/// the catalog row is later deleted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderItemRow {
    pub id: i64,
    pub order_id: i64,
    pub product_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub product_name: String,
    pub variant_label: Option<String>,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderListFilters {
    /// Restrict to one customer; `None` lists every order.
    pub user_id: Option<i64>,
    pub status: Option<OrderStatus>,
    pub limit: i64,
    pub offset: i64,
}

const ORDER_COLUMNS: &str = "id, public_id, order_number, user_id, status, customer_name, phone, \
                             email, wilaya, city, address_line, notes, subtotal, discount, \
                             shipping_fee, total, coupon_code, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, variant_id, product_name, variant_label, \
                            sku, unit_price, quantity, line_total";

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

/// Turn a cart into an order.
///
/// In one transaction: locks the cart, re-reads its lines at current prices,
/// decrements stock only where enough remains, validates and redeems the
/// applied coupon, snapshots every line into `order_items`, and empties the
/// cart. Any failure rolls everything back.
///
/// # Errors
///
/// - [`DbError::Order`] for invalid details or an empty cart
/// - [`DbError::Cart`] when a line is inactive or short on stock
/// - [`DbError::Coupon`] when the applied coupon no longer applies
/// - [`DbError::Sqlx`] on query failure
pub async fn create_order_from_cart(
    pool: &PgPool,
    cart_id: i64,
    user_id: Option<i64>,
    details: CheckoutDetails,
    policy: &ShippingPolicy,
    now: DateTime<Utc>,
) -> Result<(OrderRow, Vec<OrderItemRow>), DbError> {
    let details = details.normalized()?;

    let mut tx = pool.begin().await?;
    let cart = lock_cart(&mut tx, cart_id).await?;

    let rows = fetch_lines(&mut tx, cart_id).await?;
    if rows.is_empty() {
        return Err(OrderError::EmptyCart.into());
    }

    for row in &rows {
        reserve_stock(&mut tx, row).await?;
    }

    let lines: Vec<_> = rows.iter().map(CartLineRow::to_cart_line).collect();
    let coupon = match cart.coupon_code.as_deref() {
        Some(code) => {
            let coupon = lock_coupon(&mut tx, code)
                .await?
                .ok_or_else(|| CouponError::Unknown(code.to_string()))?
                .to_coupon()?;
            let subtotal = compute_totals(&lines, None, policy, now).subtotal;
            coupon.check(subtotal, now)?;
            redeem_coupon(&mut tx, code).await?;
            Some(coupon)
        }
        None => None,
    };
    let totals = compute_totals(&lines, coupon.as_ref(), policy, now);

    let order = insert_order(
        &mut tx,
        user_id,
        &details,
        &totals,
        cart.coupon_code.as_deref(),
        now,
    )
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in &rows {
        let item = sqlx::query_as::<_, OrderItemRow>(&format!(
            "INSERT INTO order_items \
                 (order_id, product_id, variant_id, product_name, variant_label, sku, \
                  unit_price, quantity, line_total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(order.id)
        .bind(row.product_id)
        .bind(row.variant_id)
        .bind(&row.product_name)
        .bind(&row.variant_label)
        .bind(&row.sku)
        .bind(row.unit_price)
        .bind(row.quantity)
        .bind(row.to_cart_line().line_total())
        .fetch_one(&mut *tx)
        .await?;
        items.push(item);
    }

    clear_cart_in(&mut tx, cart_id).await?;
    tx.commit().await?;

    tracing::info!(
        order_number = %order.order_number,
        user_id = ?user_id,
        lines = items.len(),
        total = %order.total,
        "order placed"
    );
    Ok((order, items))
}

/// Decrement stock for one line, failing if it would go negative.
async fn reserve_stock(conn: &mut PgConnection, row: &CartLineRow) -> Result<(), DbError> {
    if !row.is_active {
        return Err(CartError::ProductUnavailable(row.product_id).into());
    }

    let result = match row.variant_id {
        Some(variant_id) => {
            sqlx::query(
                "UPDATE product_variants \
                 SET stock_quantity = stock_quantity - $2, updated_at = NOW() \
                 WHERE id = $1 AND is_active AND stock_quantity >= $2",
            )
            .bind(variant_id)
            .bind(row.quantity)
            .execute(&mut *conn)
            .await?
        }
        None => {
            sqlx::query(
                "UPDATE products \
                 SET stock_quantity = stock_quantity - $2, updated_at = NOW() \
                 WHERE id = $1 AND is_active AND stock_quantity >= $2",
            )
            .bind(row.product_id)
            .bind(row.quantity)
            .execute(&mut *conn)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(CartError::InsufficientStock {
            product_id: row.product_id,
            requested: row.quantity,
            available: row.available_stock,
        }
        .into());
    }
    Ok(())
}

async fn insert_order(
    conn: &mut PgConnection,
    user_id: Option<i64>,
    details: &CheckoutDetails,
    totals: &dzbf_core::CartTotals,
    coupon_code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<OrderRow, DbError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let order_number = generate_order_number(now);
        let inserted = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders \
                 (order_number, user_id, customer_name, phone, email, wilaya, city, \
                  address_line, notes, subtotal, discount, shipping_fee, total, coupon_code) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (order_number) DO NOTHING \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&order_number)
        .bind(user_id)
        .bind(&details.customer_name)
        .bind(&details.phone)
        .bind(&details.email)
        .bind(details.wilaya)
        .bind(&details.city)
        .bind(&details.address_line)
        .bind(&details.notes)
        .bind(totals.subtotal)
        .bind(totals.discount)
        .bind(totals.shipping_fee)
        .bind(totals.total)
        .bind(coupon_code)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(order) = inserted {
            return Ok(order);
        }
        tracing::warn!(%order_number, "order number collision, retrying");
    }

    Err(OrderError::Validation("could not allocate a unique order number".to_string()).into())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Orders newest first, optionally restricted to one user and/or status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_orders(
    pool: &PgPool,
    filters: &OrderListFilters,
) -> Result<Vec<OrderRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE ($1::BIGINT IS NULL OR user_id = $1) \
           AND ($2::TEXT IS NULL OR status = $2) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $3 OFFSET $4"
    ))
    .bind(filters.user_id)
    .bind(filters.status.map(OrderStatus::as_str))
    .bind(filters.limit)
    .bind(filters.offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_order_by_number(
    pool: &PgPool,
    order_number: &str,
) -> Result<Option<OrderRow>, DbError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
    ))
    .bind(order_number)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_order_items(pool: &PgPool, order_id: i64) -> Result<Vec<OrderItemRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Move an order to `next`, enforcing the status lifecycle.
///
/// Cancelling returns every line's quantity to stock.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown order,
/// [`DbError::Order`] for an illegal transition, or [`DbError::Sqlx`].
pub async fn update_order_status(
    pool: &PgPool,
    order_number: &str,
    next: OrderStatus,
) -> Result<OrderRow, DbError> {
    let mut tx = pool.begin().await?;

    let order = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1 FOR UPDATE"
    ))
    .bind(order_number)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    let current = order.status()?;
    current.transition(next)?;

    if next == OrderStatus::Cancelled {
        restock(&mut tx, order.id).await?;
    }

    let updated = sqlx::query_as::<_, OrderRow>(&format!(
        "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(order.id)
    .bind(next.as_str())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        order_number,
        from = current.as_str(),
        to = next.as_str(),
        "order status changed"
    );
    Ok(updated)
}

async fn restock(conn: &mut PgConnection, order_id: i64) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE product_variants v \
         SET stock_quantity = v.stock_quantity + oi.quantity, updated_at = NOW() \
         FROM order_items oi \
         WHERE oi.order_id = $1 AND oi.variant_id = v.id",
    )
    .bind(order_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE products p \
         SET stock_quantity = p.stock_quantity + oi.quantity, updated_at = NOW() \
         FROM order_items oi \
         WHERE oi.order_id = $1 AND oi.variant_id IS NULL AND oi.product_id = p.id",
    )
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
