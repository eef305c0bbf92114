//! Database operations for the `coupons` table.

use chrono::{DateTime, Utc};
use dzbf_core::{Coupon, CouponError, CouponKind};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CouponRow {
    pub id: i64,
    pub code: String,
    pub kind: String,
    pub value: Decimal,
    pub min_subtotal: Decimal,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub starts_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl CouponRow {
    /// Convert into the domain coupon used for discount calculations.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::InvalidValue`] if the stored kind is unknown.
    pub fn to_coupon(&self) -> Result<Coupon, CouponError> {
        let kind = CouponKind::parse(&self.kind).ok_or_else(|| {
            CouponError::InvalidValue(format!("unknown coupon kind '{}'", self.kind))
        })?;
        Ok(Coupon {
            code: self.code.clone(),
            kind,
            value: self.value,
            min_subtotal: self.min_subtotal,
            max_uses: self.max_uses,
            used_count: self.used_count,
            starts_at: self.starts_at,
            expires_at: self.expires_at,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NewCoupon<'a> {
    pub code: &'a str,
    pub kind: CouponKind,
    pub value: Decimal,
    pub min_subtotal: Decimal,
    pub max_uses: Option<i32>,
    /// Defaults to now when `None`.
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

const COUPON_COLUMNS: &str = "id, code, kind, value, min_subtotal, max_uses, used_count, \
                              starts_at, expires_at, is_active, created_at";

/// All coupons, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_coupons(pool: &PgPool) -> Result<Vec<CouponRow>, DbError> {
    let rows = sqlx::query_as::<_, CouponRow>(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Look up a coupon by code, case-insensitively.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_coupon_by_code(pool: &PgPool, code: &str) -> Result<Option<CouponRow>, DbError> {
    let row = sqlx::query_as::<_, CouponRow>(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
    ))
    .bind(Coupon::normalize_code(code))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Validate and insert a coupon. The code is stored uppercase.
///
/// # Errors
///
/// Returns [`DbError::Coupon`] for an invalid definition, or
/// [`DbError::Sqlx`] on failure (including a duplicate code).
pub async fn create_coupon(pool: &PgPool, coupon: NewCoupon<'_>) -> Result<CouponRow, DbError> {
    let code = Coupon::normalize_code(coupon.code);
    Coupon::validate_definition(&code, coupon.kind, coupon.value, coupon.min_subtotal)?;

    let row = sqlx::query_as::<_, CouponRow>(&format!(
        "INSERT INTO coupons (code, kind, value, min_subtotal, max_uses, starts_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5, COALESCE($6, NOW()), $7) \
         RETURNING {COUPON_COLUMNS}"
    ))
    .bind(&code)
    .bind(coupon.kind.as_str())
    .bind(coupon.value)
    .bind(coupon.min_subtotal)
    .bind(coupon.max_uses)
    .bind(coupon.starts_at)
    .bind(coupon.expires_at)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no coupon has this code.
pub async fn deactivate_coupon(pool: &PgPool, code: &str) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE coupons SET is_active = false WHERE code = $1")
        .bind(Coupon::normalize_code(code))
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Lock a coupon for the remainder of the transaction.
pub(crate) async fn lock_coupon(
    conn: &mut PgConnection,
    code: &str,
) -> Result<Option<CouponRow>, DbError> {
    let row = sqlx::query_as::<_, CouponRow>(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1 FOR UPDATE"
    ))
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Count one redemption, refusing once `max_uses` is reached.
pub(crate) async fn redeem_coupon(conn: &mut PgConnection, code: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE coupons SET used_count = used_count + 1 \
         WHERE code = $1 AND (max_uses IS NULL OR used_count < max_uses)",
    )
    .bind(code)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(CouponError::Exhausted(code.to_string()).into());
    }
    Ok(())
}
