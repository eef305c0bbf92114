//! Database operations for the `brands` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `brands` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BrandRow {
    pub id: i64,
    pub public_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Brand list row with the number of active products carried.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BrandSummaryRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub logo_url: Option<String>,
    pub product_count: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct NewBrand<'a> {
    pub name: &'a str,
    pub slug: &'a str,
    pub description: Option<&'a str>,
    pub logo_url: Option<&'a str>,
    pub website_url: Option<&'a str>,
}

/// Sparse update. For nullable columns, `None` keeps the current value,
/// `Some(None)` clears it.
#[allow(clippy::option_option)]
#[derive(Debug, Clone, Copy, Default)]
pub struct BrandPatch<'a> {
    pub name: Option<&'a str>,
    pub description: Option<Option<&'a str>>,
    pub logo_url: Option<Option<&'a str>>,
    pub website_url: Option<Option<&'a str>>,
    pub is_active: Option<bool>,
}

const BRAND_COLUMNS: &str = "id, public_id, name, slug, description, logo_url, website_url, \
                             is_active, created_at, updated_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns all active brands with their active product counts, ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_brands(pool: &PgPool) -> Result<Vec<BrandSummaryRow>, DbError> {
    let rows = sqlx::query_as::<_, BrandSummaryRow>(
        "SELECT b.id, b.name, b.slug, b.logo_url, \
                COUNT(p.id) FILTER (WHERE p.is_active) AS product_count \
         FROM brands b \
         LEFT JOIN products p ON p.brand_id = b.id \
         WHERE b.is_active = true \
         GROUP BY b.id \
         ORDER BY b.name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Like [`get_brand_by_slug`] but also returns deactivated brands.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_brand_by_slug(pool: &PgPool, slug: &str) -> Result<Option<BrandRow>, DbError> {
    let row = sqlx::query_as::<_, BrandRow>(&format!(
        "SELECT {BRAND_COLUMNS} FROM brands WHERE slug = $1"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns a single active brand by slug, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_brand_by_slug(pool: &PgPool, slug: &str) -> Result<Option<BrandRow>, DbError> {
    let row = sqlx::query_as::<_, BrandRow>(&format!(
        "SELECT {BRAND_COLUMNS} FROM brands WHERE slug = $1 AND is_active = true"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Creates a new brand row and returns it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails (including unique slug violations).
pub async fn create_brand(pool: &PgPool, brand: NewBrand<'_>) -> Result<BrandRow, DbError> {
    let row = sqlx::query_as::<_, BrandRow>(&format!(
        "INSERT INTO brands (name, slug, description, logo_url, website_url) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {BRAND_COLUMNS}"
    ))
    .bind(brand.name)
    .bind(brand.slug)
    .bind(brand.description)
    .bind(brand.logo_url)
    .bind(brand.website_url)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Applies a sparse update to a brand in a single `UPDATE … RETURNING`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the brand does not exist, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn update_brand(
    pool: &PgPool,
    brand_id: i64,
    patch: BrandPatch<'_>,
) -> Result<BrandRow, DbError> {
    let row = sqlx::query_as::<_, BrandRow>(&format!(
        "UPDATE brands \
         SET name        = COALESCE($2, name), \
             description = CASE WHEN $3::BOOL THEN $4 ELSE description END, \
             logo_url    = CASE WHEN $5::BOOL THEN $6 ELSE logo_url END, \
             website_url = CASE WHEN $7::BOOL THEN $8 ELSE website_url END, \
             is_active   = COALESCE($9, is_active), \
             updated_at  = NOW() \
         WHERE id = $1 \
         RETURNING {BRAND_COLUMNS}"
    ))
    .bind(brand_id)
    .bind(patch.name)
    .bind(patch.description.is_some())
    .bind(patch.description.flatten())
    .bind(patch.logo_url.is_some())
    .bind(patch.logo_url.flatten())
    .bind(patch.website_url.is_some())
    .bind(patch.website_url.flatten())
    .bind(patch.is_active)
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::NotFound)
}

/// Soft-deletes a brand. Its products stay listed without a brand filter match.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn deactivate_brand(pool: &PgPool, brand_id: i64) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE brands \
         SET is_active = false, updated_at = NOW() \
         WHERE id = $1 AND is_active = true",
    )
    .bind(brand_id)
    .execute(pool)
    .await?;
    Ok(())
}
