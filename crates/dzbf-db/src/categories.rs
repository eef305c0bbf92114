//! Database operations for the `categories` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `categories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Category list row with parent slug and active product count.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategorySummaryRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub parent_slug: Option<String>,
    pub sort_order: i32,
    pub product_count: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct NewCategory<'a> {
    pub name: &'a str,
    pub slug: &'a str,
    pub description: Option<&'a str>,
    pub image_url: Option<&'a str>,
    pub parent_id: Option<i64>,
    pub sort_order: i32,
}

#[allow(clippy::option_option)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryPatch<'a> {
    pub name: Option<&'a str>,
    pub description: Option<Option<&'a str>>,
    pub image_url: Option<Option<&'a str>>,
    pub parent_id: Option<Option<i64>>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

const CATEGORY_COLUMNS: &str = "id, name, slug, description, image_url, parent_id, sort_order, \
                                is_active, created_at, updated_at";

/// Returns active categories ordered for navigation menus.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_categories(pool: &PgPool) -> Result<Vec<CategorySummaryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategorySummaryRow>(
        "SELECT c.id, c.name, c.slug, c.image_url, parent.slug AS parent_slug, c.sort_order, \
                (SELECT COUNT(*) FROM products p \
                 WHERE p.category_id = c.id AND p.is_active) AS product_count \
         FROM categories c \
         LEFT JOIN categories parent ON parent.id = c.parent_id \
         WHERE c.is_active = true \
         ORDER BY c.sort_order, c.name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a category by slug, including deactivated ones.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_category_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<CategoryRow>, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns a single active category by slug, or `None`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_category_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<CategoryRow>, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1 AND is_active = true"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including unique slug violations).
pub async fn create_category(
    pool: &PgPool,
    category: NewCategory<'_>,
) -> Result<CategoryRow, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "INSERT INTO categories (name, slug, description, image_url, parent_id, sort_order) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {CATEGORY_COLUMNS}"
    ))
    .bind(category.name)
    .bind(category.slug)
    .bind(category.description)
    .bind(category.image_url)
    .bind(category.parent_id)
    .bind(category.sort_order)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the category does not exist, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn update_category(
    pool: &PgPool,
    category_id: i64,
    patch: CategoryPatch<'_>,
) -> Result<CategoryRow, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "UPDATE categories \
         SET name        = COALESCE($2, name), \
             description = CASE WHEN $3::BOOL THEN $4 ELSE description END, \
             image_url   = CASE WHEN $5::BOOL THEN $6 ELSE image_url END, \
             parent_id   = CASE WHEN $7::BOOL THEN $8::BIGINT ELSE parent_id END, \
             sort_order  = COALESCE($9, sort_order), \
             is_active   = COALESCE($10, is_active), \
             updated_at  = NOW() \
         WHERE id = $1 \
         RETURNING {CATEGORY_COLUMNS}"
    ))
    .bind(category_id)
    .bind(patch.name)
    .bind(patch.description.is_some())
    .bind(patch.description.flatten())
    .bind(patch.image_url.is_some())
    .bind(patch.image_url.flatten())
    .bind(patch.parent_id.is_some())
    .bind(patch.parent_id.flatten())
    .bind(patch.sort_order)
    .bind(patch.is_active)
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::NotFound)
}

/// Hides a category from listings. Products keep their `category_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn deactivate_category(pool: &PgPool, category_id: i64) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE categories SET is_active = false, updated_at = NOW() \
         WHERE id = $1 AND is_active = true",
    )
    .bind(category_id)
    .execute(pool)
    .await?;
    Ok(())
}
