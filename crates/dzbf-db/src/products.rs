//! Database operations for `products` and `product_variants`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Product card row for catalog listings.
///
/// `available_stock` is the product's own stock, or the sum over its active
/// variants when it has any. `total_count` is the filtered row count before
/// `LIMIT`/`OFFSET`, repeated on every row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductListRow {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub available_stock: i64,
    pub image_urls: Vec<String>,
    pub is_featured: bool,
    pub category_slug: String,
    pub category_name: String,
    pub brand_slug: Option<String>,
    pub brand_name: Option<String>,
    pub variant_count: i64,
    pub created_at: DateTime<Utc>,
    pub total_count: i64,
}

/// Full product row with category and brand context.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductDetailRow {
    pub id: i64,
    pub public_id: Uuid,
    pub sku: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub image_urls: Vec<String>,
    pub is_featured: bool,
    pub is_active: bool,
    pub category_id: i64,
    pub category_slug: String,
    pub category_name: String,
    pub brand_id: Option<i64>,
    pub brand_slug: Option<String>,
    pub brand_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `product_variants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VariantRow {
    pub id: i64,
    pub product_id: i64,
    pub sku: String,
    pub label: String,
    /// Overrides the product price when set.
    pub price: Option<Decimal>,
    pub stock_quantity: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "newest" => Some(ProductSort::Newest),
            "price_asc" => Some(ProductSort::PriceAsc),
            "price_desc" => Some(ProductSort::PriceDesc),
            "name" => Some(ProductSort::Name),
            _ => None,
        }
    }

    fn order_clause(self) -> &'static str {
        match self {
            ProductSort::Newest => "p.created_at DESC, p.id DESC",
            ProductSort::PriceAsc => "p.price ASC, p.id",
            ProductSort::PriceDesc => "p.price DESC, p.id",
            ProductSort::Name => "p.name ASC, p.id",
        }
    }
}

/// Input filters for product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductListFilters<'a> {
    /// Matches the category itself or any direct child category.
    pub category_slug: Option<&'a str>,
    pub brand_slug: Option<&'a str>,
    /// Case-insensitive substring match on name or SKU.
    pub search: Option<&'a str>,
    pub featured: Option<bool>,
    pub in_stock: Option<bool>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: ProductSort,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct NewProduct<'a> {
    pub sku: &'a str,
    pub name: &'a str,
    pub slug: &'a str,
    pub description: Option<&'a str>,
    pub category_id: i64,
    pub brand_id: Option<i64>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub image_urls: &'a [String],
    pub is_featured: bool,
}

#[allow(clippy::option_option)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductPatch<'a> {
    pub name: Option<&'a str>,
    pub description: Option<Option<&'a str>>,
    pub category_id: Option<i64>,
    pub brand_id: Option<Option<i64>>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Option<Decimal>>,
    pub stock_quantity: Option<i32>,
    pub image_urls: Option<&'a [String]>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewVariant<'a> {
    pub product_id: i64,
    pub sku: &'a str,
    pub label: &'a str,
    pub price: Option<Decimal>,
    pub stock_quantity: i32,
}

const DETAIL_SELECT: &str = "SELECT p.id, p.public_id, p.sku, p.name, p.slug, p.description, \
            p.price, p.compare_at_price, p.stock_quantity, p.image_urls, p.is_featured, \
            p.is_active, p.category_id, c.slug AS category_slug, c.name AS category_name, \
            p.brand_id, b.slug AS brand_slug, b.name AS brand_name, p.created_at, p.updated_at \
     FROM products p \
     JOIN categories c ON c.id = p.category_id \
     LEFT JOIN brands b ON b.id = p.brand_id AND b.is_active";

const VARIANT_COLUMNS: &str = "id, product_id, sku, label, price, stock_quantity, is_active";

// ---------------------------------------------------------------------------
// Catalog reads
// ---------------------------------------------------------------------------

/// Returns one page of active products matching `filters`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    filters: &ProductListFilters<'_>,
) -> Result<Vec<ProductListRow>, DbError> {
    let sql = format!(
        "SELECT p.id, p.sku, p.name, p.slug, p.price, p.compare_at_price, \
                CASE WHEN va.variant_count > 0 THEN va.variant_stock \
                     ELSE p.stock_quantity::BIGINT END AS available_stock, \
                p.image_urls, p.is_featured, \
                c.slug AS category_slug, c.name AS category_name, \
                b.slug AS brand_slug, b.name AS brand_name, \
                va.variant_count, p.created_at, \
                COUNT(*) OVER () AS total_count \
         FROM products p \
         JOIN categories c ON c.id = p.category_id \
         LEFT JOIN categories parent ON parent.id = c.parent_id \
         LEFT JOIN brands b ON b.id = p.brand_id AND b.is_active \
         LEFT JOIN LATERAL ( \
             SELECT COUNT(*) AS variant_count, \
                    COALESCE(SUM(v.stock_quantity), 0)::BIGINT AS variant_stock \
             FROM product_variants v \
             WHERE v.product_id = p.id AND v.is_active \
         ) va ON true \
         WHERE p.is_active AND c.is_active \
           AND ($1::TEXT IS NULL OR c.slug = $1 OR parent.slug = $1) \
           AND ($2::TEXT IS NULL OR b.slug = $2) \
           AND ($3::TEXT IS NULL OR p.name ILIKE '%' || $3 || '%' OR p.sku ILIKE '%' || $3 || '%') \
           AND ($4::BOOL IS NULL OR p.is_featured = $4) \
           AND ($5::BOOL IS NULL OR \
                (CASE WHEN va.variant_count > 0 THEN va.variant_stock \
                      ELSE p.stock_quantity::BIGINT END > 0) = $5) \
           AND ($6::NUMERIC IS NULL OR p.price >= $6) \
           AND ($7::NUMERIC IS NULL OR p.price <= $7) \
         ORDER BY {} \
         LIMIT $8 OFFSET $9",
        filters.sort.order_clause()
    );

    let rows = sqlx::query_as::<_, ProductListRow>(&sql)
        .bind(filters.category_slug)
        .bind(filters.brand_slug)
        .bind(filters.search)
        .bind(filters.featured)
        .bind(filters.in_stock)
        .bind(filters.min_price)
        .bind(filters.max_price)
        .bind(filters.limit)
        .bind(filters.offset)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Returns an active product in an active category by slug, or `None`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<ProductDetailRow>, DbError> {
    let row = sqlx::query_as::<_, ProductDetailRow>(&format!(
        "{DETAIL_SELECT} WHERE p.slug = $1 AND p.is_active AND c.is_active"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns a product by slug whether or not it is listed. Admin edits go
/// through this so deactivated products can be restored.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_product_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<ProductDetailRow>, DbError> {
    let row = sqlx::query_as::<_, ProductDetailRow>(&format!("{DETAIL_SELECT} WHERE p.slug = $1"))
        .bind(slug)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

async fn get_product_by_id(pool: &PgPool, id: i64) -> Result<ProductDetailRow, DbError> {
    sqlx::query_as::<_, ProductDetailRow>(&format!("{DETAIL_SELECT} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Returns the active variants of a product, ordered by label.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_variants(pool: &PgPool, product_id: i64) -> Result<Vec<VariantRow>, DbError> {
    let rows = sqlx::query_as::<_, VariantRow>(&format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants \
         WHERE product_id = $1 AND is_active \
         ORDER BY label, id"
    ))
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Catalog writes
// ---------------------------------------------------------------------------

/// Inserts a product and returns it with category/brand context.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on failure, including unique `sku`/`slug`
/// violations and unknown category/brand foreign keys.
pub async fn create_product(
    pool: &PgPool,
    product: NewProduct<'_>,
) -> Result<ProductDetailRow, DbError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO products \
             (sku, name, slug, description, category_id, brand_id, price, compare_at_price, \
              stock_quantity, image_urls, is_featured) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING id",
    )
    .bind(product.sku)
    .bind(product.name)
    .bind(product.slug)
    .bind(product.description)
    .bind(product.category_id)
    .bind(product.brand_id)
    .bind(product.price)
    .bind(product.compare_at_price)
    .bind(product.stock_quantity)
    .bind(product.image_urls)
    .bind(product.is_featured)
    .fetch_one(pool)
    .await?;

    get_product_by_id(pool, id).await
}

/// Applies a sparse update to a product.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist, or
/// [`DbError::Sqlx`] if the update fails (e.g. negative stock check).
pub async fn update_product(
    pool: &PgPool,
    product_id: i64,
    patch: ProductPatch<'_>,
) -> Result<ProductDetailRow, DbError> {
    let updated = sqlx::query(
        "UPDATE products \
         SET name             = COALESCE($2, name), \
             description      = CASE WHEN $3::BOOL THEN $4 ELSE description END, \
             category_id      = COALESCE($5, category_id), \
             brand_id         = CASE WHEN $6::BOOL THEN $7::BIGINT ELSE brand_id END, \
             price            = COALESCE($8, price), \
             compare_at_price = CASE WHEN $9::BOOL THEN $10::NUMERIC ELSE compare_at_price END, \
             stock_quantity   = COALESCE($11, stock_quantity), \
             image_urls       = COALESCE($12::TEXT[], image_urls), \
             is_featured      = COALESCE($13, is_featured), \
             is_active        = COALESCE($14, is_active), \
             updated_at       = NOW() \
         WHERE id = $1",
    )
    .bind(product_id)
    .bind(patch.name)
    .bind(patch.description.is_some())
    .bind(patch.description.flatten())
    .bind(patch.category_id)
    .bind(patch.brand_id.is_some())
    .bind(patch.brand_id.flatten())
    .bind(patch.price)
    .bind(patch.compare_at_price.is_some())
    .bind(patch.compare_at_price.flatten())
    .bind(patch.stock_quantity)
    .bind(patch.image_urls)
    .bind(patch.is_featured)
    .bind(patch.is_active)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    get_product_by_id(pool, product_id).await
}

/// Removes a product from the storefront. Existing order snapshots are untouched.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn deactivate_product(pool: &PgPool, product_id: i64) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE products SET is_active = false, updated_at = NOW() \
         WHERE id = $1 AND is_active",
    )
    .bind(product_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on failure, including duplicate variant SKUs.
pub async fn create_variant(pool: &PgPool, variant: NewVariant<'_>) -> Result<VariantRow, DbError> {
    let row = sqlx::query_as::<_, VariantRow>(&format!(
        "INSERT INTO product_variants (product_id, sku, label, price, stock_quantity) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {VARIANT_COLUMNS}"
    ))
    .bind(variant.product_id)
    .bind(variant.sku)
    .bind(variant.label)
    .bind(variant.price)
    .bind(variant.stock_quantity)
    .fetch_one(pool)
    .await?;
    Ok(row)
}
