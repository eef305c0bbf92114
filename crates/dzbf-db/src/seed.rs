use std::collections::HashMap;

use dzbf_core::catalog::CatalogFile;
use dzbf_core::Coupon;
use sqlx::PgPool;

use crate::DbError;

/// Rows upserted by [`seed_catalog`], per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub brands: usize,
    pub categories: usize,
    pub products: usize,
    pub variants: usize,
    pub coupons: usize,
}

/// Upsert the catalog seed file into the database.
///
/// Brands, categories, and products are matched on slug, variants on SKU, and
/// coupons on code; re-running the seed updates rows in place and never
/// resets a coupon's `used_count`. All upserts run inside a single
/// transaction; if any operation fails the entire batch is rolled back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails, or
/// [`DbError::NotFound`] if a product names a category missing from the file.
pub async fn seed_catalog(pool: &PgPool, catalog: &CatalogFile) -> Result<SeedSummary, DbError> {
    let mut tx = pool.begin().await?;
    let mut summary = SeedSummary::default();

    let mut brand_ids: HashMap<String, i64> = HashMap::new();
    for brand in &catalog.brands {
        let slug = brand.slug();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO brands (name, slug, description, logo_url, website_url, is_active) \
             VALUES ($1, $2, $3, $4, $5, true) \
             ON CONFLICT (slug) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 logo_url = EXCLUDED.logo_url, \
                 website_url = EXCLUDED.website_url, \
                 is_active = true, \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(&brand.name)
        .bind(&slug)
        .bind(&brand.description)
        .bind(&brand.logo_url)
        .bind(&brand.website_url)
        .fetch_one(&mut *tx)
        .await?;
        brand_ids.insert(slug, id);
        summary.brands += 1;
    }

    let mut category_ids: HashMap<String, i64> = HashMap::new();
    for category in &catalog.categories {
        let slug = category.slug();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO categories (name, slug, description, image_url, sort_order, is_active) \
             VALUES ($1, $2, $3, $4, $5, true) \
             ON CONFLICT (slug) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 image_url = EXCLUDED.image_url, \
                 sort_order = EXCLUDED.sort_order, \
                 is_active = true, \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(&category.name)
        .bind(&slug)
        .bind(&category.description)
        .bind(&category.image_url)
        .bind(category.sort_order)
        .fetch_one(&mut *tx)
        .await?;
        category_ids.insert(slug, id);
        summary.categories += 1;
    }

    // Parents are linked once every category exists.
    for category in &catalog.categories {
        let parent_id = category
            .parent
            .as_ref()
            .and_then(|p| category_ids.get(p).copied());
        sqlx::query("UPDATE categories SET parent_id = $2 WHERE slug = $1")
            .bind(category.slug())
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;
    }

    for product in &catalog.products {
        // `load_catalog` already rejected unknown category references.
        let category_id = category_ids
            .get(&product.category)
            .copied()
            .ok_or(DbError::NotFound)?;
        let brand_id = product
            .brand
            .as_ref()
            .and_then(|b| brand_ids.get(b).copied());

        let product_id: i64 = sqlx::query_scalar(
            "INSERT INTO products \
                 (sku, name, slug, description, category_id, brand_id, price, compare_at_price, \
                  stock_quantity, image_urls, is_featured, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, true) \
             ON CONFLICT (slug) DO UPDATE SET \
                 sku = EXCLUDED.sku, \
                 name = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 category_id = EXCLUDED.category_id, \
                 brand_id = EXCLUDED.brand_id, \
                 price = EXCLUDED.price, \
                 compare_at_price = EXCLUDED.compare_at_price, \
                 stock_quantity = EXCLUDED.stock_quantity, \
                 image_urls = EXCLUDED.image_urls, \
                 is_featured = EXCLUDED.is_featured, \
                 is_active = true, \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.slug())
        .bind(&product.description)
        .bind(category_id)
        .bind(brand_id)
        .bind(product.price)
        .bind(product.compare_at_price)
        .bind(product.stock)
        .bind(&product.images)
        .bind(product.featured)
        .fetch_one(&mut *tx)
        .await?;
        summary.products += 1;

        for variant in &product.variants {
            sqlx::query(
                "INSERT INTO product_variants (product_id, sku, label, price, stock_quantity) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (sku) DO UPDATE SET \
                     product_id = EXCLUDED.product_id, \
                     label = EXCLUDED.label, \
                     price = EXCLUDED.price, \
                     stock_quantity = EXCLUDED.stock_quantity, \
                     is_active = true, \
                     updated_at = NOW()",
            )
            .bind(product_id)
            .bind(&variant.sku)
            .bind(&variant.label)
            .bind(variant.price)
            .bind(variant.stock)
            .execute(&mut *tx)
            .await?;
            summary.variants += 1;
        }
    }

    for coupon in &catalog.coupons {
        sqlx::query(
            "INSERT INTO coupons (code, kind, value, min_subtotal, max_uses, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (code) DO UPDATE SET \
                 kind = EXCLUDED.kind, \
                 value = EXCLUDED.value, \
                 min_subtotal = EXCLUDED.min_subtotal, \
                 max_uses = EXCLUDED.max_uses, \
                 expires_at = EXCLUDED.expires_at, \
                 is_active = true",
        )
        .bind(Coupon::normalize_code(&coupon.code))
        .bind(coupon.kind.as_str())
        .bind(coupon.value)
        .bind(coupon.min_subtotal)
        .bind(coupon.max_uses)
        .bind(coupon.expires_at)
        .execute(&mut *tx)
        .await?;
        summary.coupons += 1;
    }

    tx.commit().await?;

    tracing::info!(
        brands = summary.brands,
        categories = summary.categories,
        products = summary.products,
        variants = summary.variants,
        coupons = summary.coupons,
        "catalog seeded"
    );
    Ok(summary)
}
