use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/dzbf-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &dzbf_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Cart(#[from] dzbf_core::CartError),
    #[error(transparent)]
    Coupon(#[from] dzbf_core::CouponError),
    #[error(transparent)]
    Order(#[from] dzbf_core::OrderError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// `true` when the error is a Postgres unique-constraint violation (23505).
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate().as_deref() == Some("23505")
    }

    /// `true` when the error is a foreign-key violation (23503).
    #[must_use]
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate().as_deref() == Some("23503")
    }

    fn sqlstate(&self) -> Option<String> {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db_err)) => {
                db_err.code().map(std::borrow::Cow::into_owned)
            }
            _ => None,
        }
    }
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table does not exist on a fresh database; count that as zero.
    let applied_before: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    MIGRATOR.run(pool).await?;

    let applied_after: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}

pub mod brands;
pub mod carts;
pub mod categories;
pub mod coupons;
pub mod orders;
pub mod products;
pub mod seed;
pub mod sessions;
pub mod users;

pub use brands::{
    create_brand, deactivate_brand, find_brand_by_slug, get_brand_by_slug, list_active_brands,
    update_brand, BrandPatch, BrandRow, BrandSummaryRow, NewBrand,
};
pub use carts::{
    add_item, clear_cart, find_cart, get_or_create_cart, list_cart_lines,
    list_unsellable_cart_lines, merge_lines_into_cart, merge_session_cart_into_user,
    purge_stale_session_carts, remove_item, repair_unsellable_cart_lines, set_cart_coupon,
    set_item_quantity, CartAuditRow, CartLineRow, CartOwner, CartRow, LineRequest,
};
pub use categories::{
    create_category, deactivate_category, find_category_by_slug, get_category_by_slug,
    list_active_categories, update_category, CategoryPatch, CategoryRow, CategorySummaryRow, NewCategory,
};
pub use coupons::{
    create_coupon, deactivate_coupon, get_coupon_by_code, list_coupons, CouponRow, NewCoupon,
};
pub use orders::{
    create_order_from_cart, get_order_by_number, list_order_items, list_orders,
    update_order_status, OrderItemRow, OrderListFilters, OrderRow,
};
pub use products::{
    create_product, create_variant, deactivate_product, find_product_by_slug, get_product_by_slug,
    list_products, list_variants, update_product, NewProduct, NewVariant, ProductDetailRow, ProductListFilters,
    ProductListRow, ProductPatch, ProductSort, VariantRow,
};
pub use seed::{seed_catalog, SeedSummary};
pub use sessions::{create_session, delete_session, find_session_user, purge_expired_sessions};
pub use users::{
    create_user, get_user_by_email, get_user_by_id, set_user_role, NewUser, UserRow, ROLE_ADMIN,
    ROLE_CUSTOMER,
};
