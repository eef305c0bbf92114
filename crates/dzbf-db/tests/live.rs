//! Live integration tests for dzbf-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/dzbf-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::{Duration, Utc};
use dzbf_core::catalog::parse_catalog;
use dzbf_core::{CartError, CheckoutDetails, CouponError, OrderError, OrderStatus, ShippingPolicy};
use dzbf_db::{
    add_item, create_session, create_user, delete_session, find_cart, find_session_user,
    get_coupon_by_code, get_or_create_cart, get_product_by_slug, list_active_brands,
    list_active_categories, list_cart_lines, list_order_items, list_orders, list_products,
    list_unsellable_cart_lines, list_variants, merge_lines_into_cart,
    merge_session_cart_into_user, purge_expired_sessions, purge_stale_session_carts,
    repair_unsellable_cart_lines, seed_catalog, set_cart_coupon, set_item_quantity,
    update_order_status, CartOwner, DbError, LineRequest, NewUser, OrderListFilters,
    ProductListFilters, ProductSort,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CATALOG: &str = r"
brands:
  - name: Optimum Nutrition
  - name: MuscleTech
categories:
  - name: Proteines
  - name: Whey
    parent: proteines
  - name: Creatine
products:
  - sku: ON-GSW-2270
    name: Gold Standard Whey
    category: whey
    brand: optimum-nutrition
    price: 12500
    featured: true
    variants:
      - sku: ON-GSW-2270-CHOC
        label: Chocolat
        stock: 5
      - sku: ON-GSW-2270-VAN
        label: Vanille
        price: 12900
        stock: 0
  - sku: MT-CRE-400
    name: Platinum Creatine
    category: creatine
    brand: muscletech
    price: 3500
    stock: 4
  - sku: ON-CRE-300
    name: Micronized Creatine
    category: creatine
    brand: optimum-nutrition
    price: 4200
    stock: 0
coupons:
  - code: bienvenue10
    kind: percent
    value: 10
    min_subtotal: 5000
  - code: ONCE
    kind: fixed
    value: 500
    max_uses: 1
";

async fn seed(pool: &PgPool) {
    let catalog = parse_catalog(CATALOG).expect("test catalog parses");
    seed_catalog(pool, &catalog).await.expect("seed succeeds");
}

async fn product_id(pool: &PgPool, slug: &str) -> i64 {
    get_product_by_slug(pool, slug)
        .await
        .expect("query succeeds")
        .expect("product exists")
        .id
}

async fn variant_id(pool: &PgPool, sku: &str) -> i64 {
    sqlx::query_scalar("SELECT id FROM product_variants WHERE sku = $1")
        .bind(sku)
        .fetch_one(pool)
        .await
        .expect("variant exists")
}

async fn product_stock(pool: &PgPool, slug: &str) -> i32 {
    sqlx::query_scalar("SELECT stock_quantity FROM products WHERE slug = $1")
        .bind(slug)
        .fetch_one(pool)
        .await
        .expect("product exists")
}

async fn session_cart(pool: &PgPool) -> i64 {
    get_or_create_cart(pool, CartOwner::Session(Uuid::new_v4()))
        .await
        .expect("cart created")
        .id
}

fn checkout_details() -> CheckoutDetails {
    CheckoutDetails {
        customer_name: "Yacine Haddad".to_string(),
        phone: "0661 23 45 67".to_string(),
        email: None,
        wilaya: 31,
        city: "Oran".to_string(),
        address_line: "5 boulevard de la Soummam".to_string(),
        notes: None,
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn seed_catalog_is_idempotent(pool: PgPool) {
    let catalog = parse_catalog(CATALOG).expect("test catalog parses");
    let first = seed_catalog(&pool, &catalog).await.expect("first seed");
    let second = seed_catalog(&pool, &catalog).await.expect("second seed");

    assert_eq!(first, second);
    assert_eq!(first.products, 3);
    assert_eq!(first.variants, 2);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(count, 3);

    let coupon = get_coupon_by_code(&pool, "BIENVENUE10")
        .await
        .expect("query")
        .expect("coupon stored uppercase");
    assert_eq!(coupon.kind, "percent");
}

#[sqlx::test(migrations = "../../migrations")]
async fn category_filter_includes_child_categories(pool: PgPool) {
    seed(&pool).await;

    let rows = list_products(
        &pool,
        &ProductListFilters {
            category_slug: Some("proteines"),
            limit: 24,
            ..ProductListFilters::default()
        },
    )
    .await
    .expect("list succeeds");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sku, "ON-GSW-2270");
    // Stock of a product with variants is the sum over its variants.
    assert_eq!(rows[0].available_stock, 5);
    assert_eq!(rows[0].variant_count, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_products_sorts_filters_and_reports_total(pool: PgPool) {
    seed(&pool).await;

    let rows = list_products(
        &pool,
        &ProductListFilters {
            sort: ProductSort::PriceAsc,
            limit: 2,
            ..ProductListFilters::default()
        },
    )
    .await
    .expect("list succeeds");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].sku, "MT-CRE-400");
    assert_eq!(rows[0].total_count, 3);

    let in_stock = list_products(
        &pool,
        &ProductListFilters {
            in_stock: Some(true),
            search: Some("creatine"),
            limit: 24,
            ..ProductListFilters::default()
        },
    )
    .await
    .expect("list succeeds");
    assert_eq!(in_stock.len(), 1);
    assert_eq!(in_stock[0].sku, "MT-CRE-400");
}

#[sqlx::test(migrations = "../../migrations")]
async fn brand_and_category_listings_count_active_products(pool: PgPool) {
    seed(&pool).await;

    let brands = list_active_brands(&pool).await.expect("brands");
    let on = brands
        .iter()
        .find(|b| b.slug == "optimum-nutrition")
        .expect("brand listed");
    assert_eq!(on.product_count, 2);

    let categories = list_active_categories(&pool).await.expect("categories");
    let whey = categories
        .iter()
        .find(|c| c.slug == "whey")
        .expect("category listed");
    assert_eq!(whey.parent_slug.as_deref(), Some("proteines"));
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn adding_the_same_product_twice_merges_lines(pool: PgPool) {
    seed(&pool).await;
    let cart_id = session_cart(&pool).await;
    let creatine = product_id(&pool, "platinum-creatine").await;

    add_item(&pool, cart_id, creatine, None, 1).await.expect("first add");
    add_item(&pool, cart_id, creatine, None, 2).await.expect("second add");

    let lines = list_cart_lines(&pool, cart_id).await.expect("lines");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn add_item_rejects_quantities_above_stock(pool: PgPool) {
    seed(&pool).await;
    let cart_id = session_cart(&pool).await;
    let creatine = product_id(&pool, "platinum-creatine").await;

    let err = add_item(&pool, cart_id, creatine, None, 5)
        .await
        .expect_err("only 4 in stock");
    assert!(matches!(
        err,
        DbError::Cart(CartError::InsufficientStock {
            requested: 5,
            available: 4,
            ..
        })
    ));

    let sold_out = product_id(&pool, "micronized-creatine").await;
    let err = add_item(&pool, cart_id, sold_out, None, 1)
        .await
        .expect_err("sold out");
    assert!(matches!(err, DbError::Cart(CartError::OutOfStock(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn products_with_variants_require_a_variant(pool: PgPool) {
    seed(&pool).await;
    let cart_id = session_cart(&pool).await;
    let whey = product_id(&pool, "gold-standard-whey").await;

    let err = add_item(&pool, cart_id, whey, None, 1)
        .await
        .expect_err("variant required");
    assert!(matches!(
        err,
        DbError::Cart(CartError::VariantRequired { .. })
    ));

    let choc = variant_id(&pool, "ON-GSW-2270-CHOC").await;
    add_item(&pool, cart_id, whey, Some(choc), 2)
        .await
        .expect("variant add succeeds");
    let lines = list_cart_lines(&pool, cart_id).await.expect("lines");
    assert_eq!(lines[0].sku, "ON-GSW-2270-CHOC");
    assert_eq!(lines[0].unit_price, Decimal::new(12500, 0));
}

#[sqlx::test(migrations = "../../migrations")]
async fn setting_quantity_to_zero_removes_the_line(pool: PgPool) {
    seed(&pool).await;
    let cart_id = session_cart(&pool).await;
    let creatine = product_id(&pool, "platinum-creatine").await;
    add_item(&pool, cart_id, creatine, None, 2).await.expect("add");
    let item_id = list_cart_lines(&pool, cart_id).await.expect("lines")[0].item_id;

    set_item_quantity(&pool, cart_id, item_id, 0)
        .await
        .expect("zero removes");
    assert!(list_cart_lines(&pool, cart_id).await.expect("lines").is_empty());

    let err = set_item_quantity(&pool, cart_id, item_id, 1)
        .await
        .expect_err("item is gone");
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
async fn merge_clamps_to_stock_and_reports_adjustments(pool: PgPool) {
    seed(&pool).await;
    let cart_id = session_cart(&pool).await;
    let creatine = product_id(&pool, "platinum-creatine").await;
    let sold_out = product_id(&pool, "micronized-creatine").await;
    add_item(&pool, cart_id, creatine, None, 2).await.expect("add");

    let adjustments = merge_lines_into_cart(
        &pool,
        cart_id,
        &[
            LineRequest {
                product_id: creatine,
                variant_id: None,
                quantity: 3,
            },
            LineRequest {
                product_id: sold_out,
                variant_id: None,
                quantity: 1,
            },
        ],
    )
    .await
    .expect("merge succeeds");

    let lines = list_cart_lines(&pool, cart_id).await.expect("lines");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 4);

    let clamped = adjustments
        .iter()
        .find(|a| a.product_id == creatine)
        .expect("creatine clamped");
    assert_eq!((clamped.requested, clamped.granted), (5, 4));
    let dropped = adjustments
        .iter()
        .find(|a| a.product_id == sold_out)
        .expect("sold-out line dropped");
    assert_eq!(dropped.granted, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn login_merge_moves_session_cart_into_user_cart(pool: PgPool) {
    seed(&pool).await;
    let user = create_user(
        &pool,
        NewUser {
            email: "Karim@Example.dz",
            password_hash: "hash",
            full_name: "Karim",
            phone: None,
        },
    )
    .await
    .expect("user created");
    let creatine = product_id(&pool, "platinum-creatine").await;

    let user_cart = get_or_create_cart(&pool, CartOwner::User(user.id))
        .await
        .expect("user cart");
    add_item(&pool, user_cart.id, creatine, None, 1).await.expect("add");

    let session = Uuid::new_v4();
    let anon = get_or_create_cart(&pool, CartOwner::Session(session))
        .await
        .expect("anon cart");
    add_item(&pool, anon.id, creatine, None, 2).await.expect("add");
    set_cart_coupon(&pool, anon.id, Some("BIENVENUE10"))
        .await
        .expect("coupon");

    let adjustments = merge_session_cart_into_user(&pool, session, user.id)
        .await
        .expect("merge");
    assert!(adjustments.is_empty());

    let lines = list_cart_lines(&pool, user_cart.id).await.expect("lines");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 3);

    let merged = find_cart(&pool, CartOwner::User(user.id))
        .await
        .expect("query")
        .expect("user cart");
    assert_eq!(merged.coupon_code.as_deref(), Some("BIENVENUE10"));
    assert!(find_cart(&pool, CartOwner::Session(session))
        .await
        .expect("query")
        .is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn cart_audit_finds_and_repairs_oversold_lines(pool: PgPool) {
    seed(&pool).await;
    let cart_id = session_cart(&pool).await;
    let creatine = product_id(&pool, "platinum-creatine").await;
    add_item(&pool, cart_id, creatine, None, 3).await.expect("add");

    sqlx::query("UPDATE products SET stock_quantity = 1 WHERE id = $1")
        .bind(creatine)
        .execute(&pool)
        .await
        .expect("stock lowered");

    let audit = list_unsellable_cart_lines(&pool).await.expect("audit");
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].available_stock, 1);

    assert_eq!(repair_unsellable_cart_lines(&pool).await.expect("repair"), 1);
    let lines = list_cart_lines(&pool, cart_id).await.expect("lines");
    assert_eq!(lines[0].quantity, 1);
    assert!(list_unsellable_cart_lines(&pool).await.expect("audit").is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_session_carts_are_purged(pool: PgPool) {
    let cart_id = session_cart(&pool).await;
    sqlx::query("UPDATE carts SET updated_at = NOW() - INTERVAL '40 days' WHERE id = $1")
        .bind(cart_id)
        .execute(&pool)
        .await
        .expect("backdate");
    let fresh = session_cart(&pool).await;

    let purged = purge_stale_session_carts(&pool, Utc::now() - Duration::days(30))
        .await
        .expect("purge");
    assert_eq!(purged, 1);

    let remaining: Vec<i64> = sqlx::query_scalar("SELECT id FROM carts")
        .fetch_all(&pool)
        .await
        .expect("carts");
    assert_eq!(remaining, vec![fresh]);
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_decrements_stock_and_empties_cart(pool: PgPool) {
    seed(&pool).await;
    let cart_id = session_cart(&pool).await;
    let creatine = product_id(&pool, "platinum-creatine").await;
    add_item(&pool, cart_id, creatine, None, 2).await.expect("add");

    let (order, items) = dzbf_db::create_order_from_cart(
        &pool,
        cart_id,
        None,
        checkout_details(),
        &ShippingPolicy::default(),
        Utc::now(),
    )
    .await
    .expect("checkout succeeds");

    assert!(order.order_number.starts_with("DZ-"));
    assert_eq!(order.status, "pending");
    assert_eq!(order.phone, "0661234567");
    assert_eq!(order.subtotal, Decimal::new(7000, 0));
    assert_eq!(order.shipping_fee, Decimal::new(600, 0));
    assert_eq!(order.total, Decimal::new(7600, 0));
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].sku, "MT-CRE-400");
    assert_eq!(items[0].line_total, Decimal::new(7000, 0));

    assert_eq!(product_stock(&pool, "platinum-creatine").await, 2);
    assert!(list_cart_lines(&pool, cart_id).await.expect("lines").is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_short_on_stock_changes_nothing(pool: PgPool) {
    seed(&pool).await;
    let cart_id = session_cart(&pool).await;
    let creatine = product_id(&pool, "platinum-creatine").await;
    let whey = product_id(&pool, "gold-standard-whey").await;
    let choc = variant_id(&pool, "ON-GSW-2270-CHOC").await;
    add_item(&pool, cart_id, whey, Some(choc), 1).await.expect("add whey");
    add_item(&pool, cart_id, creatine, None, 3).await.expect("add creatine");

    sqlx::query("UPDATE products SET stock_quantity = 2 WHERE id = $1")
        .bind(creatine)
        .execute(&pool)
        .await
        .expect("stock lowered");

    let err = dzbf_db::create_order_from_cart(
        &pool,
        cart_id,
        None,
        checkout_details(),
        &ShippingPolicy::default(),
        Utc::now(),
    )
    .await
    .expect_err("not enough creatine");
    assert!(matches!(
        err,
        DbError::Cart(CartError::InsufficientStock { .. })
    ));

    let choc_stock: i32 =
        sqlx::query_scalar("SELECT stock_quantity FROM product_variants WHERE id = $1")
            .bind(choc)
            .fetch_one(&pool)
            .await
            .expect("variant");
    assert_eq!(choc_stock, 5);
    assert_eq!(list_cart_lines(&pool, cart_id).await.expect("lines").len(), 2);
    let orders = list_orders(
        &pool,
        &OrderListFilters {
            limit: 10,
            ..OrderListFilters::default()
        },
    )
    .await
    .expect("orders");
    assert!(orders.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_of_empty_cart_is_rejected(pool: PgPool) {
    let cart_id = session_cart(&pool).await;
    let err = dzbf_db::create_order_from_cart(
        &pool,
        cart_id,
        None,
        checkout_details(),
        &ShippingPolicy::default(),
        Utc::now(),
    )
    .await
    .expect_err("empty cart");
    assert!(matches!(err, DbError::Order(OrderError::EmptyCart)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_applies_coupon_and_counts_redemption(pool: PgPool) {
    seed(&pool).await;
    let whey = product_id(&pool, "gold-standard-whey").await;
    let choc = variant_id(&pool, "ON-GSW-2270-CHOC").await;

    let cart_id = session_cart(&pool).await;
    add_item(&pool, cart_id, whey, Some(choc), 1).await.expect("add");
    set_cart_coupon(&pool, cart_id, Some("ONCE")).await.expect("coupon");

    let (order, _) = dzbf_db::create_order_from_cart(
        &pool,
        cart_id,
        None,
        checkout_details(),
        &ShippingPolicy::default(),
        Utc::now(),
    )
    .await
    .expect("checkout");
    assert_eq!(order.discount, Decimal::new(500, 0));
    // 12500 - 500 stays above the free-shipping threshold.
    assert_eq!(order.shipping_fee, Decimal::ZERO);
    assert_eq!(order.total, Decimal::new(12_000, 0));
    assert_eq!(order.coupon_code.as_deref(), Some("ONCE"));

    let coupon = get_coupon_by_code(&pool, "once")
        .await
        .expect("query")
        .expect("coupon");
    assert_eq!(coupon.used_count, 1);

    let second = session_cart(&pool).await;
    add_item(&pool, second, whey, Some(choc), 1).await.expect("add");
    set_cart_coupon(&pool, second, Some("ONCE")).await.expect("coupon");
    let err = dzbf_db::create_order_from_cart(
        &pool,
        second,
        None,
        checkout_details(),
        &ShippingPolicy::default(),
        Utc::now(),
    )
    .await
    .expect_err("coupon exhausted");
    assert!(matches!(err, DbError::Coupon(CouponError::Exhausted(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancelling_an_order_restores_stock(pool: PgPool) {
    seed(&pool).await;
    let cart_id = session_cart(&pool).await;
    let creatine = product_id(&pool, "platinum-creatine").await;
    add_item(&pool, cart_id, creatine, None, 3).await.expect("add");

    let (order, _) = dzbf_db::create_order_from_cart(
        &pool,
        cart_id,
        None,
        checkout_details(),
        &ShippingPolicy::default(),
        Utc::now(),
    )
    .await
    .expect("checkout");
    assert_eq!(product_stock(&pool, "platinum-creatine").await, 1);

    let confirmed = update_order_status(&pool, &order.order_number, OrderStatus::Confirmed)
        .await
        .expect("confirm");
    assert_eq!(confirmed.status, "confirmed");

    let err = update_order_status(&pool, &order.order_number, OrderStatus::Delivered)
        .await
        .expect_err("cannot skip shipping");
    assert!(matches!(
        err,
        DbError::Order(OrderError::InvalidTransition { .. })
    ));

    update_order_status(&pool, &order.order_number, OrderStatus::Cancelled)
        .await
        .expect("cancel");
    assert_eq!(product_stock(&pool, "platinum-creatine").await, 4);

    let items = list_order_items(&pool, order.id).await.expect("items");
    assert_eq!(items[0].quantity, 3);
}

// ---------------------------------------------------------------------------
// Users & sessions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_email_is_a_unique_violation(pool: PgPool) {
    let user = NewUser {
        email: "amel@example.dz",
        password_hash: "hash",
        full_name: "Amel",
        phone: Some("0550123456"),
    };
    create_user(&pool, user).await.expect("first insert");
    let err = create_user(
        &pool,
        NewUser {
            email: "AMEL@example.dz",
            ..user
        },
    )
    .await
    .expect_err("emails are case-insensitive");
    assert!(err.is_unique_violation());
}

#[sqlx::test(migrations = "../../migrations")]
async fn sessions_resolve_until_expired_or_deleted(pool: PgPool) {
    let user = create_user(
        &pool,
        NewUser {
            email: "nadia@example.dz",
            password_hash: "hash",
            full_name: "Nadia",
            phone: None,
        },
    )
    .await
    .expect("user");

    create_session(&pool, user.id, "live-hash", Utc::now() + Duration::hours(1))
        .await
        .expect("session");
    create_session(&pool, user.id, "old-hash", Utc::now() - Duration::hours(1))
        .await
        .expect("session");

    let found = find_session_user(&pool, "live-hash")
        .await
        .expect("query")
        .expect("live session resolves");
    assert_eq!(found.id, user.id);
    assert!(find_session_user(&pool, "old-hash")
        .await
        .expect("query")
        .is_none());

    assert_eq!(purge_expired_sessions(&pool).await.expect("purge"), 1);
    assert!(delete_session(&pool, "live-hash").await.expect("delete"));
    assert!(!delete_session(&pool, "live-hash").await.expect("delete"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn variants_are_listed_by_label(pool: PgPool) {
    seed(&pool).await;
    let whey = product_id(&pool, "gold-standard-whey").await;
    let variants = list_variants(&pool, whey).await.expect("variants");
    let labels: Vec<_> = variants.iter().map(|v| v.label.as_str()).collect();
    assert_eq!(labels, vec!["Chocolat", "Vanille"]);
    assert_eq!(variants[1].price, Some(Decimal::new(12900, 0)));
}
