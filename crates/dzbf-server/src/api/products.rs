use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use dzbf_core::slug_from_name;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{RequestId, RequireAdmin};

use super::{
    double_option, map_db_error, normalize_limit, normalize_offset, require_text,
    resolve_image_url, ApiError, ApiResponse, ApiResult, AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 24;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Serialize)]
pub(super) struct ProductCard {
    id: i64,
    sku: String,
    name: String,
    slug: String,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    in_stock: bool,
    available_stock: i64,
    image_url: Option<String>,
    is_featured: bool,
    category_slug: String,
    category_name: String,
    brand_slug: Option<String>,
    brand_name: Option<String>,
    has_variants: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductPage {
    items: Vec<ProductCard>,
    total: i64,
    limit: i64,
    offset: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct VariantItem {
    id: i64,
    sku: String,
    label: String,
    price: Decimal,
    stock_quantity: i32,
    in_stock: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductDetail {
    id: i64,
    public_id: Uuid,
    sku: String,
    name: String,
    slug: String,
    description: Option<String>,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    stock_quantity: i32,
    in_stock: bool,
    image_urls: Vec<String>,
    is_featured: bool,
    is_active: bool,
    category_id: i64,
    category_slug: String,
    category_name: String,
    brand_id: Option<i64>,
    brand_slug: Option<String>,
    brand_name: Option<String>,
    variants: Vec<VariantItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ProductQuery {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub search: Option<String>,
    pub featured: Option<bool>,
    pub in_stock: Option<bool>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateProductBody {
    sku: String,
    name: String,
    slug: Option<String>,
    description: Option<String>,
    category_id: i64,
    brand_id: Option<i64>,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    #[serde(default)]
    stock_quantity: i32,
    #[serde(default)]
    image_urls: Vec<String>,
    #[serde(default)]
    is_featured: bool,
}

#[allow(clippy::option_option)]
#[derive(Debug, Default, Deserialize)]
pub(super) struct UpdateProductBody {
    name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    description: Option<Option<String>>,
    category_id: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    brand_id: Option<Option<i64>>,
    price: Option<Decimal>,
    #[serde(default, deserialize_with = "double_option")]
    compare_at_price: Option<Option<Decimal>>,
    stock_quantity: Option<i32>,
    image_urls: Option<Vec<String>>,
    is_featured: Option<bool>,
    is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateVariantBody {
    sku: String,
    label: String,
    price: Option<Decimal>,
    #[serde(default)]
    stock_quantity: i32,
}

fn card_from_row(state: &AppState, row: dzbf_db::ProductListRow) -> ProductCard {
    ProductCard {
        id: row.id,
        sku: row.sku,
        name: row.name,
        slug: row.slug,
        price: row.price,
        compare_at_price: row.compare_at_price,
        in_stock: row.available_stock > 0,
        available_stock: row.available_stock,
        image_url: row
            .image_urls
            .first()
            .map(|p| resolve_image_url(&state.config, p)),
        is_featured: row.is_featured,
        category_slug: row.category_slug,
        category_name: row.category_name,
        brand_slug: row.brand_slug,
        brand_name: row.brand_name,
        has_variants: row.variant_count > 0,
        created_at: row.created_at,
    }
}

fn detail_from_rows(
    state: &AppState,
    row: dzbf_db::ProductDetailRow,
    variants: Vec<dzbf_db::VariantRow>,
) -> ProductDetail {
    let variants: Vec<VariantItem> = variants
        .into_iter()
        .map(|v| VariantItem {
            id: v.id,
            sku: v.sku,
            label: v.label,
            price: v.price.unwrap_or(row.price),
            stock_quantity: v.stock_quantity,
            in_stock: v.stock_quantity > 0,
        })
        .collect();
    let in_stock = if variants.is_empty() {
        row.stock_quantity > 0
    } else {
        variants.iter().any(|v| v.in_stock)
    };

    ProductDetail {
        id: row.id,
        public_id: row.public_id,
        sku: row.sku,
        name: row.name,
        slug: row.slug,
        description: row.description,
        price: row.price,
        compare_at_price: row.compare_at_price,
        stock_quantity: row.stock_quantity,
        in_stock,
        image_urls: row
            .image_urls
            .iter()
            .map(|p| resolve_image_url(&state.config, p))
            .collect(),
        is_featured: row.is_featured,
        is_active: row.is_active,
        category_id: row.category_id,
        category_slug: row.category_slug,
        category_name: row.category_name,
        brand_id: row.brand_id,
        brand_slug: row.brand_slug,
        brand_name: row.brand_name,
        variants,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn validate_pricing(
    rid: &str,
    price: Option<Decimal>,
    compare_at_price: Option<Decimal>,
    stock_quantity: Option<i32>,
) -> Result<(), ApiError> {
    if price.is_some_and(|p| p.is_sign_negative()) {
        return Err(ApiError::new(rid, "validation_error", "price must not be negative"));
    }
    if compare_at_price.is_some_and(|p| p.is_sign_negative()) {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "compare_at_price must not be negative",
        ));
    }
    if stock_quantity.is_some_and(|s| s < 0) {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "stock_quantity must not be negative",
        ));
    }
    Ok(())
}

async fn product_by_slug(
    state: &AppState,
    rid: &str,
    slug: &str,
) -> Result<dzbf_db::ProductDetailRow, ApiError> {
    dzbf_db::get_product_by_slug(&state.pool, slug)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("product '{slug}' not found")))
}

/// Admin lookup that also finds deactivated products.
async fn admin_product_by_slug(
    state: &AppState,
    rid: &str,
    slug: &str,
) -> Result<dzbf_db::ProductDetailRow, ApiError> {
    dzbf_db::find_product_by_slug(&state.pool, slug)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("product '{slug}' not found")))
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductQuery>,
) -> ApiResult<ProductPage> {
    let sort = match query.sort.as_deref() {
        None | Some("") => dzbf_db::ProductSort::default(),
        Some(raw) => dzbf_db::ProductSort::parse(raw).ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "validation_error",
                format!("unknown sort '{raw}'; expected newest, price_asc, price_desc or name"),
            )
        })?,
    };
    if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
        if min > max {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                "min_price must not exceed max_price",
            ));
        }
    }

    let limit = normalize_limit(query.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    let offset = normalize_offset(query.offset);
    let mut filters = dzbf_db::ProductListFilters {
        category_slug: query.category.as_deref(),
        brand_slug: query.brand.as_deref(),
        search: query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        featured: query.featured,
        in_stock: query.in_stock,
        min_price: query.min_price,
        max_price: query.max_price,
        sort,
        limit,
        offset,
    };

    let rows = dzbf_db::list_products(&state.pool, &filters)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let total = match rows.first() {
        Some(row) => row.total_count,
        None if offset > 0 => {
            // Past the last page: the window count is still needed for pagination.
            filters.limit = 1;
            filters.offset = 0;
            dzbf_db::list_products(&state.pool, &filters)
                .await
                .map_err(|e| map_db_error(req_id.0.clone(), &e))?
                .first()
                .map_or(0, |r| r.total_count)
        }
        None => 0,
    };

    let items = rows
        .into_iter()
        .map(|row| card_from_row(&state, row))
        .collect();

    Ok(Json(ApiResponse::new(
        req_id.0,
        ProductPage {
            items,
            total,
            limit,
            offset,
        },
    )))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> ApiResult<ProductDetail> {
    let row = product_by_slug(&state, &req_id.0, &slug).await?;
    let variants = dzbf_db::list_variants(&state.pool, row.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        req_id.0,
        detail_from_rows(&state, row, variants),
    )))
}

pub(super) async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<CreateProductBody>,
) -> ApiResult<ProductDetail> {
    let rid = req_id.0;
    let sku = require_text(&rid, "sku", &body.sku, 64)?;
    let name = require_text(&rid, "name", &body.name, 200)?;
    let slug = match body.slug.as_deref() {
        Some(s) => require_text(&rid, "slug", s, 200)?,
        None => slug_from_name(&name),
    };
    if slug.is_empty() {
        return Err(ApiError::new(rid, "validation_error", "slug must not be empty"));
    }
    validate_pricing(
        &rid,
        Some(body.price),
        body.compare_at_price,
        Some(body.stock_quantity),
    )?;

    let row = dzbf_db::create_product(
        &state.pool,
        dzbf_db::NewProduct {
            sku: &sku,
            name: &name,
            slug: &slug,
            description: body.description.as_deref(),
            category_id: body.category_id,
            brand_id: body.brand_id,
            price: body.price,
            compare_at_price: body.compare_at_price,
            stock_quantity: body.stock_quantity,
            image_urls: &body.image_urls,
            is_featured: body.is_featured,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(admin = %admin.email, sku = %row.sku, "product created");
    Ok(Json(ApiResponse::new(
        rid,
        detail_from_rows(&state, row, Vec::new()),
    )))
}

pub(super) async fn update_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Path(slug): Path<String>,
    Json(body): Json<UpdateProductBody>,
) -> ApiResult<ProductDetail> {
    let rid = req_id.0;
    let existing = admin_product_by_slug(&state, &rid, &slug).await?;
    let name = body
        .name
        .as_deref()
        .map(|n| require_text(&rid, "name", n, 200))
        .transpose()?;
    validate_pricing(
        &rid,
        body.price,
        body.compare_at_price.flatten(),
        body.stock_quantity,
    )?;

    let row = dzbf_db::update_product(
        &state.pool,
        existing.id,
        dzbf_db::ProductPatch {
            name: name.as_deref(),
            description: body.description.as_ref().map(|d| d.as_deref()),
            category_id: body.category_id,
            brand_id: body.brand_id,
            price: body.price,
            compare_at_price: body.compare_at_price,
            stock_quantity: body.stock_quantity,
            image_urls: body.image_urls.as_deref(),
            is_featured: body.is_featured,
            is_active: body.is_active,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;
    let variants = dzbf_db::list_variants(&state.pool, row.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(admin = %admin.email, sku = %row.sku, "product updated");
    Ok(Json(ApiResponse::new(
        rid,
        detail_from_rows(&state, row, variants),
    )))
}

pub(super) async fn deactivate_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Path(slug): Path<String>,
) -> ApiResult<serde_json::Value> {
    let existing = admin_product_by_slug(&state, &req_id.0, &slug).await?;
    dzbf_db::deactivate_product(&state.pool, existing.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(admin = %admin.email, sku = %existing.sku, "product deactivated");
    Ok(Json(ApiResponse::new(
        req_id.0,
        serde_json::json!({ "slug": existing.slug, "is_active": false }),
    )))
}

pub(super) async fn create_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Path(slug): Path<String>,
    Json(body): Json<CreateVariantBody>,
) -> ApiResult<VariantItem> {
    let rid = req_id.0;
    let product = admin_product_by_slug(&state, &rid, &slug).await?;
    let sku = require_text(&rid, "sku", &body.sku, 64)?;
    let label = require_text(&rid, "label", &body.label, 80)?;
    validate_pricing(&rid, body.price, None, Some(body.stock_quantity))?;

    let row = dzbf_db::create_variant(
        &state.pool,
        dzbf_db::NewVariant {
            product_id: product.id,
            sku: &sku,
            label: &label,
            price: body.price,
            stock_quantity: body.stock_quantity,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(admin = %admin.email, sku = %row.sku, product = %product.sku, "variant created");
    Ok(Json(ApiResponse::new(
        rid,
        VariantItem {
            id: row.id,
            sku: row.sku,
            label: row.label,
            price: row.price.unwrap_or(product.price),
            stock_quantity: row.stock_quantity,
            in_stock: row.stock_quantity > 0,
        },
    )))
}
