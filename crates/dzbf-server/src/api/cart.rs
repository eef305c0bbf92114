use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use dzbf_core::{
    compute_totals, Coupon, CouponError, CartTotals, StockAdjustment, MAX_LINE_QUANTITY,
};
use dzbf_db::{CartLineRow, CartOwner, CartRow, LineRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{CurrentUser, RequestId};

use super::{
    map_coupon_error, map_db_error, resolve_image_url, ApiError, ApiResponse, ApiResult,
    AppState,
};

/// Header carrying the anonymous cart id for shoppers without a session.
pub(crate) const CART_SESSION_HEADER: &str = "x-cart-session";

/// Upper bound on lines accepted by one merge request.
const MAX_MERGE_LINES: usize = 100;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub(super) enum StockState {
    InStock,
    Insufficient,
    OutOfStock,
    Unavailable,
}

impl StockState {
    fn of(line: &CartLineRow) -> Self {
        if !line.is_active {
            StockState::Unavailable
        } else if line.available_stock <= 0 {
            StockState::OutOfStock
        } else if line.available_stock < line.quantity {
            StockState::Insufficient
        } else {
            StockState::InStock
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CartItemView {
    item_id: i64,
    product_id: i64,
    variant_id: Option<i64>,
    product_name: String,
    product_slug: String,
    sku: String,
    variant_label: Option<String>,
    image_url: Option<String>,
    unit_price: Decimal,
    quantity: i32,
    line_total: Decimal,
    available_stock: i32,
    stock_state: StockState,
}

#[derive(Debug, Serialize)]
pub(super) struct CartView {
    id: Option<Uuid>,
    coupon_code: Option<String>,
    items: Vec<CartItemView>,
    totals: CartTotals,
    /// `false` when any line is unavailable or short on stock.
    can_checkout: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct MergeResult {
    cart: CartView,
    adjustments: Vec<StockAdjustment>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AddItemBody {
    product_id: i64,
    variant_id: Option<i64>,
    #[serde(default = "one")]
    quantity: i32,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateItemBody {
    quantity: i32,
}

#[derive(Debug, Deserialize)]
pub(super) struct MergeLine {
    product_id: i64,
    variant_id: Option<i64>,
    quantity: i32,
}

#[derive(Debug, Deserialize)]
pub(super) struct MergeBody {
    items: Vec<MergeLine>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CouponBody {
    code: String,
}

fn one() -> i32 {
    1
}

/// Resolve who owns the cart for this request: the signed-in user, else the
/// anonymous id in [`CART_SESSION_HEADER`].
pub(super) fn resolve_owner(
    rid: &str,
    user: &CurrentUser,
    headers: &HeaderMap,
) -> Result<CartOwner, ApiError> {
    if let Some(user) = &user.0 {
        return Ok(CartOwner::User(user.id));
    }
    let raw = headers
        .get(CART_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError::new(
                rid,
                "bad_request",
                format!("sign in or send an {CART_SESSION_HEADER} header"),
            )
        })?;
    Uuid::parse_str(raw).map(CartOwner::Session).map_err(|_| {
        ApiError::new(
            rid,
            "bad_request",
            format!("{CART_SESSION_HEADER} must be a UUID"),
        )
    })
}

async fn owned_cart(state: &AppState, rid: &str, owner: CartOwner) -> Result<CartRow, ApiError> {
    dzbf_db::get_or_create_cart(&state.pool, owner)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))
}

/// Build the priced view of `cart`. A missing cart renders as empty.
async fn cart_view(
    state: &AppState,
    rid: &str,
    cart: Option<&CartRow>,
) -> Result<CartView, ApiError> {
    let policy = state.config.shipping_policy();
    let now = Utc::now();
    let Some(cart) = cart else {
        return Ok(CartView {
            id: None,
            coupon_code: None,
            items: Vec::new(),
            totals: compute_totals(&[], None, &policy, now),
            can_checkout: false,
        });
    };

    let rows = dzbf_db::list_cart_lines(&state.pool, cart.id)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?;

    // Lines that can no longer be sold stay visible but are left out of totals.
    let lines: Vec<_> = rows
        .iter()
        .filter(|r| r.is_active)
        .map(CartLineRow::to_cart_line)
        .collect();

    let (coupon, missing_coupon) = match cart.coupon_code.as_deref() {
        Some(code) => {
            let row = dzbf_db::get_coupon_by_code(&state.pool, code)
                .await
                .map_err(|e| map_db_error(rid.to_owned(), &e))?;
            match row.map(|r| r.to_coupon()).transpose() {
                Ok(Some(coupon)) => (Some(coupon), None),
                Ok(None) => (None, Some(CouponError::Unknown(code.to_owned()))),
                Err(e) => (None, Some(e)),
            }
        }
        None => (None, None),
    };

    let mut totals = compute_totals(&lines, coupon.as_ref(), &policy, now);
    if let Some(e) = missing_coupon {
        totals.coupon_error = Some(e.to_string());
    }

    let can_checkout = !rows.is_empty() && rows.iter().all(CartLineRow::is_sellable);
    let items = rows
        .into_iter()
        .map(|row| {
            let stock_state = StockState::of(&row);
            let line_total = row.to_cart_line().line_total();
            CartItemView {
                item_id: row.item_id,
                product_id: row.product_id,
                variant_id: row.variant_id,
                product_name: row.product_name,
                product_slug: row.product_slug,
                sku: row.sku,
                variant_label: row.variant_label,
                image_url: row
                    .image_url
                    .as_deref()
                    .map(|p| resolve_image_url(&state.config, p)),
                unit_price: row.unit_price,
                quantity: row.quantity,
                line_total,
                available_stock: row.available_stock.max(0),
                stock_state,
            }
        })
        .collect();

    Ok(CartView {
        id: Some(cart.public_id),
        coupon_code: cart.coupon_code.clone(),
        items,
        totals,
        can_checkout,
    })
}

async fn respond_with_cart(state: &AppState, rid: String, cart: &CartRow) -> ApiResult<CartView> {
    let view = cart_view(state, &rid, Some(cart)).await?;
    Ok(Json(ApiResponse::new(rid, view)))
}

pub(super) async fn get_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    user: CurrentUser,
    headers: HeaderMap,
) -> ApiResult<CartView> {
    let owner = resolve_owner(&req_id.0, &user, &headers)?;
    let cart = dzbf_db::find_cart(&state.pool, owner)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let view = cart_view(&state, &req_id.0, cart.as_ref()).await?;
    Ok(Json(ApiResponse::new(req_id.0, view)))
}

pub(super) async fn add_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    user: CurrentUser,
    headers: HeaderMap,
    Json(body): Json<AddItemBody>,
) -> ApiResult<CartView> {
    let owner = resolve_owner(&req_id.0, &user, &headers)?;
    let cart = owned_cart(&state, &req_id.0, owner).await?;
    dzbf_db::add_item(
        &state.pool,
        cart.id,
        body.product_id,
        body.variant_id,
        body.quantity,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    respond_with_cart(&state, req_id.0, &cart).await
}

pub(super) async fn update_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    user: CurrentUser,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
    Json(body): Json<UpdateItemBody>,
) -> ApiResult<CartView> {
    let owner = resolve_owner(&req_id.0, &user, &headers)?;
    let cart = owned_cart(&state, &req_id.0, owner).await?;
    dzbf_db::set_item_quantity(&state.pool, cart.id, item_id, body.quantity)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    respond_with_cart(&state, req_id.0, &cart).await
}

pub(super) async fn remove_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    user: CurrentUser,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> ApiResult<CartView> {
    let owner = resolve_owner(&req_id.0, &user, &headers)?;
    let cart = owned_cart(&state, &req_id.0, owner).await?;
    dzbf_db::remove_item(&state.pool, cart.id, item_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    respond_with_cart(&state, req_id.0, &cart).await
}

pub(super) async fn clear_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    user: CurrentUser,
    headers: HeaderMap,
) -> ApiResult<CartView> {
    let owner = resolve_owner(&req_id.0, &user, &headers)?;
    let Some(cart) = dzbf_db::find_cart(&state.pool, owner)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
    else {
        let view = cart_view(&state, &req_id.0, None).await?;
        return Ok(Json(ApiResponse::new(req_id.0, view)));
    };
    dzbf_db::clear_cart(&state.pool, cart.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let cleared = CartRow {
        coupon_code: None,
        ..cart
    };
    respond_with_cart(&state, req_id.0, &cleared).await
}

pub(super) async fn merge_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    user: CurrentUser,
    headers: HeaderMap,
    Json(body): Json<MergeBody>,
) -> ApiResult<MergeResult> {
    let rid = req_id.0;
    let owner = resolve_owner(&rid, &user, &headers)?;
    if body.items.len() > MAX_MERGE_LINES {
        return Err(ApiError::new(
            rid,
            "validation_error",
            format!("at most {MAX_MERGE_LINES} lines can be merged at once"),
        ));
    }
    if let Some(bad) = body
        .items
        .iter()
        .find(|l| !(1..=MAX_LINE_QUANTITY).contains(&l.quantity))
    {
        return Err(ApiError::new(
            rid,
            "validation_error",
            format!(
                "quantity for product {} must be between 1 and {MAX_LINE_QUANTITY}",
                bad.product_id
            ),
        ));
    }

    let incoming: Vec<LineRequest> = body
        .items
        .iter()
        .map(|l| LineRequest {
            product_id: l.product_id,
            variant_id: l.variant_id,
            quantity: l.quantity,
        })
        .collect();

    let cart = owned_cart(&state, &rid, owner).await?;
    let adjustments = dzbf_db::merge_lines_into_cart(&state.pool, cart.id, &incoming)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !adjustments.is_empty() {
        tracing::debug!(cart_id = cart.id, adjusted = adjustments.len(), "cart merge clamped lines");
    }

    let view = cart_view(&state, &rid, Some(&cart)).await?;
    Ok(Json(ApiResponse::new(
        rid,
        MergeResult {
            cart: view,
            adjustments,
        },
    )))
}

pub(super) async fn apply_coupon(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    user: CurrentUser,
    headers: HeaderMap,
    Json(body): Json<CouponBody>,
) -> ApiResult<CartView> {
    let rid = req_id.0;
    let owner = resolve_owner(&rid, &user, &headers)?;
    let code = Coupon::normalize_code(&body.code);
    if code.is_empty() {
        return Err(ApiError::new(rid, "validation_error", "code is required"));
    }

    let coupon = dzbf_db::get_coupon_by_code(&state.pool, &code)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| map_coupon_error(rid.clone(), &CouponError::Unknown(code.clone())))?
        .to_coupon()
        .map_err(|e| map_coupon_error(rid.clone(), &e))?;

    // The minimum subtotal is re-checked on every view and at checkout, so a
    // coupon may be attached before the cart reaches it.
    coupon
        .check(coupon.min_subtotal, Utc::now())
        .map_err(|e| map_coupon_error(rid.clone(), &e))?;

    let cart = owned_cart(&state, &rid, owner).await?;
    dzbf_db::set_cart_coupon(&state.pool, cart.id, Some(&code))
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let updated = CartRow {
        coupon_code: Some(code),
        ..cart
    };
    respond_with_cart(&state, rid, &updated).await
}

pub(super) async fn remove_coupon(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    user: CurrentUser,
    headers: HeaderMap,
) -> ApiResult<CartView> {
    let owner = resolve_owner(&req_id.0, &user, &headers)?;
    let cart = owned_cart(&state, &req_id.0, owner).await?;
    dzbf_db::set_cart_coupon(&state.pool, cart.id, None)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let updated = CartRow {
        coupon_code: None,
        ..cart
    };
    respond_with_cart(&state, req_id.0, &updated).await
}
