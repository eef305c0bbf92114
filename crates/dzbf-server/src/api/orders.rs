use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use dzbf_core::{CheckoutDetails, OrderError, OrderStatus};
use dzbf_db::{OrderItemRow, OrderRow};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{CurrentUser, RequestId, RequireAdmin, RequireUser};

use super::{
    cart::resolve_owner, map_db_error, map_order_error, normalize_limit, normalize_offset,
    ApiError, ApiResponse, ApiResult, AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Serialize)]
pub(super) struct OrderItemView {
    product_id: Option<i64>,
    variant_id: Option<i64>,
    product_name: String,
    variant_label: Option<String>,
    sku: String,
    unit_price: Decimal,
    quantity: i32,
    line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderSummary {
    public_id: Uuid,
    order_number: String,
    status: String,
    customer_name: String,
    wilaya: i16,
    city: String,
    total: Decimal,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderView {
    public_id: Uuid,
    order_number: String,
    status: String,
    customer_name: String,
    phone: String,
    email: Option<String>,
    wilaya: i16,
    city: String,
    address_line: String,
    notes: Option<String>,
    subtotal: Decimal,
    discount: Decimal,
    shipping_fee: Decimal,
    total: Decimal,
    coupon_code: Option<String>,
    items: Vec<OrderItemView>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OrderQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusBody {
    status: String,
}

fn order_view(order: OrderRow, items: Vec<OrderItemRow>) -> OrderView {
    OrderView {
        public_id: order.public_id,
        order_number: order.order_number,
        status: order.status,
        customer_name: order.customer_name,
        phone: order.phone,
        email: order.email,
        wilaya: order.wilaya,
        city: order.city,
        address_line: order.address_line,
        notes: order.notes,
        subtotal: order.subtotal,
        discount: order.discount,
        shipping_fee: order.shipping_fee,
        total: order.total,
        coupon_code: order.coupon_code,
        items: items
            .into_iter()
            .map(|i| OrderItemView {
                product_id: i.product_id,
                variant_id: i.variant_id,
                product_name: i.product_name,
                variant_label: i.variant_label,
                sku: i.sku,
                unit_price: i.unit_price,
                quantity: i.quantity,
                line_total: i.line_total,
            })
            .collect(),
        created_at: order.created_at,
        updated_at: order.updated_at,
    }
}

/// Guest orders are reachable by number alone; account orders only by their
/// owner or an admin.
fn check_order_access(rid: &str, order: &OrderRow, user: &CurrentUser) -> Result<(), ApiError> {
    let Some(owner_id) = order.user_id else {
        return Ok(());
    };
    match &user.0 {
        Some(u) if u.id == owner_id || u.is_admin() => Ok(()),
        Some(_) => Err(ApiError::new(
            rid,
            "forbidden",
            "this order belongs to another account",
        )),
        None => Err(ApiError::new(
            rid,
            "unauthorized",
            "sign in to view this order",
        )),
    }
}

pub(super) async fn create_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    user: CurrentUser,
    headers: HeaderMap,
    Json(mut details): Json<CheckoutDetails>,
) -> ApiResult<OrderView> {
    let rid = req_id.0;
    let owner = resolve_owner(&rid, &user, &headers)?;
    if let Some(u) = &user.0 {
        if details.email.as_deref().is_none_or(|e| e.trim().is_empty()) {
            details.email = Some(u.email.clone());
        }
    }

    let cart = dzbf_db::find_cart(&state.pool, owner)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| map_order_error(rid.clone(), &OrderError::EmptyCart))?;

    let (order, items) = dzbf_db::create_order_from_cart(
        &state.pool,
        cart.id,
        owner.user_id(),
        details,
        &state.config.shipping_policy(),
        Utc::now(),
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse::new(rid, order_view(order, items))))
}

pub(super) async fn list_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireUser(user): RequireUser,
    Query(query): Query<OrderQuery>,
) -> ApiResult<Vec<OrderSummary>> {
    let status = query
        .status
        .as_deref()
        .map(OrderStatus::parse)
        .transpose()
        .map_err(|e| map_order_error(req_id.0.clone(), &e))?;

    let filters = dzbf_db::OrderListFilters {
        user_id: if user.is_admin() { None } else { Some(user.id) },
        status,
        limit: normalize_limit(query.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE),
        offset: normalize_offset(query.offset),
    };
    let rows = dzbf_db::list_orders(&state.pool, &filters)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|o| OrderSummary {
            public_id: o.public_id,
            order_number: o.order_number,
            status: o.status,
            customer_name: o.customer_name,
            wilaya: o.wilaya,
            city: o.city,
            total: o.total,
            created_at: o.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::new(req_id.0, data)))
}

pub(super) async fn get_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    user: CurrentUser,
    Path(order_number): Path<String>,
) -> ApiResult<OrderView> {
    let rid = req_id.0;
    let order = dzbf_db::get_order_by_number(&state.pool, &order_number)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                rid.clone(),
                "not_found",
                format!("order '{order_number}' not found"),
            )
        })?;
    check_order_access(&rid, &order, &user)?;

    let items = dzbf_db::list_order_items(&state.pool, order.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(Json(ApiResponse::new(rid, order_view(order, items))))
}

pub(super) async fn update_order_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Path(order_number): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult<OrderView> {
    let rid = req_id.0;
    let next = OrderStatus::parse(body.status.trim())
        .map_err(|e| map_order_error(rid.clone(), &e))?;

    let order = dzbf_db::update_order_status(&state.pool, &order_number, next)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(
        admin = %admin.email,
        order_number = %order.order_number,
        status = next.as_str(),
        "order status updated"
    );

    let items = dzbf_db::list_order_items(&state.pool, order.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(Json(ApiResponse::new(rid, order_view(order, items))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::SessionUser;

    fn order(user_id: Option<i64>) -> OrderRow {
        let now = Utc::now();
        OrderRow {
            id: 1,
            public_id: Uuid::new_v4(),
            order_number: "DZ-20261016-ABC123".to_string(),
            user_id,
            status: "pending".to_string(),
            customer_name: "Yacine B.".to_string(),
            phone: "0551234567".to_string(),
            email: None,
            wilaya: 16,
            city: "Alger".to_string(),
            address_line: "12 rue Didouche Mourad".to_string(),
            notes: None,
            subtotal: Decimal::new(7_000, 0),
            discount: Decimal::ZERO,
            shipping_fee: Decimal::new(600, 0),
            total: Decimal::new(7_600, 0),
            coupon_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn session(id: i64, role: &str) -> CurrentUser {
        CurrentUser(Some(SessionUser {
            id,
            public_id: Uuid::new_v4(),
            email: "client@example.dz".to_string(),
            full_name: "Client".to_string(),
            phone: None,
            role: role.to_string(),
            token_hash: String::new(),
        }))
    }

    #[test]
    fn guest_orders_are_visible_by_number() {
        assert!(check_order_access("rid", &order(None), &CurrentUser::default()).is_ok());
    }

    #[test]
    fn account_orders_require_owner_or_admin() {
        let owned = order(Some(5));
        assert!(check_order_access("rid", &owned, &session(5, "customer")).is_ok());
        assert!(check_order_access("rid", &owned, &session(9, "admin")).is_ok());

        let err = check_order_access("rid", &owned, &session(9, "customer")).expect_err("other");
        assert_eq!(err.error.code, "forbidden");
        let err = check_order_access("rid", &owned, &CurrentUser::default()).expect_err("anon");
        assert_eq!(err.error.code, "unauthorized");
    }
}
