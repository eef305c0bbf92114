use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use dzbf_core::CouponKind;
use dzbf_db::CouponRow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::{RequestId, RequireAdmin};

use super::{map_db_error, ApiError, ApiResponse, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub(super) struct CouponView {
    code: String,
    kind: String,
    value: Decimal,
    min_subtotal: Decimal,
    max_uses: Option<i32>,
    used_count: i32,
    starts_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateCouponBody {
    code: String,
    kind: CouponKind,
    value: Decimal,
    #[serde(default)]
    min_subtotal: Decimal,
    max_uses: Option<i32>,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<CouponRow> for CouponView {
    fn from(row: CouponRow) -> Self {
        Self {
            code: row.code,
            kind: row.kind,
            value: row.value,
            min_subtotal: row.min_subtotal,
            max_uses: row.max_uses,
            used_count: row.used_count,
            starts_at: row.starts_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

pub(super) async fn list_coupons(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(_admin): RequireAdmin,
) -> ApiResult<Vec<CouponView>> {
    let rows = dzbf_db::list_coupons(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(
        req_id.0,
        rows.into_iter().map(CouponView::from).collect(),
    )))
}

pub(super) async fn create_coupon(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<CreateCouponBody>,
) -> ApiResult<CouponView> {
    let rid = req_id.0;
    if body.max_uses.is_some_and(|m| m < 1) {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "max_uses must be at least 1",
        ));
    }
    if let (Some(start), Some(end)) = (body.starts_at, body.expires_at) {
        if end <= start {
            return Err(ApiError::new(
                rid,
                "validation_error",
                "expires_at must be after starts_at",
            ));
        }
    }

    let row = dzbf_db::create_coupon(
        &state.pool,
        dzbf_db::NewCoupon {
            code: &body.code,
            kind: body.kind,
            value: body.value,
            min_subtotal: body.min_subtotal,
            max_uses: body.max_uses,
            starts_at: body.starts_at,
            expires_at: body.expires_at,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(admin = %admin.email, code = %row.code, kind = %row.kind, "coupon created");
    Ok(Json(ApiResponse::new(rid, row.into())))
}

pub(super) async fn deactivate_coupon(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Path(code): Path<String>,
) -> ApiResult<serde_json::Value> {
    dzbf_db::deactivate_coupon(&state.pool, &code)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(admin = %admin.email, code = %code, "coupon deactivated");
    Ok(Json(ApiResponse::new(
        req_id.0,
        serde_json::json!({ "code": dzbf_core::Coupon::normalize_code(&code), "is_active": false }),
    )))
}
