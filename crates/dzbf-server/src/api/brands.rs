use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use dzbf_core::slug_from_name;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{RequestId, RequireAdmin};

use super::{
    double_option, map_db_error, require_text, resolve_image_url, ApiError, ApiResponse,
    ApiResult, AppState,
};

#[derive(Debug, Serialize)]
pub(super) struct BrandItem {
    id: i64,
    name: String,
    slug: String,
    logo_url: Option<String>,
    product_count: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct BrandDetail {
    id: i64,
    public_id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    logo_url: Option<String>,
    website_url: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateBrandBody {
    name: String,
    slug: Option<String>,
    description: Option<String>,
    logo_url: Option<String>,
    website_url: Option<String>,
}

#[allow(clippy::option_option)]
#[derive(Debug, Default, Deserialize)]
pub(super) struct UpdateBrandBody {
    name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    logo_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    website_url: Option<Option<String>>,
    is_active: Option<bool>,
}

fn detail(state: &AppState, row: dzbf_db::BrandRow) -> BrandDetail {
    BrandDetail {
        id: row.id,
        public_id: row.public_id,
        name: row.name,
        slug: row.slug,
        description: row.description,
        logo_url: row
            .logo_url
            .as_deref()
            .map(|p| resolve_image_url(&state.config, p)),
        website_url: row.website_url,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

async fn brand_by_slug(
    state: &AppState,
    rid: &str,
    slug: &str,
) -> Result<dzbf_db::BrandRow, ApiError> {
    dzbf_db::get_brand_by_slug(&state.pool, slug)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("brand '{slug}' not found")))
}

async fn admin_brand_by_slug(
    state: &AppState,
    rid: &str,
    slug: &str,
) -> Result<dzbf_db::BrandRow, ApiError> {
    dzbf_db::find_brand_by_slug(&state.pool, slug)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("brand '{slug}' not found")))
}

pub(super) async fn list_brands(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> ApiResult<Vec<BrandItem>> {
    let rows = dzbf_db::list_active_brands(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| BrandItem {
            id: row.id,
            name: row.name,
            slug: row.slug,
            logo_url: row
                .logo_url
                .as_deref()
                .map(|p| resolve_image_url(&state.config, p)),
            product_count: row.product_count,
        })
        .collect();

    Ok(Json(ApiResponse::new(req_id.0, data)))
}

pub(super) async fn get_brand(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> ApiResult<BrandDetail> {
    let row = brand_by_slug(&state, &req_id.0, &slug).await?;
    Ok(Json(ApiResponse::new(req_id.0, detail(&state, row))))
}

pub(super) async fn create_brand(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<CreateBrandBody>,
) -> ApiResult<BrandDetail> {
    let rid = req_id.0;
    let name = require_text(&rid, "name", &body.name, 120)?;
    let slug = match body.slug.as_deref() {
        Some(s) => require_text(&rid, "slug", s, 120)?,
        None => slug_from_name(&name),
    };
    if slug.is_empty() {
        return Err(ApiError::new(rid, "validation_error", "slug must not be empty"));
    }

    let row = dzbf_db::create_brand(
        &state.pool,
        dzbf_db::NewBrand {
            name: &name,
            slug: &slug,
            description: body.description.as_deref(),
            logo_url: body.logo_url.as_deref(),
            website_url: body.website_url.as_deref(),
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(admin = %admin.email, slug = %row.slug, "brand created");
    Ok(Json(ApiResponse::new(rid, detail(&state, row))))
}

pub(super) async fn update_brand(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Path(slug): Path<String>,
    Json(body): Json<UpdateBrandBody>,
) -> ApiResult<BrandDetail> {
    let rid = req_id.0;
    let existing = admin_brand_by_slug(&state, &rid, &slug).await?;
    let name = body
        .name
        .as_deref()
        .map(|n| require_text(&rid, "name", n, 120))
        .transpose()?;

    let row = dzbf_db::update_brand(
        &state.pool,
        existing.id,
        dzbf_db::BrandPatch {
            name: name.as_deref(),
            description: body.description.as_ref().map(|d| d.as_deref()),
            logo_url: body.logo_url.as_ref().map(|d| d.as_deref()),
            website_url: body.website_url.as_ref().map(|d| d.as_deref()),
            is_active: body.is_active,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(admin = %admin.email, slug = %row.slug, "brand updated");
    Ok(Json(ApiResponse::new(rid, detail(&state, row))))
}

pub(super) async fn deactivate_brand(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Path(slug): Path<String>,
) -> ApiResult<serde_json::Value> {
    let existing = admin_brand_by_slug(&state, &req_id.0, &slug).await?;
    dzbf_db::deactivate_brand(&state.pool, existing.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(admin = %admin.email, slug = %existing.slug, "brand deactivated");
    Ok(Json(ApiResponse::new(
        req_id.0,
        serde_json::json!({ "slug": existing.slug, "is_active": false }),
    )))
}
