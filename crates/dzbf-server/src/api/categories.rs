use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use dzbf_core::slug_from_name;
use serde::{Deserialize, Serialize};

use crate::middleware::{RequestId, RequireAdmin};

use super::{
    double_option, map_db_error, require_text, resolve_image_url, ApiError, ApiResponse,
    ApiResult, AppState,
};

#[derive(Debug, Serialize)]
pub(super) struct CategoryItem {
    id: i64,
    name: String,
    slug: String,
    image_url: Option<String>,
    parent_slug: Option<String>,
    sort_order: i32,
    product_count: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct CategoryDetail {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
    image_url: Option<String>,
    parent_id: Option<i64>,
    sort_order: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateCategoryBody {
    name: String,
    slug: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    parent_id: Option<i64>,
    #[serde(default)]
    sort_order: i32,
}

#[allow(clippy::option_option)]
#[derive(Debug, Default, Deserialize)]
pub(super) struct UpdateCategoryBody {
    name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    image_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    parent_id: Option<Option<i64>>,
    sort_order: Option<i32>,
    is_active: Option<bool>,
}

fn detail(state: &AppState, row: dzbf_db::CategoryRow) -> CategoryDetail {
    CategoryDetail {
        id: row.id,
        name: row.name,
        slug: row.slug,
        description: row.description,
        image_url: row
            .image_url
            .as_deref()
            .map(|p| resolve_image_url(&state.config, p)),
        parent_id: row.parent_id,
        sort_order: row.sort_order,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

async fn category_by_slug(
    state: &AppState,
    rid: &str,
    slug: &str,
) -> Result<dzbf_db::CategoryRow, ApiError> {
    dzbf_db::get_category_by_slug(&state.pool, slug)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("category '{slug}' not found")))
}

async fn admin_category_by_slug(
    state: &AppState,
    rid: &str,
    slug: &str,
) -> Result<dzbf_db::CategoryRow, ApiError> {
    dzbf_db::find_category_by_slug(&state.pool, slug)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("category '{slug}' not found")))
}

pub(super) async fn list_categories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> ApiResult<Vec<CategoryItem>> {
    let rows = dzbf_db::list_active_categories(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| CategoryItem {
            id: row.id,
            name: row.name,
            slug: row.slug,
            image_url: row
                .image_url
                .as_deref()
                .map(|p| resolve_image_url(&state.config, p)),
            parent_slug: row.parent_slug,
            sort_order: row.sort_order,
            product_count: row.product_count,
        })
        .collect();

    Ok(Json(ApiResponse::new(req_id.0, data)))
}

pub(super) async fn get_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> ApiResult<CategoryDetail> {
    let row = category_by_slug(&state, &req_id.0, &slug).await?;
    Ok(Json(ApiResponse::new(req_id.0, detail(&state, row))))
}

pub(super) async fn create_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<CreateCategoryBody>,
) -> ApiResult<CategoryDetail> {
    let rid = req_id.0;
    let name = require_text(&rid, "name", &body.name, 120)?;
    let slug = match body.slug.as_deref() {
        Some(s) => require_text(&rid, "slug", s, 120)?,
        None => slug_from_name(&name),
    };
    if slug.is_empty() {
        return Err(ApiError::new(rid, "validation_error", "slug must not be empty"));
    }

    let row = dzbf_db::create_category(
        &state.pool,
        dzbf_db::NewCategory {
            name: &name,
            slug: &slug,
            description: body.description.as_deref(),
            image_url: body.image_url.as_deref(),
            parent_id: body.parent_id,
            sort_order: body.sort_order,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(admin = %admin.email, slug = %row.slug, "category created");
    Ok(Json(ApiResponse::new(rid, detail(&state, row))))
}

pub(super) async fn update_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Path(slug): Path<String>,
    Json(body): Json<UpdateCategoryBody>,
) -> ApiResult<CategoryDetail> {
    let rid = req_id.0;
    let existing = admin_category_by_slug(&state, &rid, &slug).await?;
    if body.parent_id == Some(Some(existing.id)) {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "a category cannot be its own parent",
        ));
    }
    let name = body
        .name
        .as_deref()
        .map(|n| require_text(&rid, "name", n, 120))
        .transpose()?;

    let row = dzbf_db::update_category(
        &state.pool,
        existing.id,
        dzbf_db::CategoryPatch {
            name: name.as_deref(),
            description: body.description.as_ref().map(|d| d.as_deref()),
            image_url: body.image_url.as_ref().map(|d| d.as_deref()),
            parent_id: body.parent_id,
            sort_order: body.sort_order,
            is_active: body.is_active,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(admin = %admin.email, slug = %row.slug, "category updated");
    Ok(Json(ApiResponse::new(rid, detail(&state, row))))
}

pub(super) async fn deactivate_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireAdmin(admin): RequireAdmin,
    Path(slug): Path<String>,
) -> ApiResult<serde_json::Value> {
    let existing = admin_category_by_slug(&state, &req_id.0, &slug).await?;
    dzbf_db::deactivate_category(&state.pool, existing.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(admin = %admin.email, slug = %existing.slug, "category deactivated");
    Ok(Json(ApiResponse::new(
        req_id.0,
        serde_json::json!({ "slug": existing.slug, "is_active": false }),
    )))
}
