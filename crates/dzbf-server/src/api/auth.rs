use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Duration, Utc};
use dzbf_core::{
    orders::{looks_like_email, normalize_phone},
    StockAdjustment,
};
use dzbf_db::UserRow;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{hash_password, hash_token, new_session_token, verify_password, MIN_PASSWORD_LENGTH};
use crate::middleware::{RequestId, RequireUser, SessionUser};

use super::{map_db_error, require_text, ApiError, ApiResponse, ApiResult, AppState};

const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, Serialize)]
pub(super) struct UserView {
    public_id: Uuid,
    email: String,
    full_name: String,
    phone: Option<String>,
    role: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SessionView {
    token: String,
    expires_at: DateTime<Utc>,
    user: UserView,
    /// Lines clamped while merging the anonymous cart into the account cart.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cart_adjustments: Vec<StockAdjustment>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RegisterBody {
    email: String,
    password: String,
    full_name: String,
    phone: Option<String>,
    cart_session_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginBody {
    email: String,
    password: String,
    cart_session_id: Option<Uuid>,
}

impl From<UserRow> for UserView {
    fn from(row: UserRow) -> Self {
        Self {
            public_id: row.public_id,
            email: row.email,
            full_name: row.full_name,
            phone: row.phone,
            role: row.role,
        }
    }
}

impl From<SessionUser> for UserView {
    fn from(user: SessionUser) -> Self {
        Self {
            public_id: user.public_id,
            email: user.email,
            full_name: user.full_name,
            phone: user.phone,
            role: user.role,
        }
    }
}

fn validate_password(rid: &str, password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&len) {
        return Err(ApiError::new(
            rid,
            "validation_error",
            format!("password must be {MIN_PASSWORD_LENGTH}-{MAX_PASSWORD_LENGTH} characters"),
        ));
    }
    Ok(())
}

/// Issue a session for `user`, folding in the anonymous cart when one is given.
async fn open_session(
    state: &AppState,
    rid: &str,
    user: UserRow,
    cart_session_id: Option<Uuid>,
) -> Result<SessionView, ApiError> {
    let token = new_session_token();
    let expires_at = Utc::now() + Duration::hours(state.config.session_ttl_hours);
    dzbf_db::create_session(&state.pool, user.id, &hash_token(&token), expires_at)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?;

    let cart_adjustments = match cart_session_id {
        Some(session_id) => dzbf_db::merge_session_cart_into_user(&state.pool, session_id, user.id)
            .await
            .map_err(|e| map_db_error(rid.to_owned(), &e))?,
        None => Vec::new(),
    };

    Ok(SessionView {
        token,
        expires_at,
        user: user.into(),
        cart_adjustments,
    })
}

pub(super) async fn register(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<SessionView> {
    let rid = req_id.0;
    let email = body.email.trim().to_lowercase();
    if !looks_like_email(&email) {
        return Err(ApiError::new(rid, "validation_error", "invalid email address"));
    }
    validate_password(&rid, &body.password)?;
    let full_name = require_text(&rid, "full_name", &body.full_name, 120)?;
    let phone = match body.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => Some(normalize_phone(raw).ok_or_else(|| {
            ApiError::new(
                rid.clone(),
                "validation_error",
                "phone must be an Algerian mobile number",
            )
        })?),
        None => None,
    };

    let password_hash = hash_password(&body.password).map_err(|e| {
        tracing::error!(error = %e, "password hashing failed");
        ApiError::new(rid.clone(), "internal_error", "could not create account")
    })?;

    let user = dzbf_db::create_user(
        &state.pool,
        dzbf_db::NewUser {
            email: &email,
            password_hash: &password_hash,
            full_name: &full_name,
            phone: phone.as_deref(),
        },
    )
    .await
    .map_err(|e| {
        if e.is_unique_violation() {
            ApiError::new(
                rid.clone(),
                "conflict",
                "an account with this email already exists",
            )
        } else {
            map_db_error(rid.clone(), &e)
        }
    })?;
    tracing::info!(user_id = user.id, "account registered");

    let session = open_session(&state, &rid, user, body.cart_session_id).await?;
    Ok(Json(ApiResponse::new(rid, session)))
}

pub(super) async fn login(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<LoginBody>,
) -> ApiResult<SessionView> {
    let rid = req_id.0;
    let user = dzbf_db::get_user_by_email(&state.pool, &body.email)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .filter(|u| verify_password(&body.password, &u.password_hash))
        .ok_or_else(|| {
            ApiError::new(rid.clone(), "unauthorized", "invalid email or password")
        })?;
    tracing::debug!(user_id = user.id, "login succeeded");

    let session = open_session(&state, &rid, user, body.cart_session_id).await?;
    Ok(Json(ApiResponse::new(rid, session)))
}

pub(super) async fn logout(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequireUser(user): RequireUser,
) -> ApiResult<serde_json::Value> {
    let revoked = dzbf_db::delete_session(&state.pool, &user.token_hash)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        req_id.0,
        serde_json::json!({ "revoked": revoked }),
    )))
}

pub(super) async fn me(
    Extension(req_id): Extension<RequestId>,
    RequireUser(user): RequireUser,
) -> ApiResult<UserView> {
    Ok(Json(ApiResponse::new(req_id.0, user.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_length_is_bounded() {
        assert!(validate_password("rid", "short").is_err());
        assert!(validate_password("rid", "long-enough").is_ok());
        assert!(validate_password("rid", &"x".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
    }
}
