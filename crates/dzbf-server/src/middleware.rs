use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::auth::hash_token;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The signed-in account behind a bearer token.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub id: i64,
    pub public_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: String,
    /// Hash of the presented token, kept so logout can revoke it.
    pub token_hash: String,
}

impl SessionUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == dzbf_db::ROLE_ADMIN
    }
}

/// Request extension set by [`resolve_session`] on every request.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<SessionUser>);

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter applied to write requests (anything but GET/HEAD/OPTIONS).
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_default()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Resolve the bearer token (if any) to a [`CurrentUser`].
///
/// Unknown or expired tokens leave the request anonymous; handlers that need
/// an account reject it through [`RequireUser`].
pub async fn resolve_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token_hash = extract_bearer_token(req.headers().get(AUTHORIZATION)).map(hash_token);

    let user = match token_hash {
        Some(token_hash) => match dzbf_db::find_session_user(&state.pool, &token_hash).await {
            Ok(Some(row)) => Some(SessionUser {
                id: row.id,
                public_id: row.public_id,
                email: row.email,
                full_name: row.full_name,
                phone: row.phone,
                role: row.role,
                token_hash,
            }),
            Ok(None) => {
                tracing::debug!("bearer token did not match a live session");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "session lookup failed");
                return ApiError::new(
                    request_id_of(&req),
                    "internal_error",
                    "session lookup failed",
                )
                .into_response();
            }
        },
        None => None,
    };

    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}

/// Middleware enforcing a fixed request-per-window limit on write requests.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(req).await;
    }

    let mut window = rate_limit.state.lock().await;
    let elapsed = window.started_at.elapsed();

    if elapsed >= rate_limit.window {
        window.started_at = Instant::now();
        window.count = 0;
    }

    if window.count >= rate_limit.max_requests {
        drop(window);
        return ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded")
            .into_response();
    }

    window.count += 1;
    drop(window);

    next.run(req).await
}

pub(crate) fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parts_request_id(parts: &Parts) -> String {
    parts
        .extensions
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_default()
}

fn parts_current_user(parts: &Parts) -> Option<SessionUser> {
    parts
        .extensions
        .get::<CurrentUser>()
        .and_then(|c| c.0.clone())
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts_current_user(parts)))
    }
}

/// Extractor that requires a signed-in user.
pub struct RequireUser(pub SessionUser);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts_current_user(parts).map(Self).ok_or_else(|| {
            ApiError::new(
                parts_request_id(parts),
                "unauthorized",
                "missing or invalid bearer token",
            )
        })
    }
}

/// Extractor that requires a signed-in user with the `admin` role.
pub struct RequireAdmin(pub SessionUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let rid = parts_request_id(parts);
        match parts_current_user(parts) {
            Some(user) if user.is_admin() => Ok(Self(user)),
            Some(_) => Err(ApiError::new(rid, "forbidden", "admin access required")),
            None => Err(ApiError::new(
                rid,
                "unauthorized",
                "missing or invalid bearer token",
            )),
        }
    }
}
