//! Authentication API handlers
//!
//! Login, logout, and the caller's own identity.

use crate::audit::{extract_ip_address, extract_user_agent};
use crate::auth::{extract_bearer, AuthenticatedUser, LoginRequest, LoginResponse, LogoutResponse, RequestContext};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    Json,
};
use episurv_core::Role;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Identity of the current caller
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub success: bool,
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext {
        ip_address: extract_ip_address(headers),
        user_agent: extract_user_agent(headers),
    }
}

/// Login with username and password
///
/// Issues a bearer token valid for the configured session window and records
/// a session for it.
///
/// # Responses
///
/// * `200 OK` - Authentication successful, returns token and user
/// * `400 Bad Request` - Missing fields or malformed body
/// * `401 Unauthorized` - Invalid credentials
/// * `500 Internal Server Error` - Server error
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
        (status = 503, description = "Storage temporarily unavailable", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let response = state.auth.login(request, &request_context(&headers)).await?;

    Ok(Json(response))
}

/// Logout current session
///
/// Removes the session of the presented token. Always succeeds, including
/// without a token or with an expired one.
///
/// # Responses
///
/// * `200 OK` - Logout acknowledged
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout acknowledged", body = LogoutResponse),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<LogoutResponse> {
    let token = extract_bearer(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    );

    Json(state.auth.logout(token, &request_context(&headers)).await)
}

/// Get current user identity
///
/// # Responses
///
/// * `200 OK` - Identity carried by the token
/// * `401 Unauthorized` - Invalid or missing authentication
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(user: AuthenticatedUser) -> Json<MeResponse> {
    Json(MeResponse {
        success: true,
        user_id: user.user_id,
        username: user.username,
        role: user.role,
    })
}
