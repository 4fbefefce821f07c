//! Role-gated probe endpoints
//!
//! Stand-ins for the admin and record-entry route groups. They answer with
//! the caller's identity so a client can confirm the gate let it through.

use crate::auth::AuthenticatedUser;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PingResponse {
    pub success: bool,
    pub area: String,
    pub username: String,
}

fn pong(area: &str, user: AuthenticatedUser) -> Json<PingResponse> {
    Json(PingResponse {
        success: true,
        area: area.to_string(),
        username: user.username,
    })
}

/// Admin area probe
#[utoipa::path(
    get,
    path = "/api/v1/admin/ping",
    tag = "probes",
    responses(
        (status = 200, description = "Caller is an admin", body = PingResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Insufficient role", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn admin_ping(user: AuthenticatedUser) -> Json<PingResponse> {
    pong("admin", user)
}

/// Record entry area probe
#[utoipa::path(
    get,
    path = "/api/v1/records/ping",
    tag = "probes",
    responses(
        (status = 200, description = "Caller may enter records", body = PingResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Insufficient role", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn records_ping(user: AuthenticatedUser) -> Json<PingResponse> {
    pong("records", user)
}
