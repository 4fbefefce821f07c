//! API route definitions

use crate::auth::middleware::{auth_middleware, require_roles};
use crate::handlers::{auth, probes};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use episurv_core::Role;
use std::sync::Arc;

const ANY_ROLE: &[Role] = &Role::ALL;
const ADMIN_ONLY: &[Role] = &[Role::Admin];
const RECORD_WRITERS: &[Role] = &[Role::Admin, Role::DataEntry];

/// Put `router` behind authentication and a role allow-list
///
/// Layers run outermost first: the token is verified before the role is
/// checked.
pub fn protected(
    state: &Arc<AppState>,
    router: Router<Arc<AppState>>,
    roles: &'static [Role],
) -> Router<Arc<AppState>> {
    router
        .route_layer(middleware::from_fn(require_roles(roles)))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
}

/// Create API v1 routes
pub fn api_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes; logout must answer even for expired tokens
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    let identity_routes = protected(
        state,
        Router::new().route("/auth/me", get(auth::me_handler)),
        ANY_ROLE,
    );

    let admin_routes = protected(
        state,
        Router::new().route("/admin/ping", get(probes::admin_ping)),
        ADMIN_ONLY,
    );

    let record_routes = protected(
        state,
        Router::new().route("/records/ping", get(probes::records_ping)),
        RECORD_WRITERS,
    );

    Router::new()
        .merge(public_routes)
        .merge(identity_routes)
        .merge(admin_routes)
        .merge(record_routes)
}
