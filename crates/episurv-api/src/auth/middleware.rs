/// Authentication middleware for protecting routes
///
/// `auth_middleware` turns a bearer token into an [`AuthenticatedUser`] in
/// the request extensions; `require_roles` then gates the route on the
/// user's role.
use super::jwt::{extract_bearer, Identity};
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use episurv_core::{role_allowed, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Identity of the caller, attached by [`auth_middleware`]
///
/// Handlers take it directly as an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

impl From<Identity> for AuthenticatedUser {
    fn from(identity: Identity) -> Self {
        Self {
            user_id: identity.user_id,
            username: identity.username,
            role: identity.role,
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AppError::MissingCredentials)
    }
}

/// Authentication middleware that requires a valid token
///
/// 1. Extracts the bearer token (absent → 401 `MISSING_CREDENTIALS`)
/// 2. Verifies signature, issuer, and expiry (failure → 401 `INVALID_TOKEN`)
/// 3. With session enforcement on, requires a live session row
/// 4. Adds [`AuthenticatedUser`] to request extensions
///
/// # Usage
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
/// use episurv_api::auth::middleware::auth_middleware;
///
/// let app = Router::new()
///     .route("/protected", get(protected_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let ip_address = extract_ip_address(request.headers());
    let user_agent = extract_user_agent(request.headers());

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(token) = extract_bearer(header_value).map(str::to_string) else {
        return Err(AppError::MissingCredentials);
    };

    let tokens = state.tokens.clone();
    let verify_token = token.clone();
    let verified = tokio::task::spawn_blocking(move || tokens.verify(&verify_token))
        .await
        .map_err(|e| AppError::Unexpected(format!("Token verification task failed: {e}")))?;

    let identity = match verified {
        Ok(identity) => identity,
        Err(e) => {
            audit_log(&AuditEvent::InvalidToken {
                ip_address,
                user_agent,
                reason: e.to_string(),
            });
            return Err(AppError::InvalidToken);
        }
    };

    if state.enforce_sessions() && !state.sessions.is_active(identity.user_id, &token).await? {
        audit_log(&AuditEvent::InvalidToken {
            ip_address,
            user_agent,
            reason: "No active session for token".to_string(),
        });
        return Err(AppError::InvalidToken);
    }

    request
        .extensions_mut()
        .insert(AuthenticatedUser::from(identity));

    Ok(next.run(request).await)
}

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AppError>> + Send>>;

/// Middleware factory for role-based access control
///
/// Must run after [`auth_middleware`]. Passes only callers whose role is in
/// `allowed`; there is no admin override.
///
/// # Example
///
/// ```ignore
/// use axum::{middleware, routing::post, Router};
/// use episurv_api::auth::middleware::{auth_middleware, require_roles};
/// use episurv_core::Role;
///
/// let app = Router::new()
///     .route("/surveys", post(create_survey))
///     .route_layer(middleware::from_fn(require_roles(&[Role::Admin, Role::DataEntry])))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub fn require_roles(
    allowed: &'static [Role],
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            let user = request
                .extensions()
                .get::<AuthenticatedUser>()
                .ok_or(AppError::MissingCredentials)?
                .clone();

            if !role_allowed(user.role, allowed) {
                audit_log(&AuditEvent::AccessDenied {
                    user_id: user.user_id,
                    username: user.username,
                    role: user.role,
                    required_roles: allowed.to_vec(),
                    resource: request.uri().path().to_string(),
                    ip_address: extract_ip_address(request.headers()),
                });

                return Err(AppError::InsufficientRole);
            }

            Ok(next.run(request).await)
        })
    }
}
