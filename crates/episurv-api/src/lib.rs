//! EpiSurv API - authentication core and HTTP surface
//!
//! Credential hashing, token issuance, session tracking, and the middleware
//! that gates every protected route by role.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use crate::error::{ApiError, AppError};
use crate::state::AppState;
use axum::{
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(title = "EpiSurv API", description = "Authentication and access control"),
    paths(
        handlers::auth::login_handler,
        handlers::auth::logout_handler,
        handlers::auth::me_handler,
        handlers::probes::admin_ping,
        handlers::probes::records_ping,
    ),
    components(schemas(
        auth::LoginRequest,
        auth::LoginResponse,
        auth::LogoutResponse,
        handlers::auth::MeResponse,
        handlers::probes::PingResponse,
        episurv_core::UserPublic,
        episurv_core::Role,
        ApiError,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Login, logout, and identity"),
        (name = "probes", description = "Role-gated probes"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");

    AppError::Unexpected(format!("Handler panicked: {detail}")).into_response()
}

/// Build the application router over `state`
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(&state))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// Router over in-memory repositories, for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    testing::TestContext::new().router()
}

/// Test fixtures: in-memory state and cheap hashing parameters
#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use crate::auth::password::{hash_password_with_config, PasswordConfig};
    use crate::auth::repository::memory::{InMemorySessionRepository, InMemoryUserRepository};
    use crate::state::AppState;
    use axum::Router;
    use episurv_core::{AppConfig, Role, User};
    use std::sync::Arc;

    /// Default config with Argon2 costs low enough for tests
    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.argon2_memory_kib = 1024;
        config.auth.argon2_iterations = 1;
        config.auth.argon2_parallelism = 1;
        config
    }

    pub struct TestContext {
        pub state: Arc<AppState>,
        pub users: Arc<InMemoryUserRepository>,
        pub sessions: Arc<InMemorySessionRepository>,
    }

    impl TestContext {
        pub fn new() -> Self {
            Self::with_config(test_config())
        }

        pub fn with_config(config: AppConfig) -> Self {
            let users = Arc::new(InMemoryUserRepository::new());
            let sessions = Arc::new(InMemorySessionRepository::new());
            let state = Arc::new(AppState::with_repositories(
                config,
                users.clone(),
                sessions.clone(),
            ));

            Self {
                state,
                users,
                sessions,
            }
        }

        /// Insert a user whose password hashes to `password`
        pub async fn add_user(
            &self,
            username: &str,
            password: &str,
            role: Role,
            active: bool,
        ) -> User {
            let hash = hash_password_with_config(
                password,
                &PasswordConfig::from(&self.state.config.auth),
            )
            .expect("hashing test password");

            let mut user = User::new(
                username,
                format!("{username}@example.org"),
                hash,
                username,
                role,
            );
            user.is_active = active;
            self.users.insert(user.clone()).await;
            user
        }

        pub fn router(&self) -> Router {
            crate::create_router(self.state.clone())
        }
    }

    impl Default for TestContext {
        fn default() -> Self {
            Self::new()
        }
    }
}
