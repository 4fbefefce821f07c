//! API Integration Tests
//!
//! Run the full router over in-memory repositories.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use episurv_api::auth::{AuthenticatedUser, Claims};
use episurv_api::routes::protected;
use episurv_api::testing::{test_config, TestContext};
use episurv_api::create_router_for_testing;
use episurv_core::Role;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Seed the reference admin and log in, returning the token
async fn admin_login(ctx: &TestContext) -> String {
    ctx.add_user("admin", "admin123", Role::Admin, true).await;

    let response = ctx
        .router()
        .oneshot(create_json_request(
            "POST",
            "/api/v1/auth/login",
            Some(json!({"username": "admin", "password": "admin123"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string()
}

// =============================================================================
// Login Tests
// =============================================================================

#[tokio::test]
async fn test_login_success() {
    let ctx = TestContext::new();
    ctx.add_user("admin", "admin123", Role::Admin, true).await;

    let response = ctx
        .router()
        .oneshot(create_json_request(
            "POST",
            "/api/v1/auth/login",
            Some(json!({"username": "admin", "password": "admin123"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["user"]["role"], "admin");
    assert_eq!(json["user"]["username"], "admin");
    assert!(json["user"].get("password_hash").is_none());
    assert!(!json["token"].as_str().unwrap().is_empty());

    assert_eq!(ctx.sessions.all().await.len(), 1);
}

#[tokio::test]
async fn test_login_rejections_share_one_message() {
    let ctx = TestContext::new();
    ctx.add_user("admin", "admin123", Role::Admin, true).await;
    ctx.add_user("former", "secret", Role::Viewer, false).await;

    let attempts = [
        json!({"username": "admin", "password": "wrong"}),
        json!({"username": "ghost", "password": "admin123"}),
        json!({"username": "former", "password": "secret"}),
    ];

    let mut bodies = Vec::new();
    for attempt in attempts {
        let response = ctx
            .router()
            .oneshot(create_json_request("POST", "/api/v1/auth/login", Some(attempt)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(body_json(response).await);
    }

    for body in &bodies {
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
        assert_eq!(body["message"], "Invalid username or password");
    }
    assert!(ctx.sessions.all().await.is_empty());
}

#[tokio::test]
async fn test_login_missing_fields() {
    let app = create_router_for_testing();

    for body in [
        json!({}),
        json!({"username": "admin"}),
        json!({"password": "admin123"}),
        json!({"username": "  ", "password": "admin123"}),
    ] {
        let response = app
            .clone()
            .oneshot(create_json_request("POST", "/api/v1/auth/login", Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn test_login_malformed_json() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from("{invalid json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["success"], false);
}

// =============================================================================
// Authorization Tests
// =============================================================================

#[tokio::test]
async fn test_protected_route_without_token() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(create_json_request("GET", "/api/v1/auth/me", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "MISSING_CREDENTIALS");
}

#[tokio::test]
async fn test_protected_route_with_garbage_token() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(bearer_request("GET", "/api/v1/auth/me", "not.a.jwt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let ctx = TestContext::new();
    let auth = &ctx.state.config.auth;
    let now = chrono::Utc::now().timestamp();

    let claims = Claims {
        iss: auth.issuer.clone(),
        sub: Uuid::new_v4().to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now - 3600,
        exp: now - 60,
        username: "admin".to_string(),
        role: Role::Admin,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .unwrap();

    let response = ctx
        .router()
        .oneshot(bearer_request("GET", "/api/v1/admin/ping", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_admin_reaches_admin_and_records_routes() {
    let ctx = TestContext::new();
    let token = admin_login(&ctx).await;

    for uri in ["/api/v1/admin/ping", "/api/v1/records/ping", "/api/v1/auth/me"] {
        let response = ctx
            .router()
            .oneshot(bearer_request("GET", uri, &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }
}

#[tokio::test]
async fn test_me_returns_identity_from_token() {
    let ctx = TestContext::new();
    let token = admin_login(&ctx).await;

    let response = ctx
        .router()
        .oneshot(bearer_request("GET", "/api/v1/auth/me", &token))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["username"], "admin");
    assert_eq!(json["role"], "admin");
}

#[tokio::test]
async fn test_role_allow_lists() {
    let ctx = TestContext::new();
    ctx.add_user("clerk", "clerk-pw", Role::DataEntry, true).await;
    ctx.add_user("reader", "reader-pw", Role::Viewer, true).await;

    let login = |username: &'static str, password: &'static str| {
        let app = ctx.router();
        async move {
            let response = app
                .oneshot(create_json_request(
                    "POST",
                    "/api/v1/auth/login",
                    Some(json!({"username": username, "password": password})),
                ))
                .await
                .unwrap();
            body_json(response).await["token"]
                .as_str()
                .unwrap()
                .to_string()
        }
    };
    let clerk = login("clerk", "clerk-pw").await;
    let reader = login("reader", "reader-pw").await;

    let cases = [
        (&clerk, "/api/v1/records/ping", StatusCode::OK),
        (&clerk, "/api/v1/admin/ping", StatusCode::FORBIDDEN),
        (&reader, "/api/v1/records/ping", StatusCode::FORBIDDEN),
        (&reader, "/api/v1/admin/ping", StatusCode::FORBIDDEN),
        (&reader, "/api/v1/auth/me", StatusCode::OK),
    ];

    for (token, uri, expected) in cases {
        let response = ctx
            .router()
            .oneshot(bearer_request("GET", uri, token))
            .await
            .unwrap();
        assert_eq!(response.status(), expected, "{uri}");
        if expected == StatusCode::FORBIDDEN {
            assert_eq!(body_json(response).await["code"], "INSUFFICIENT_ROLE");
        }
    }
}

#[tokio::test]
async fn test_admin_has_no_implicit_pass() {
    let ctx = TestContext::new();
    let token = admin_login(&ctx).await;

    async fn entry(user: AuthenticatedUser) -> String {
        user.username
    }

    let app: Router = protected(
        &ctx.state,
        Router::new().route("/entry", get(entry)),
        &[Role::DataEntry],
    )
    .with_state(ctx.state.clone());

    let response = app
        .oneshot(bearer_request("GET", "/entry", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Logout Tests
// =============================================================================

#[tokio::test]
async fn test_logout_removes_session() {
    let ctx = TestContext::new();
    let token = admin_login(&ctx).await;
    assert_eq!(ctx.sessions.all().await.len(), 1);

    let response = ctx
        .router()
        .oneshot(bearer_request("POST", "/api/v1/auth/logout", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);
    assert!(ctx.sessions.all().await.is_empty());

    // Second logout with the same token is still a success
    let response = ctx
        .router()
        .oneshot(bearer_request("POST", "/api/v1/auth/logout", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_without_token_succeeds() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(create_json_request("POST", "/api/v1/auth/logout", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);
}

#[tokio::test]
async fn test_logout_leaves_other_sessions() {
    let ctx = TestContext::new();
    let first = admin_login(&ctx).await;

    let response = ctx
        .router()
        .oneshot(create_json_request(
            "POST",
            "/api/v1/auth/login",
            Some(json!({"username": "admin", "password": "admin123"})),
        ))
        .await
        .unwrap();
    let second = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(first, second);
    assert_eq!(ctx.sessions.all().await.len(), 2);

    ctx.router()
        .oneshot(bearer_request("POST", "/api/v1/auth/logout", &first))
        .await
        .unwrap();

    assert_eq!(ctx.sessions.all().await.len(), 1);
}

#[tokio::test]
async fn test_token_still_valid_after_logout_when_sessions_not_enforced() {
    let ctx = TestContext::new();
    let token = admin_login(&ctx).await;

    ctx.router()
        .oneshot(bearer_request("POST", "/api/v1/auth/logout", &token))
        .await
        .unwrap();

    let response = ctx
        .router()
        .oneshot(bearer_request("GET", "/api/v1/admin/ping", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_rejected_after_logout_when_sessions_enforced() {
    let mut config = test_config();
    config.auth.enforce_sessions = true;
    let ctx = TestContext::with_config(config);
    let token = admin_login(&ctx).await;

    let response = ctx
        .router()
        .oneshot(bearer_request("GET", "/api/v1/admin/ping", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    ctx.router()
        .oneshot(bearer_request("POST", "/api/v1/auth/logout", &token))
        .await
        .unwrap();

    let response = ctx
        .router()
        .oneshot(bearer_request("GET", "/api/v1/admin/ping", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "INVALID_TOKEN");
}

// =============================================================================
// OpenAPI Tests
// =============================================================================

#[tokio::test]
async fn test_openapi_spec_available() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["openapi"].is_string());
    assert!(json["paths"]["/api/v1/auth/logout"].is_object());
}
