//! Authentication service layer
//!
//! Login checks credentials, issues a token, and records its session.
//! Logout removes the session of the presented token and always succeeds.

use super::jwt::{Identity, JwtError, TokenService};
use super::password::{hash_password_async, verify_password_async, PasswordConfig};
use super::repository::UserRepository;
use super::session::SessionStore;
use crate::audit::{audit_log, AuditEvent};
use crate::error::AppError;
use episurv_core::{Role, User, UserPublic};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Login request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(custom(function = "not_blank", message = "username is required"))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Successful login response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub success: bool,
    pub user: UserPublic,
    /// Signed bearer token
    pub token: String,
    pub message: String,
}

/// Logout response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

impl Default for LogoutResponse {
    fn default() -> Self {
        Self {
            success: true,
            message: "Logged out successfully".to_string(),
        }
    }
}

/// Client details recorded with audit events
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

const DUMMY_SECRET: &str = "episurv-no-such-account";

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    sessions: SessionStore,
    password_config: PasswordConfig,
    dummy_hash: Arc<OnceCell<String>>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        sessions: SessionStore,
        password_config: PasswordConfig,
    ) -> Self {
        Self {
            users,
            tokens,
            sessions,
            password_config,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Login with username and password
    ///
    /// Unknown user, inactive account, unrecognized stored role, and wrong
    /// password all return the same [`AppError::InvalidCredentials`]; only
    /// the audit log records which one it was.
    pub async fn login(
        &self,
        request: LoginRequest,
        ctx: &RequestContext,
    ) -> Result<LoginResponse, AppError> {
        request.validate().map_err(|e| {
            AppError::Validation(first_validation_message(&e))
        })?;

        let user = match self.check_credentials(&request).await? {
            Ok(user) => user,
            Err(reason) => {
                audit_log(&AuditEvent::LoginFailure {
                    username: request.username.clone(),
                    reason: reason.to_string(),
                    ip_address: ctx.ip_address.clone(),
                    user_agent: ctx.user_agent.clone(),
                });
                return Err(AppError::InvalidCredentials);
            }
        };

        let identity = Identity {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
        };
        let issued = self.tokens.issue(&identity)?;

        self.sessions
            .create(user.id, &issued.token, issued.expires_at)
            .await?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });

        Ok(LoginResponse {
            success: true,
            user: user.to_public(),
            token: issued.token,
            message: "Login successful".to_string(),
        })
    }

    /// Outer `Result` is infrastructure failure; inner `Err` is the private
    /// reason a credential check failed.
    ///
    /// Every path runs exactly one Argon2 verification, against the dummy
    /// hash when there is no usable account, so response time does not
    /// reveal which usernames exist.
    async fn check_credentials(
        &self,
        request: &LoginRequest,
    ) -> Result<Result<User, &'static str>, AppError> {
        let candidate = match self.users.find_by_username(&request.username).await? {
            None => Err("unknown user"),
            Some(record) => match User::try_from(record) {
                Ok(user) if !user.is_active => Err("account inactive"),
                Ok(user) => Ok(user),
                Err(e) => {
                    tracing::warn!(username = %request.username, error = %e, "User has unrecognized role");
                    Err("unrecognized role")
                }
            },
        };

        let stored_hash = match &candidate {
            Ok(user) => user.password_hash.as_str(),
            Err(_) => self.dummy_hash().await?,
        };
        let password_matches = verify_password_async(&request.password, stored_hash).await?;

        Ok(match candidate {
            Ok(_) if !password_matches => Err("wrong password"),
            other => other,
        })
    }

    /// PHC string with the configured cost, hashed on first use
    async fn dummy_hash(&self) -> Result<&str, AppError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| hash_password_async(DUMMY_SECRET, &self.password_config))
            .await?;
        Ok(hash.as_str())
    }

    /// Logout by removing the session of the presented token
    ///
    /// Never fails. A missing, foreign, or already-revoked token is a no-op,
    /// and a storage failure is logged rather than returned. Expired tokens
    /// are accepted here so their rows can still be cleaned up.
    pub async fn logout(&self, token: Option<&str>, ctx: &RequestContext) -> LogoutResponse {
        let mut user_id = None;
        let mut removed = 0;

        if let Some(token) = token {
            let tokens = self.tokens.clone();
            let owned = token.to_string();
            let verified =
                tokio::task::spawn_blocking(move || tokens.verify_ignoring_expiry(&owned))
                    .await
                    .unwrap_or(Err(JwtError::Invalid));

            match verified {
                Ok(identity) => {
                    user_id = Some(identity.user_id);
                    match self.sessions.revoke(identity.user_id, token).await {
                        Ok(n) => removed = n,
                        Err(e) => {
                            tracing::warn!(user_id = %identity.user_id, error = %e, "Failed to revoke session");
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Logout with unverifiable token");
                }
            }
        }

        audit_log(&AuditEvent::Logout {
            user_id,
            sessions_removed: removed,
            ip_address: ctx.ip_address.clone(),
        });

        LogoutResponse::default()
    }

    /// Create the `admin` account if no admin exists yet
    ///
    /// Returns whether an account was created.
    pub async fn seed_admin(&self, password: &str) -> Result<bool, AppError> {
        let password_hash = hash_password_async(password, &self.password_config).await?;
        let admin = User::new(
            "admin",
            "admin@localhost",
            password_hash,
            "Administrator",
            Role::Admin,
        );

        let created = self.users.seed_admin(&admin).await?;
        if created {
            audit_log(&AuditEvent::AdminSeeded {
                user_id: admin.id,
                username: admin.username.clone(),
            });
        }
        Ok(created)
    }
}

fn first_validation_message(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "username and password are required".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::UserRecord;
    use crate::auth::repository::RepositoryError;
    use crate::testing::TestContext;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    /// Returns one account whose stored role no longer parses
    struct LegacyRoleUsers;

    #[async_trait]
    impl UserRepository for LegacyRoleUsers {
        async fn find_by_username(
            &self,
            username: &str,
        ) -> Result<Option<UserRecord>, RepositoryError> {
            let now = Utc::now();
            Ok(Some(UserRecord {
                id: uuid::Uuid::new_v4(),
                username: username.to_string(),
                email: format!("{username}@example.org"),
                password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$aGFzaA".to_string(),
                full_name: username.to_string(),
                role: "superuser".to_string(),
                is_active: true,
                created_at: now,
                updated_at: now,
            }))
        }

        async fn seed_admin(&self, _user: &User) -> Result<bool, RepositoryError> {
            Ok(false)
        }
    }

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_success_records_session() {
        let ctx = TestContext::new();
        ctx.add_user("admin", "admin123", Role::Admin, true).await;

        let response = ctx
            .state
            .auth
            .login(login("admin", "admin123"), &RequestContext::default())
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.user.role, Role::Admin);
        assert!(!response.token.is_empty());

        let identity = ctx.state.tokens.verify(&response.token).unwrap();
        assert_eq!(identity.user_id, response.user.id);

        let sessions = ctx.sessions.all().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].user_id, response.user.id);
        assert!(ctx
            .state
            .sessions
            .is_active(response.user.id, &response.token)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let ctx = TestContext::new();
        ctx.add_user("clerk", "right", Role::DataEntry, true).await;
        ctx.add_user("retired", "right", Role::Viewer, false).await;

        for (user, pass) in [("clerk", "wrong"), ("nobody", "right"), ("retired", "right")] {
            let err = ctx
                .state
                .auth
                .login(login(user, pass), &RequestContext::default())
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidCredentials), "{user}");
            assert_eq!(err.to_string(), "Invalid username or password");
        }
        assert!(ctx.sessions.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_login_missing_fields_is_validation_error() {
        let ctx = TestContext::new();
        for (user, pass) in [("", "x"), ("   ", "x"), ("admin", "")] {
            let err = ctx
                .state
                .auth
                .login(login(user, pass), &RequestContext::default())
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_concurrent_logins_create_independent_sessions() {
        let ctx = TestContext::new();
        ctx.add_user("vet", "pw", Role::DataEntry, true).await;

        let rc = RequestContext::default();
        let a = ctx.state.auth.login(login("vet", "pw"), &rc);
        let b = ctx.state.auth.login(login("vet", "pw"), &rc);
        let (a, b) = tokio::join!(a, b);
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.token, b.token);
        assert_eq!(ctx.sessions.all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_logout_revokes_and_is_idempotent() {
        let ctx = TestContext::new();
        ctx.add_user("admin", "admin123", Role::Admin, true).await;
        let response = ctx
            .state
            .auth
            .login(login("admin", "admin123"), &RequestContext::default())
            .await
            .unwrap();

        let out = ctx
            .state
            .auth
            .logout(Some(&response.token), &RequestContext::default())
            .await;
        assert!(out.success);
        assert!(ctx.sessions.all().await.is_empty());

        let again = ctx
            .state
            .auth
            .logout(Some(&response.token), &RequestContext::default())
            .await;
        assert!(again.success);
    }

    #[tokio::test]
    async fn test_logout_without_or_with_garbage_token_succeeds() {
        let ctx = TestContext::new();
        assert!(ctx.state.auth.logout(None, &RequestContext::default()).await.success);
        assert!(
            ctx.state
                .auth
                .logout(Some("not-a-token"), &RequestContext::default())
                .await
                .success
        );
    }

    #[tokio::test]
    async fn test_seed_admin_only_once() {
        let ctx = TestContext::new();
        assert!(ctx.state.auth.seed_admin("admin123").await.unwrap());
        assert!(!ctx.state.auth.seed_admin("other").await.unwrap());

        let response = ctx
            .state
            .auth
            .login(login("admin", "admin123"), &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(response.user.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_every_rejection_path_runs_a_verification() {
        // Unknown user and inactive account fall back to the dummy hash
        for (username, password) in [("nobody", "right"), ("retired", "right")] {
            let ctx = TestContext::new();
            ctx.add_user("retired", "right", Role::Viewer, false).await;
            assert!(!ctx.state.auth.dummy_hash.initialized());

            let err = ctx
                .state
                .auth
                .login(login(username, password), &RequestContext::default())
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidCredentials));
            assert!(ctx.state.auth.dummy_hash.initialized(), "{username}");
        }

        // Unparseable stored role
        let ctx = TestContext::new();
        let service = AuthService::new(
            Arc::new(LegacyRoleUsers),
            ctx.state.tokens.clone(),
            ctx.state.sessions.clone(),
            crate::auth::password::test_config(),
        );
        let err = service
            .login(login("legacy", "whatever"), &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
        assert!(service.dummy_hash.initialized());

        // Wrong password verifies against the account's own hash
        let ctx = TestContext::new();
        ctx.add_user("clerk", "right", Role::DataEntry, true).await;
        let err = ctx
            .state
            .auth
            .login(login("clerk", "wrong"), &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
        assert!(!ctx.state.auth.dummy_hash.initialized());
    }

    #[tokio::test]
    async fn test_logout_with_expired_token_cleans_up_session() {
        let ctx = TestContext::new();
        let user = ctx.add_user("admin", "admin123", Role::Admin, true).await;
        let identity = Identity {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
        };

        let ttl = ctx.state.tokens.ttl_secs() as i64;
        let issued = ctx
            .state
            .tokens
            .issue_at(&identity, Utc::now() - Duration::seconds(ttl + 60))
            .unwrap();
        assert!(ctx.state.tokens.verify(&issued.token).is_err());

        ctx.state
            .sessions
            .create(user.id, &issued.token, issued.expires_at)
            .await
            .unwrap();
        assert_eq!(ctx.sessions.all().await.len(), 1);

        let out = ctx
            .state
            .auth
            .logout(Some(&issued.token), &RequestContext::default())
            .await;
        assert!(out.success);
        assert!(ctx.sessions.all().await.is_empty());
    }
}
