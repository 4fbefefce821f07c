//! Application state management

use crate::auth::jwt::{JwtConfig, TokenService};
use crate::auth::password::PasswordConfig;
use crate::auth::repository::{
    PgSessionRepository, PgUserRepository, SessionRepository, UserRepository,
};
use crate::auth::service::AuthService;
use crate::auth::session::{SessionStore, TokenFingerprint};
use episurv_core::config::AppConfig;
use sqlx::PgPool;
use std::sync::Arc;

/// Application state shared across handlers
///
/// Built once at startup. Nothing in here is mutated afterwards.
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Token issuance and verification
    pub tokens: Arc<TokenService>,
    /// Session bookkeeping
    pub sessions: SessionStore,
    /// Login and logout orchestration
    pub auth: AuthService,
}

impl AppState {
    /// Build state backed by PostgreSQL
    pub fn new(config: AppConfig, pool: PgPool) -> Self {
        let users = Arc::new(PgUserRepository::new(pool.clone()));
        let sessions = Arc::new(PgSessionRepository::new(pool));
        Self::with_repositories(config, users, sessions)
    }

    /// Build state over arbitrary repositories
    pub fn with_repositories(
        config: AppConfig,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(JwtConfig::from(&config.auth)));
        let sessions = SessionStore::new(sessions, TokenFingerprint::from_config(&config.auth));
        let auth = AuthService::new(
            users,
            tokens.clone(),
            sessions.clone(),
            PasswordConfig::from(&config.auth),
        );

        Self {
            config,
            tokens,
            sessions,
            auth,
        }
    }

    /// Whether protected requests must also match a live session row
    pub fn enforce_sessions(&self) -> bool {
        self.config.auth.enforce_sessions
    }
}
