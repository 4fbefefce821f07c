//! Authentication repository for PostgreSQL operations
//!
//! Database access for the auth core:
//! - user lookup (read-only, plus the bootstrap admin seed)
//! - session rows keyed by token fingerprint
//!
//! Every call borrows a pooled connection for the duration of its own
//! statement (or transaction) and returns it on every exit path.

use super::models::{Session, UserRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use episurv_core::{Role, User};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,
}

fn db_error(context: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::PoolTimedOut => RepositoryError::PoolExhausted,
        other => RepositoryError::DatabaseError(format!("{context}: {other}")),
    }
}

/// Read access to user accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by exact username
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepositoryError>;

    /// Create `user` unless an account with role `admin` already exists
    ///
    /// Returns whether a row was written.
    async fn seed_admin(&self, user: &User) -> Result<bool, RepositoryError>;
}

/// Storage for session rows
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), RepositoryError>;

    /// All sessions of a user, expired ones included
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Session>, RepositoryError>;

    async fn delete_by_ids(&self, ids: &[Uuid]) -> Result<u64, RepositoryError>;

    async fn delete_by_hash(&self, user_id: Uuid, token_hash: &str) -> Result<u64, RepositoryError>;

    async fn exists_active_by_hash(
        &self,
        user_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Remove rows whose window has elapsed
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// PostgreSQL user repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepositoryError> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, email, password_hash, full_name, role, is_active, created_at, updated_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch user", e))
    }

    async fn seed_admin(&self, user: &User) -> Result<bool, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let admins = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(Role::Admin.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to count admins", e))?;

        if admins > 0 {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, full_name, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (username) DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to insert admin", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit admin seed", e))?;

        // Zero when a non-admin account already holds the username
        Ok(result.rows_affected() == 1)
    }
}

/// PostgreSQL session repository
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn insert(&self, session: &Session) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to store session", e))?;

        Ok(())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Session>, RepositoryError> {
        sqlx::query_as::<_, Session>(
            "SELECT id, user_id, token_hash, expires_at, created_at FROM sessions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch sessions", e))
    }

    async fn delete_by_ids(&self, ids: &[Uuid]) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM sessions WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete sessions", e))?;

        Ok(result.rows_affected())
    }

    async fn delete_by_hash(&self, user_id: Uuid, token_hash: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND token_hash = $2")
            .bind(user_id)
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete session", e))?;

        Ok(result.rows_affected())
    }

    async fn exists_active_by_hash(
        &self,
        user_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM sessions WHERE user_id = $1 AND token_hash = $2 AND expires_at > $3)",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to check session", e))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to purge sessions", e))?;

        Ok(result.rows_affected())
    }
}

/// In-memory repositories for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use super::*;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct InMemoryUserRepository {
        users: RwLock<Vec<User>>,
    }

    impl InMemoryUserRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert(&self, user: User) {
            self.users.write().await.push(user);
        }
    }

    #[async_trait]
    impl UserRepository for InMemoryUserRepository {
        async fn find_by_username(
            &self,
            username: &str,
        ) -> Result<Option<UserRecord>, RepositoryError> {
            Ok(self
                .users
                .read()
                .await
                .iter()
                .find(|u| u.username == username)
                .map(|u| UserRecord {
                    id: u.id,
                    username: u.username.clone(),
                    email: u.email.clone(),
                    password_hash: u.password_hash.clone(),
                    full_name: u.full_name.clone(),
                    role: u.role.as_str().to_string(),
                    is_active: u.is_active,
                    created_at: u.created_at,
                    updated_at: u.updated_at,
                }))
        }

        async fn seed_admin(&self, user: &User) -> Result<bool, RepositoryError> {
            let mut users = self.users.write().await;
            if users.iter().any(|u| u.role.is_admin() || u.username == user.username) {
                return Ok(false);
            }
            users.push(user.clone());
            Ok(true)
        }
    }

    #[derive(Default)]
    pub struct InMemorySessionRepository {
        sessions: RwLock<Vec<Session>>,
    }

    impl InMemorySessionRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn all(&self) -> Vec<Session> {
            self.sessions.read().await.clone()
        }
    }

    #[async_trait]
    impl SessionRepository for InMemorySessionRepository {
        async fn insert(&self, session: &Session) -> Result<(), RepositoryError> {
            self.sessions.write().await.push(session.clone());
            Ok(())
        }

        async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Session>, RepositoryError> {
            Ok(self
                .sessions
                .read()
                .await
                .iter()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn delete_by_ids(&self, ids: &[Uuid]) -> Result<u64, RepositoryError> {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|s| !ids.contains(&s.id));
            Ok((before - sessions.len()) as u64)
        }

        async fn delete_by_hash(
            &self,
            user_id: Uuid,
            token_hash: &str,
        ) -> Result<u64, RepositoryError> {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|s| !(s.user_id == user_id && s.token_hash == token_hash));
            Ok((before - sessions.len()) as u64)
        }

        async fn exists_active_by_hash(
            &self,
            user_id: Uuid,
            token_hash: &str,
            now: DateTime<Utc>,
        ) -> Result<bool, RepositoryError> {
            Ok(self.sessions.read().await.iter().any(|s| {
                s.user_id == user_id && s.token_hash == token_hash && !s.is_expired_at(now)
            }))
        }

        async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|s| !s.is_expired_at(now));
            Ok((before - sessions.len()) as u64)
        }
    }
}
