//! Server-side session tracking
//!
//! One row per issued token, holding a fingerprint of the token and the
//! expiry fixed at login. Logout deletes the row; when enforcement is on,
//! the middleware also requires the row to exist.

use super::models::Session;
use super::password::{hash_password_async, verify_password_async, PasswordConfig, PasswordError};
use super::repository::{RepositoryError, SessionRepository};
use chrono::{DateTime, Utc};
use episurv_core::{AuthConfig, TokenFingerprintMode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Session store errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Failed to fingerprint token: {0}")]
    Fingerprint(#[from] PasswordError),
}

/// How a token string is turned into its stored `token_hash`
#[derive(Clone)]
pub enum TokenFingerprint {
    /// Salted Argon2 PHC string; matching requires verifying row by row
    Salted(PasswordConfig),
    /// HMAC-SHA256 under a server key, hex encoded; matching is equality
    Keyed(Vec<u8>),
}

impl TokenFingerprint {
    pub fn from_config(auth: &AuthConfig) -> Self {
        match auth.token_fingerprint {
            TokenFingerprintMode::Salted => Self::Salted(PasswordConfig::from(auth)),
            TokenFingerprintMode::Keyed => Self::Keyed(auth.jwt_secret.as_bytes().to_vec()),
        }
    }

    async fn fingerprint(&self, token: &str) -> Result<String, SessionError> {
        match self {
            Self::Salted(config) => Ok(hash_password_async(token, config).await?),
            Self::Keyed(key) => Ok(keyed_digest(key, token)),
        }
    }
}

fn keyed_digest(key: &[u8], token: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Records, checks, and revokes sessions for issued tokens
#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    fingerprint: TokenFingerprint,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>, fingerprint: TokenFingerprint) -> Self {
        Self { repo, fingerprint }
    }

    /// Record a session for a freshly issued token
    ///
    /// Other sessions of the same user are left alone.
    pub async fn create(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        let token_hash = self.fingerprint.fingerprint(token).await?;
        let session = Session::new(user_id, token_hash, expires_at);
        self.repo.insert(&session).await?;

        tracing::debug!(session_id = %session.id, user_id = %user_id, "Session created");
        Ok(session)
    }

    /// Delete every session of `user_id` that belongs to `token`
    ///
    /// Returns the number of rows removed; zero is not an error.
    pub async fn revoke(&self, user_id: Uuid, token: &str) -> Result<u64, SessionError> {
        let removed = match &self.fingerprint {
            TokenFingerprint::Keyed(key) => {
                self.repo
                    .delete_by_hash(user_id, &keyed_digest(key, token))
                    .await?
            }
            TokenFingerprint::Salted(_) => {
                let ids: Vec<Uuid> = self
                    .matching_sessions(user_id, token)
                    .await?
                    .into_iter()
                    .map(|s| s.id)
                    .collect();
                self.repo.delete_by_ids(&ids).await?
            }
        };

        tracing::debug!(user_id = %user_id, removed, "Sessions revoked");
        Ok(removed)
    }

    /// Whether an unexpired session exists for `token`
    pub async fn is_active(&self, user_id: Uuid, token: &str) -> Result<bool, SessionError> {
        let now = Utc::now();
        match &self.fingerprint {
            TokenFingerprint::Keyed(key) => Ok(self
                .repo
                .exists_active_by_hash(user_id, &keyed_digest(key, token), now)
                .await?),
            TokenFingerprint::Salted(_) => Ok(self
                .matching_sessions(user_id, token)
                .await?
                .iter()
                .any(|s| !s.is_expired_at(now))),
        }
    }

    /// Delete all sessions whose window has elapsed
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        Ok(self.repo.delete_expired(Utc::now()).await?)
    }

    async fn matching_sessions(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> Result<Vec<Session>, SessionError> {
        let mut matches = Vec::new();
        for session in self.repo.find_by_user(user_id).await? {
            if verify_password_async(token, &session.token_hash).await? {
                matches.push(session);
            }
        }
        Ok(matches)
    }
}

/// Purge period from config; `None` when purging is disabled (interval 0)
pub fn purge_period(auth: &AuthConfig) -> Option<Duration> {
    match auth.purge_interval_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

/// Run [`SessionStore::purge_expired`] every `period` until the task is aborted
pub fn spawn_purge_task(store: SessionStore, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Purged expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session purge failed"),
            }
        }
    })
}
