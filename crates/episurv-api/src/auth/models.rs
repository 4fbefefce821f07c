//! Database models for authentication
//!
//! - Session: one row per issued token, keyed by the token's fingerprint
//! - UserRecord: raw `users` row before the role string is validated
//!
//! These map to the tables in `migrations/0001_auth.sql`.

use chrono::{DateTime, Utc};
use episurv_core::{Role, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-side record of an issued token
///
/// Existence of the row means "issued and not logged out". `expires_at` is
/// fixed when the row is written and never extended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Fingerprint of the token string (never the token itself)
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid, token_hash: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash,
            expires_at,
            created_at: Utc::now(),
        }
    }

    /// Check whether the session window has elapsed
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// `users` row as stored
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = episurv_core::CoreError;

    fn try_from(row: UserRecord) -> Result<Self, Self::Error> {
        let role: Role = row.role.parse()?;
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            full_name: row.full_name,
            role,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
