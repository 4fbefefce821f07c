//! EpiSurv Core - Domain models and shared types
//!
//! This crate defines the abstractions shared by the EpiSurv services:
//! - Access roles and the authorization predicate
//! - User identity records
//! - Common error types
//! - Configuration management

pub mod config;

pub use config::{AppConfig, AuthConfig, ConfigError, DatabaseConfig, TokenFingerprintMode};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for EpiSurv operations
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================================================
// Roles
// ============================================================================

/// Access level assigned to a user account
///
/// The set is closed: a role string that does not parse into one of these
/// variants never authorizes anything.
/// - `Admin`: full access, including user administration
/// - `DataEntry`: write access to operational surveillance data
/// - `Viewer`: read-only access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    DataEntry,
    Viewer,
}

impl Role {
    /// Every role, in descending order of privilege
    pub const ALL: [Role; 3] = [Role::Admin, Role::DataEntry, Role::Viewer];

    /// Wire and storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::DataEntry => "data_entry",
            Role::Viewer => "viewer",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Whether the role may modify operational data
    pub fn can_write(&self) -> bool {
        matches!(self, Role::Admin | Role::DataEntry)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    /// Exact match on the storage representation; no case folding, so a
    /// mistyped role in the database is rejected instead of guessed.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Role::Admin),
            "data_entry" => Ok(Role::DataEntry),
            "viewer" => Ok(Role::Viewer),
            other => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}

/// Authorization predicate used by every role-restricted route
///
/// Membership only. `Admin` gets no implicit pass: a route that lists
/// `[DataEntry]` rejects an admin.
pub fn role_allowed(role: Role, allowed: &[Role]) -> bool {
    allowed.contains(&role)
}

// ============================================================================
// Users
// ============================================================================

/// User account record
///
/// Owned by user management; the auth core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string; never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new active user with fresh timestamps
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        full_name: impl Into<String>,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            full_name: full_name.into(),
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Convert to the representation returned by the API
    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Public user representation (safe for API responses)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_role_conversion() {
        assert_eq!(Role::Admin.as_str(), "admin");
        assert_eq!(Role::DataEntry.as_str(), "data_entry");
        assert_eq!(Role::Viewer.as_str(), "viewer");

        assert_eq!("data_entry".parse::<Role>().unwrap(), Role::DataEntry);
        assert!("ADMIN".parse::<Role>().is_err());
        assert!("editor".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_matches_storage_form() {
        for role in Role::ALL {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
        }
        assert!(serde_json::from_str::<Role>("\"superuser\"").is_err());
    }

    #[test]
    fn test_role_capabilities() {
        assert!(Role::Admin.is_admin());
        assert!(Role::Admin.can_write());
        assert!(Role::DataEntry.can_write());
        assert!(!Role::DataEntry.is_admin());
        assert!(!Role::Viewer.can_write());
    }

    #[test]
    fn test_role_allowed_has_no_admin_bypass() {
        assert!(role_allowed(Role::Admin, &[Role::Admin]));
        assert!(!role_allowed(Role::Admin, &[Role::DataEntry]));
        assert!(role_allowed(Role::Viewer, &[Role::DataEntry, Role::Viewer]));
        assert!(!role_allowed(Role::Viewer, &[]));
    }

    #[test]
    fn test_user_to_public_hides_hash() {
        let user = User::new(
            "admin",
            "admin@example.org",
            "$argon2id$secret",
            "Administrator",
            Role::Admin,
        );
        let public = user.to_public();

        assert_eq!(public.id, user.id);
        assert_eq!(public.role, Role::Admin);

        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("argon2"));
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
    }

    proptest! {
        #[test]
        fn unknown_role_strings_never_parse(s in "[a-z_]{0,12}") {
            prop_assume!(!matches!(s.as_str(), "admin" | "data_entry" | "viewer"));
            prop_assert!(s.parse::<Role>().is_err());
        }

        #[test]
        fn empty_allow_list_rejects_every_role(idx in 0usize..3) {
            prop_assert!(!role_allowed(Role::ALL[idx], &[]));
        }
    }
}
