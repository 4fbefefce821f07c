//! Authentication and authorization module
//!
//! - Credential hashing with Argon2
//! - Signed, expiring bearer tokens
//! - Session rows tracking issued tokens
//! - Middleware that authenticates requests and gates routes by role
//! - Repositories for PostgreSQL (and in-memory ones for tests)

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;
pub mod session;

pub use jwt::{extract_bearer, Claims, Identity, IssuedToken, JwtConfig, JwtError, TokenService};
pub use middleware::{auth_middleware, require_roles, AuthenticatedUser};
pub use models::{Session, UserRecord};
pub use password::{hash_password, verify_password, PasswordConfig, PasswordError};
pub use repository::{
    PgSessionRepository, PgUserRepository, RepositoryError, SessionRepository, UserRepository,
};
pub use service::{AuthService, LoginRequest, LoginResponse, LogoutResponse, RequestContext};
pub use session::{purge_period, spawn_purge_task, SessionError, SessionStore, TokenFingerprint};
