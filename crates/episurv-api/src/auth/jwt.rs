//! Token issuance and verification
//!
//! Tokens are HS256-signed JWTs carrying the caller's identity and role.
//! Their lifetime is the configured session TTL, the same value that bounds
//! the session row written at login.

use chrono::{DateTime, TimeZone, Utc};
use episurv_core::{AuthConfig, Role};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Claims embedded in every issued token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// Unique token identifier
    pub jti: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
    pub username: String,
    pub role: Role,
}

/// The identity a token asserts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

/// A freshly signed token together with its absolute expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Token errors
///
/// Verification failures are routine input, not faults; callers map all of
/// them to 401.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Malformed token")]
    Malformed,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Invalid token")]
    Invalid,
}

/// Token signing settings
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC secret
    pub secret: String,
    /// Lifetime of issued tokens in seconds
    pub ttl_secs: u64,
    /// Issuer claim written and required
    pub issuer: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            secret: auth.jwt_secret.clone(),
            ttl_secs: auth.session_ttl_secs,
            issuer: auth.issuer.clone(),
        }
    }
}

/// Issues and verifies signed tokens
///
/// Keys are derived once; the service is immutable after construction and
/// shared across requests behind an `Arc`.
#[derive(Clone)]
pub struct TokenService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.config.ttl_secs
    }

    /// Sign a token for `identity`, valid for the configured TTL
    pub fn issue(&self, identity: &Identity) -> Result<IssuedToken, JwtError> {
        self.issue_at(identity, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, JwtError> {
        let iat = now.timestamp();
        let exp = iat.saturating_add(i64::try_from(self.config.ttl_secs).unwrap_or(i64::MAX));

        let claims = Claims {
            iss: self.config.issuer.clone(),
            sub: identity.user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat,
            exp,
            username: identity.username.clone(),
            role: identity.role,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(IssuedToken {
            token,
            issued_at: seconds_to_utc(iat),
            expires_at: seconds_to_utc(exp),
        })
    }

    /// Verify signature, issuer, and expiry; return the asserted identity
    pub fn verify(&self, token: &str) -> Result<Identity, JwtError> {
        let claims = self.decode_claims(token, true)?;
        identity_from_claims(&claims)
    }

    /// Like [`TokenService::verify`] but accepts expired tokens
    ///
    /// The signature is still checked, so the returned identity is one this
    /// server asserted at some point. Only logout uses this, to find the
    /// sessions of the token's owner.
    pub fn verify_ignoring_expiry(&self, token: &str) -> Result<Identity, JwtError> {
        let claims = self.decode_claims(token, false)?;
        identity_from_claims(&claims)
    }

    fn decode_claims(&self, token: &str, check_expiry: bool) -> Result<Claims, JwtError> {
        if !is_well_formed(token) {
            return Err(JwtError::Malformed);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = check_expiry;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                _ => JwtError::Invalid,
            }
        })?;

        Ok(data.claims)
    }
}

fn identity_from_claims(claims: &Claims) -> Result<Identity, JwtError> {
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| JwtError::Invalid)?;
    Ok(Identity {
        user_id,
        username: claims.username.clone(),
        role: claims.role,
    })
}

fn seconds_to_utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Cheap structural check: three non-empty base64url segments
fn is_well_formed(token: &str) -> bool {
    let mut segments = 0;
    for segment in token.split('.') {
        segments += 1;
        if segments > 3
            || segment.is_empty()
            || !segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return false;
        }
    }
    segments == 3
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
///
/// The scheme is matched case-insensitively and may be followed by any run
/// of spaces. Anything else (absent header, other schemes, a bare `Bearer`,
/// an empty token, whitespace inside the token) yields `None`.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}
