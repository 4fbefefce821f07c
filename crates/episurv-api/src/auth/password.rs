/// Credential hashing and verification using Argon2id
///
/// One salted, memory-hard primitive serves two purposes:
/// - password storage for user accounts
/// - fingerprints of issued tokens in the session table (salted mode)
///
/// Output is a PHC string; the salt and parameters travel inside it, so
/// verification needs nothing but the string itself.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use episurv_core::AuthConfig;
use thiserror::Error;

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash secret: {0}")]
    HashingFailed(String),

    #[error("Hashing task failed: {0}")]
    TaskFailed(String),
}

/// Argon2id cost parameters
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Time cost (iterations)
    pub time_cost: u32,
    /// Parallelism (lanes)
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for PasswordConfig {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            memory_cost: auth.argon2_memory_kib,
            time_cost: auth.argon2_iterations,
            parallelism: auth.argon2_parallelism,
        }
    }
}

impl PasswordConfig {
    fn hasher(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(self.memory_cost, self.time_cost, self.parallelism, None)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;
        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }
}

/// Hash a secret with default parameters
///
/// Every call draws a fresh salt, so hashing the same secret twice yields
/// two different strings that both verify.
///
/// # Example
///
/// ```no_run
/// use episurv_api::auth::password::{hash_password, verify_password};
///
/// let hash = hash_password("admin123").expect("hashing failed");
/// assert!(verify_password("admin123", &hash));
/// ```
pub fn hash_password(secret: &str) -> Result<String, PasswordError> {
    hash_password_with_config(secret, &PasswordConfig::default())
}

/// Hash a secret with explicit Argon2 parameters
pub fn hash_password_with_config(
    secret: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = config
        .hasher()?
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(hash.to_string())
}

/// Verify a secret against a stored PHC string
///
/// Parameters come from the stored string, not from local config, so hashes
/// written under older settings keep verifying. A malformed stored value is
/// a mismatch, not an error.
pub fn verify_password(secret: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// [`hash_password_with_config`] on the blocking thread pool
pub async fn hash_password_async(
    secret: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let secret = secret.to_string();
    let config = config.clone();

    tokio::task::spawn_blocking(move || hash_password_with_config(&secret, &config))
        .await
        .map_err(|e| PasswordError::TaskFailed(e.to_string()))?
}

/// [`verify_password`] on the blocking thread pool
pub async fn verify_password_async(secret: &str, hash: &str) -> Result<bool, PasswordError> {
    let secret = secret.to_string();
    let hash = hash.to_string();

    tokio::task::spawn_blocking(move || verify_password(&secret, &hash))
        .await
        .map_err(|e| PasswordError::TaskFailed(e.to_string()))
}

#[cfg(test)]
pub(crate) fn test_config() -> PasswordConfig {
    PasswordConfig {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}
