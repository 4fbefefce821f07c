//! API error handling
//!
//! Every failure leaves the API as `{success: false, code, message}` with a
//! stable status code. Internal details are logged, never returned.

use crate::auth::jwt::JwtError;
use crate::auth::password::PasswordError;
use crate::auth::repository::RepositoryError;
use crate::auth::session::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// API error response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Always `false`
    pub success: bool,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown user, inactive user, or wrong password
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Invalid or expired credentials")]
    InvalidToken,

    #[error("Insufficient privilege")]
    InsufficientRole,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Service temporarily unavailable")]
    ServiceUnavailable,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials
            | AppError::MissingCredentials
            | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::InsufficientRole => StatusCode::FORBIDDEN,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Storage(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::MissingCredentials => "MISSING_CREDENTIALS",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::InsufficientRole => "INSUFFICIENT_ROLE",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            AppError::Unexpected(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Storage(detail) => {
                tracing::error!(error = %detail, "Storage failure");
                "A storage error occurred".to_string()
            }
            AppError::Unexpected(detail) => {
                tracing::error!(error = %detail, "Unexpected failure");
                "Internal server error".to_string()
            }
            AppError::ServiceUnavailable => {
                tracing::warn!("Storage pool exhausted, asking client to retry");
                self.to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ApiError::new(self.code(), message))).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::PoolExhausted => AppError::ServiceUnavailable,
            RepositoryError::DatabaseError(msg) => AppError::Storage(msg),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Repository(e) => e.into(),
            SessionError::Fingerprint(e) => e.into(),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Unexpected(err.to_string())
    }
}

impl From<JwtError> for AppError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::EncodingError(e) => AppError::Unexpected(format!("Failed to sign token: {e}")),
            _ => AppError::InvalidToken,
        }
    }
}
