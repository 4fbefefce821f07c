//! Security audit logging for authentication events
//!
//! Every login, logout, token rejection, and role denial is logged at INFO
//! with the "audit" target so it can be routed away from application logs
//! (`RUST_LOG=audit=info`).
//!
//! # Example
//!
//! ```ignore
//! use episurv_api::audit::{audit_log, AuditEvent};
//!
//! audit_log(&AuditEvent::LoginFailure {
//!     username: "admin".to_string(),
//!     reason: "wrong password".to_string(),
//!     ip_address: Some("192.168.1.1".to_string()),
//!     user_agent: None,
//! });
//! ```

use chrono::Utc;
use episurv_core::Role;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful login; a session row was written
    LoginSuccess {
        user_id: Uuid,
        username: String,
        role: Role,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Failed login. `reason` is internal only; the caller always sees the
    /// same generic message.
    LoginFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Logout request, whether or not a session matched
    Logout {
        user_id: Option<Uuid>,
        sessions_removed: u64,
        ip_address: Option<String>,
    },

    /// Missing, malformed, expired, forged, or revoked token
    InvalidToken {
        ip_address: Option<String>,
        user_agent: Option<String>,
        reason: String,
    },

    /// Valid identity whose role is not on the route's allow-list
    AccessDenied {
        user_id: Uuid,
        username: String,
        role: Role,
        required_roles: Vec<Role>,
        resource: String,
        ip_address: Option<String>,
    },

    /// Bootstrap created the initial admin account
    AdminSeeded { user_id: Uuid, username: String },
}

/// Log a security audit event with structured fields
///
/// The whole event is also attached as JSON under `event` for log
/// aggregators.
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::LoginSuccess {
            user_id,
            username,
            role,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                username = %username,
                role = %role,
                ip_address = ?ip_address,
                "Login successful"
            );
        }
        AuditEvent::LoginFailure {
            username,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                reason = %reason,
                ip_address = ?ip_address,
                "Login failed"
            );
        }
        AuditEvent::Logout {
            user_id,
            sessions_removed,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = ?user_id,
                sessions_removed = %sessions_removed,
                ip_address = ?ip_address,
                "User logout"
            );
        }
        AuditEvent::InvalidToken {
            ip_address, reason, ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                ip_address = ?ip_address,
                reason = %reason,
                "Invalid token"
            );
        }
        AuditEvent::AccessDenied {
            user_id,
            username,
            role,
            resource,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                username = %username,
                role = %role,
                resource = %resource,
                ip_address = ?ip_address,
                "Access denied"
            );
        }
        AuditEvent::AdminSeeded { user_id, username } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                username = %username,
                "Bootstrap admin created"
            );
        }
    }
}

/// Extract the client IP from proxy headers
///
/// Checks X-Forwarded-For (first hop), then X-Real-IP.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .map(|s| s.to_string())
}

pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
