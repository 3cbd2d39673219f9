use chrono::{DateTime, Utc};
use service_core::error::AppError;
use thiserror::Error;

use super::roles::PermissionRequirement;

/// Credential and token failures. Every variant renders as 401.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Tenant is inactive")]
    TenantInactive,
}

/// Access-control failures. Every variant renders as 403.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Insufficient permissions: requires {0}")]
    PermissionDenied(PermissionRequirement),

    #[error("Access to another tenant's resources is not allowed")]
    TenantMismatch,

    #[error("No access policy for this route")]
    NoRoutePolicy,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Password does not meet strength requirements")]
    WeakPassword { violations: Vec<String> },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record already exists: {0}")]
    Duplicate(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflicting state: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Audit write failure. Always swallowed and logged, never surfaced.
#[derive(Error, Debug)]
#[error("Audit persistence failed: {0}")]
pub struct AuditPersistenceError(#[from] pub StoreError);

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => ServiceError::Conflict(what),
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Conflict(what) => ServiceError::Conflict(what),
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ServiceError::Validation(ValidationError::Invalid(msg.into()))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Authentication(e) => AppError::Unauthorized(anyhow::anyhow!(e.to_string())),
            ServiceError::Authorization(e) => AppError::Forbidden(anyhow::anyhow!(e.to_string())),
            ServiceError::Validation(ValidationError::WeakPassword { violations }) => {
                AppError::BadRequest {
                    message: "Password does not meet strength requirements".to_string(),
                    details: violations,
                }
            }
            ServiceError::Validation(ValidationError::Invalid(msg)) => AppError::bad_request(msg),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::Store(StoreError::Unavailable(msg)) => {
                tracing::error!(error = %msg, "Store unavailable");
                AppError::ServiceUnavailable
            }
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Permission;
    use axum::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ServiceError, StatusCode)> = vec![
            (
                AuthenticationError::TokenExpired.into(),
                StatusCode::UNAUTHORIZED,
            ),
            (
                AuthorizationError::TenantMismatch.into(),
                StatusCode::FORBIDDEN,
            ),
            (
                ServiceError::invalid("bad tenant id"),
                StatusCode::BAD_REQUEST,
            ),
            (
                StoreError::Duplicate("email".to_string()).into(),
                StatusCode::CONFLICT,
            ),
            (
                StoreError::NotFound("audit entry".to_string()).into(),
                StatusCode::NOT_FOUND,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_permission_denied_names_requirement_only() {
        let err = AuthorizationError::PermissionDenied(PermissionRequirement::AnyOf(vec![
            Permission::AuditRead,
        ]));
        assert_eq!(
            err.to_string(),
            "Insufficient permissions: requires any of [audit:read]"
        );
    }
}
