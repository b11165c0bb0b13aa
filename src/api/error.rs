use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

use crate::services::{
    AuditError, ChangeError, DirectoryServiceError, ReportError, SettingsError,
};

/// Body of every error response. Clients read `detail`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub detail: String,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    ValidationError(String),

    Conflict(String),

    PolicyViolation(String),

    /// The configured directory is unreachable or rejected the bind.
    DirectoryUnavailable(String),

    /// The directory refused an operation for another reason.
    DirectoryError(String),

    DatabaseError(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            ApiError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            ApiError::PolicyViolation(msg) => write!(f, "Policy violation: {msg}"),
            ApiError::DirectoryUnavailable(msg) => write!(f, "Directory unavailable: {msg}"),
            ApiError::DirectoryError(msg) => write!(f, "Directory error: {msg}"),
            ApiError::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            ApiError::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::PolicyViolation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::DirectoryUnavailable(msg) => {
                tracing::warn!("Directory unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            ApiError::DirectoryError(msg) => {
                tracing::warn!("Directory error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            ApiError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            success: false,
            detail,
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(format!("{err:#}"))
    }
}

impl From<DirectoryServiceError> for ApiError {
    fn from(err: DirectoryServiceError) -> Self {
        match err {
            DirectoryServiceError::NotFound(msg) => ApiError::NotFound(msg),
            DirectoryServiceError::Validation(msg) => ApiError::ValidationError(msg),
            DirectoryServiceError::Conflict(msg) => ApiError::Conflict(msg),
            DirectoryServiceError::PolicyViolation(msg) => ApiError::PolicyViolation(msg),
            DirectoryServiceError::Unavailable(msg) => ApiError::DirectoryUnavailable(msg),
            DirectoryServiceError::Directory(msg) => ApiError::DirectoryError(msg),
            DirectoryServiceError::Audit(msg) => ApiError::DatabaseError(msg),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::Validation(msg) => ApiError::ValidationError(msg),
            AuditError::Database(msg) => ApiError::DatabaseError(msg),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Validation(msg) => ApiError::ValidationError(msg),
            ReportError::Unavailable(msg) => ApiError::DirectoryUnavailable(msg),
            ReportError::Directory(msg) => ApiError::DirectoryError(msg),
        }
    }
}

impl From<ChangeError> for ApiError {
    fn from(err: ChangeError) -> Self {
        match err {
            ChangeError::Validation(msg) => ApiError::ValidationError(msg),
            ChangeError::Unavailable(msg) => ApiError::DirectoryUnavailable(msg),
            ChangeError::Directory(msg) => ApiError::DirectoryError(msg),
            ChangeError::Audit(msg) => ApiError::DatabaseError(msg),
        }
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::Validation(msg) => ApiError::ValidationError(msg),
            SettingsError::Database(msg) => ApiError::DatabaseError(msg),
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::InternalError(msg.into())
    }
}
