//! Application Error Types
//!
//! Centralized error handling with Axum integration. The same error values
//! flow out of the REST façade (as JSON bodies) and the gateway (as `error`
//! events sent to the initiating connection only).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable kind, used as the `kind` of gateway error events.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Conflict(_) => "conflict",
            AppError::Persistence(_) | AppError::Database(_) => "persistence",
            AppError::Internal(_) => "internal",
        }
    }

    /// Message safe to show a client. Storage and internal failures are
    /// logged with detail and reported generically.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::PermissionDenied(msg)
            | AppError::Unauthorized(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::Persistence(detail) => {
                tracing::error!(error = %detail, "Persistence failure");
                "Storage is temporarily unavailable".into()
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                "Storage is temporarily unavailable".into()
            }
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "Internal server error".into()
            }
        }
    }

    /// True for failures of the backing store rather than of the request.
    pub fn is_persistence(&self) -> bool {
        matches!(self, AppError::Persistence(_) | AppError::Database(_))
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

/// Field-level validation error
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, 10001),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, 10002),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, 10003),
            AppError::PermissionDenied(_) => (StatusCode::FORBIDDEN, 10004),
            AppError::Conflict(_) => (StatusCode::CONFLICT, 10005),
            AppError::Persistence(_) | AppError::Database(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, 10006)
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, 10000),
        };

        let body = ErrorResponse {
            code,
            kind: self.kind(),
            message: self.public_message(),
            errors: None,
        };

        (status, Json(body)).into_response()
    }
}
