use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::domain::ValidationError;
use crate::persistence::StoreError;
use crate::storage::ObjectStoreError;

/// Structured error response returned by all JSON endpoints on failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Always `false`.
    pub ok: bool,
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `UNAUTHORIZED`,
    /// `NOT_FOUND`, `FOREIGN_KEY_VIOLATION`, `INVALID_TRANSITION`,
    /// `ADMIN_DISABLED`, `STORAGE_UNAVAILABLE`, `TIMEOUT`, `INTERNAL_ERROR`.
    pub code: &'static str,
    /// Human-readable description. Never carries driver or network detail.
    pub error: String,
    /// Set when repeating the request may succeed.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

/// Application-level error type.
///
/// Variants carrying a `detail` log it and answer with a fixed message.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Unauthorized,
    AdminDisabled,
    NotFound(String),
    ForeignKeyViolation(String),
    InvalidTransition(String),
    StorageUnavailable { detail: String, retryable: bool },
    Timeout { detail: String },
    /// The whole request exceeded its deadline.
    RequestTimeout,
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::AdminDisabled => "ADMIN_DISABLED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ForeignKeyViolation(_) => "FOREIGN_KEY_VIOLATION",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::StorageUnavailable { .. } => "STORAGE_UNAVAILABLE",
            AppError::Timeout { .. } | AppError::RequestTimeout => "TIMEOUT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        let code = self.code();
        let (status, error, retryable) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, false),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid or missing admin token".to_string(),
                false,
            ),
            AppError::AdminDisabled => {
                tracing::warn!("Admin endpoint called but no admin token is configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Admin endpoints are disabled".to_string(),
                    false,
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, false),
            AppError::ForeignKeyViolation(detail) => {
                tracing::debug!(%detail, "Foreign key violation");
                (
                    StatusCode::CONFLICT,
                    "Referenced run does not exist".to_string(),
                    false,
                )
            }
            AppError::InvalidTransition(msg) => (StatusCode::CONFLICT, msg, false),
            AppError::StorageUnavailable { detail, retryable } => {
                tracing::error!(%detail, "Storage unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A storage dependency is unavailable".to_string(),
                    retryable,
                )
            }
            AppError::Timeout { detail } => {
                tracing::error!(%detail, "Storage call timed out");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A storage dependency timed out".to_string(),
                    true,
                )
            }
            AppError::RequestTimeout => {
                tracing::warn!("Request exceeded its deadline");
                (
                    StatusCode::REQUEST_TIMEOUT,
                    "Request timed out".to_string(),
                    true,
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                    false,
                )
            }
        };

        (
            status,
            ErrorBody {
                ok: false,
                code,
                error,
                retryable,
            },
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let retryable = err.is_retryable();
        match err {
            StoreError::Validation(e) => AppError::Validation(e.0),
            StoreError::NotFound(id) => AppError::NotFound(format!("Run '{id}' not found")),
            StoreError::ForeignKeyViolation(detail) => AppError::ForeignKeyViolation(detail),
            e @ (StoreError::InvalidTransition { .. } | StoreError::StatusConflict { .. }) => {
                AppError::InvalidTransition(e.to_string())
            }
            StoreError::Unavailable(detail) => AppError::StorageUnavailable { detail, retryable },
            StoreError::Timeout => AppError::Timeout {
                detail: "database".into(),
            },
            StoreError::Decode(detail) | StoreError::Internal(detail) => AppError::Internal(detail),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.0)
    }
}

impl From<ObjectStoreError> for AppError {
    fn from(err: ObjectStoreError) -> Self {
        let retryable = err.is_retryable();
        match err {
            ObjectStoreError::Timeout => AppError::Timeout {
                detail: "object store".into(),
            },
            ObjectStoreError::InvalidKey(key) => {
                AppError::Validation(format!("Invalid object key '{key}'"))
            }
            other => AppError::StorageUnavailable {
                detail: other.to_string(),
                retryable,
            },
        }
    }
}
