//! API error types with structured JSON responses.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::pipeline::import::ImportError;
use crate::report::ReportError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Invalid lab number format: {0}")]
    InvalidLabNumber(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Unprocessable spreadsheet: {0}")]
    InvalidSheet(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::InvalidLabNumber(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_LAB_NUMBER",
                "Invalid lab number format".to_string(),
            ),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "DUPLICATE", detail),
            ApiError::PayloadTooLarge(detail) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE", detail)
            }
            ApiError::UnsupportedFormat(detail) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_FORMAT",
                detail,
            ),
            ApiError::InvalidSheet(detail) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_SHEET", detail)
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Database(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                ApiError::NotFound(format!("{entity_type} not found: {id}"))
            }
            DatabaseError::Duplicate { key } => {
                ApiError::Conflict(format!("Patient already exists: {key}"))
            }
            DatabaseError::ConstraintViolation(detail) => ApiError::BadRequest(detail),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::UnsupportedFormat(_) => ApiError::UnsupportedFormat(err.to_string()),
            ImportError::FileTooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            ImportError::InvalidLabNumber(raw) => ApiError::InvalidLabNumber(raw),
            ImportError::MissingLabNumber => ApiError::BadRequest(err.to_string()),
            ImportError::PatientNotFound(key) => ApiError::NotFound(format!("Patient not found: {key}")),
            ImportError::DuplicateRejected { .. } => ApiError::Conflict(err.to_string()),
            ImportError::FileReadError(_)
            | ImportError::Csv(_)
            | ImportError::EmptySheet
            | ImportError::HeaderNotFound { .. }
            | ImportError::MissingColumns(_) => ApiError::InvalidSheet(err.to_string()),
            ImportError::Database(e) => e.into(),
            ImportError::Io(_) | ImportError::WorkbookWrite(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::PatientNotFound(key) => ApiError::NotFound(format!("Patient not found: {key}")),
            ReportError::Database(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("Malformed upload: {}", err.body_text()))
    }
}
