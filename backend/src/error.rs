//! Error handling for the inventory backend
//!
//! Every core operation returns [`AppResult`]. The controller layer maps
//! errors to HTTP responses through [`IntoResponse`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{AlertTransitionError, ParseEnumError, StockError};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Lookup errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    // Stock errors
    #[error("Insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("Batch {0} already exists at this location")]
    DuplicateBatch(String),

    #[error("Serial number {0} is already tracked")]
    DuplicateSerial(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Concurrent update detected: {0}")]
    ConcurrencyConflict(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(resource.to_string())
    }

    /// HTTP status a controller should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::DuplicateBatch(_)
            | AppError::DuplicateSerial(_)
            | AppError::DuplicateEntry(_)
            | AppError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientStock { .. } | AppError::InvalidStateTransition(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::DuplicateBatch(_) => "DUPLICATE_BATCH",
            AppError::DuplicateSerial(_) => "DUPLICATE_SERIAL",
            AppError::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            AppError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::Insufficient {
                available,
                requested,
            } => AppError::InsufficientStock {
                available,
                requested,
            },
            err @ StockError::VersionMismatch { .. } => AppError::ConcurrencyConflict(err.to_string()),
            StockError::SerialAlreadyPresent(serial) => AppError::DuplicateSerial(serial),
            StockError::SerialNotFound(serial) => AppError::validation(
                "serialNumbers",
                format!("Serial number {} is not held by this record", serial),
            ),
            StockError::SerialsRequired => AppError::validation(
                "serialNumbers",
                "Record tracks serial numbers; name the serials being moved",
            ),
            StockError::UntrackedUnits(quantity) => AppError::validation(
                "serialNumbers",
                format!(
                    "Record holds {} units without serial numbers; adjust them out before tracking serials",
                    quantity
                ),
            ),
            StockError::Overflow => AppError::validation("quantity", "Quantity out of range"),
        }
    }
}

impl From<ParseEnumError> for AppError {
    fn from(err: ParseEnumError) -> Self {
        AppError::Internal(format!("corrupt stored value: {}", err))
    }
}

impl From<AlertTransitionError> for AppError {
    fn from(err: AlertTransitionError) -> Self {
        AppError::InvalidStateTransition(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("Invalid {}", field));
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("input".to_string(), "Invalid input".to_string()));
        AppError::Validation { field, message }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Do not leak driver details to callers
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalError(_) => "An internal server error occurred".to_string(),
            other => other.to_string(),
        };
        let field = match &self {
            AppError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let detail = ErrorDetail {
            code: self.code().to_string(),
            message,
            field,
        };
        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Result type alias for core operations
pub type AppResult<T> = Result<T, AppError>;
