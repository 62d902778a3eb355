//! Error handling for the warehouse ledger service
//!
//! Every failure maps to a stable machine-readable code and an HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use shared::{Shortfall, TransitionError};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    // Lookup errors
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Material not found: {0}")]
    MaterialNotFound(String),

    #[error("Warehouse not found: {0}")]
    WarehouseNotFound(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule errors
    #[error("Duplicate code: {0}")]
    DuplicateCode(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Already posted: {0}")]
    AlreadyPosted(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: i64, actual: i64 },

    #[error("Request was already processed")]
    IdempotentReplay,

    // Authentication errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

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
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            AppError::MaterialNotFound(_) => "MATERIAL_NOT_FOUND",
            AppError::WarehouseNotFound(_) => "WAREHOUSE_NOT_FOUND",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DuplicateCode(_) => "DUPLICATE_CODE",
            AppError::InvalidStatus(_) => "INVALID_STATUS",
            AppError::AlreadyPosted(_) => "ALREADY_POSTED",
            AppError::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            AppError::VersionConflict { .. } => "VERSION_CONFLICT",
            AppError::IdempotentReplay => "IDEMPOTENT_REPLAY",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::OrderNotFound(_)
            | AppError::MaterialNotFound(_)
            | AppError::WarehouseNotFound(_)
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateCode(_)
            | AppError::InvalidStatus(_)
            | AppError::AlreadyPosted(_)
            | AppError::InsufficientStock(_)
            | AppError::VersionConflict { .. }
            | AppError::IdempotentReplay => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::DatabaseError(_) | AppError::Internal(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn detail(&self) -> ErrorDetail {
        let (message, field) = match self {
            AppError::Validation { field, message } => (message.clone(), field.clone()),
            AppError::OrderNotFound(code) => (format!("Order {} not found", code), None),
            AppError::MaterialNotFound(code) => (
                format!("Material {} not found", code),
                Some("materialCode".to_string()),
            ),
            AppError::WarehouseNotFound(code) => (
                format!("Warehouse {} not found", code),
                Some("warehouseCode".to_string()),
            ),
            AppError::NotFound(resource) => (format!("{} not found", resource), None),
            AppError::DuplicateCode(code) => (
                format!("An order with code {} already exists", code),
                Some("code".to_string()),
            ),
            AppError::InvalidStatus(msg)
            | AppError::AlreadyPosted(msg)
            | AppError::InsufficientStock(msg)
            | AppError::Unauthorized(msg) => (msg.clone(), None),
            AppError::VersionConflict { expected, actual } => (
                format!(
                    "Order was modified: expected version {}, current version {}",
                    expected, actual
                ),
                Some("version".to_string()),
            ),
            AppError::IdempotentReplay => (
                "A request with this idempotency key was already processed".to_string(),
                Some("Idempotency-Key".to_string()),
            ),
            AppError::DatabaseError(_) => ("A database error occurred".to_string(), None),
            AppError::Internal(_) | AppError::InternalError(_) => {
                ("An internal server error occurred".to_string(), None)
            }
        };

        ErrorDetail {
            code: self.code().to_string(),
            message,
            field,
        }
    }
}

/// Error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = self.detail();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!(code = %detail.code, "Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidStatus { .. } => AppError::InvalidStatus(err.to_string()),
            TransitionError::AlreadyPosted { .. } => AppError::AlreadyPosted(err.to_string()),
        }
    }
}

impl From<Shortfall> for AppError {
    fn from(err: Shortfall) -> Self {
        AppError::InsufficientStock(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = first_field_error(&errors)
            .unwrap_or_else(|| (String::new(), "Invalid request".to_string()));
        AppError::Validation {
            field: if field.is_empty() { None } else { Some(field) },
            message,
        }
    }
}

/// Walk nested validation errors down to the first failing leaf, building a dotted path.
fn first_field_error(errors: &validator::ValidationErrors) -> Option<(String, String)> {
    use validator::ValidationErrorsKind;

    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by_key(|(name, _)| **name);

    fields.into_iter().find_map(|(name, kind)| match kind {
        ValidationErrorsKind::Field(list) => list.first().map(|e| {
            let message = e
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("{} is invalid ({})", name, e.code));
            (name.to_string(), message)
        }),
        ValidationErrorsKind::Struct(inner) => {
            first_field_error(inner).map(|(f, m)| (format!("{}.{}", name, f), m))
        }
        ValidationErrorsKind::List(items) => items.iter().find_map(|(idx, inner)| {
            first_field_error(inner).map(|(f, m)| (format!("{}[{}].{}", name, idx, f), m))
        }),
    })
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
