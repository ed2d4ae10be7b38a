//! Error types for MailScout services
//!
//! Provides a single error type for the store, the batch runner and the
//! HTTP layer with:
//! - Distinct variants for rejection, lookup and storage failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    EmptyBatch,

    // Configuration state errors (2xxx)
    MissingApiKey,

    // Resource errors (4xxx)
    NotFound,
    BatchNotFound,

    // Rate limiting (6xxx)
    RateLimited,

    // Storage errors (7xxx)
    FetchFailed,
    ConnectionError,

    // Internal errors (9xxx)
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::EmptyBatch => 1002,

            ErrorCode::MissingApiKey => 2001,

            ErrorCode::NotFound => 4001,
            ErrorCode::BatchNotFound => 4002,

            ErrorCode::RateLimited => 6001,

            ErrorCode::FetchFailed => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::ConfigurationError => 9002,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Input rejection
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Contact list is empty")]
    EmptyBatch,

    #[error("No active API key configured")]
    MissingApiKey,

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Batch job not found: {id}")]
    BatchNotFound { id: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Storage errors
    #[error("Fetch failed: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Fetch failed: {message}")]
    FetchFailed { message: String },

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::EmptyBatch => ErrorCode::EmptyBatch,
            AppError::MissingApiKey => ErrorCode::MissingApiKey,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::BatchNotFound { .. } => ErrorCode::BatchNotFound,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) | AppError::FetchFailed { .. } => ErrorCode::FetchFailed,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::EmptyBatch |
            AppError::MissingApiKey => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound { .. } |
            AppError::BatchNotFound { .. } => StatusCode::NOT_FOUND,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_) |
            AppError::FetchFailed { .. } |
            AppError::DatabaseConnection { .. } |
            AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// True for storage failures, as opposed to "record not found"
    pub fn is_storage_failure(&self) -> bool {
        self.code() == ErrorCode::FetchFailed
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match self {
            AppError::Validation { field, .. } => field,
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}
