//! Error types for the HTTP service

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use hookline_core::{HooklineError, ValidationError};
use tracing::{error, warn};

/// Request handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: malformed bodies, query strings and headers, and
///   validation failures from the core
/// - `403 Forbidden`: the caller's tenant does not own the resource
/// - `404 Not Found`: the resource does not exist
/// - `502 Bad Gateway`: a manual retry reached the receiver but failed
/// - `500 Internal Server Error`: persistence or other unexpected failures
///
/// Internal failures are logged server-side and reported with a generic
/// message so storage details never reach the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Failure reported by the delivery core
    #[error(transparent)]
    Service(#[from] HooklineError),

    /// Request could not be decoded
    ///
    /// Covers JSON bodies, query strings and path segments rejected before
    /// reaching the core.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The `X-Tenant-ID` header is absent or malformed
    #[error("Missing or invalid {header} header")]
    InvalidTenant { header: &'static str },

    /// Request body exceeds the configured limit
    #[error("Payload too large")]
    PayloadTooLarge,
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::Service(HooklineError::Validation(error))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        Self::invalid_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}

impl ApiError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidRequest { .. } | Self::InvalidTenant { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            Self::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Self::Service(e) => match e {
                HooklineError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                HooklineError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                HooklineError::Authorization { .. } => (StatusCode::FORBIDDEN, "forbidden"),
                HooklineError::Transport { .. } => (StatusCode::BAD_GATEWAY, "delivery_failed"),
                HooklineError::RemoteRejection { .. } => {
                    (StatusCode::BAD_GATEWAY, "delivery_rejected")
                }
                HooklineError::Internal { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Service(HooklineError::Internal { message }) => {
                // Log detailed error server-side but return generic message to client
                error!(error = %message, "Internal server error occurred");
                "Internal server error occurred. Please try again later.".to_string()
            }
            Self::Service(HooklineError::Authorization { resource, id, .. }) => {
                warn!(resource = %resource, id = %id, "Cross-tenant access rejected");
                format!("Access to {} {} is not permitted", resource, id)
            }
            Self::Service(e) if e.is_delivery_outcome() => {
                warn!(error = %e, "Manual retry attempt failed");
                e.to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": code,
            "message": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {message}")]
    Loading { message: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
