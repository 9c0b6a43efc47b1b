// Authentication and authorization error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::error::ErrorResponse;

/// Authentication and authorization error types
///
/// Internal variants (`CredentialMismatch`, `InvalidToken`, `SessionNotFound`)
/// are reported to clients with the message of their public counterpart.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or malformed input, with field-level detail
    #[error("Request validation failed")]
    Validation(validator::ValidationErrors),

    /// Password does not satisfy the length policy
    #[error("Password must be at least {min_length} characters long")]
    WeakCredential { min_length: usize },

    /// Password did not match the stored digest (hasher-level)
    #[error("Credential mismatch")]
    CredentialMismatch,

    #[error("Email already registered")]
    DuplicateAccount,

    /// Unknown email or wrong password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Token failed signature, algorithm or temporal checks (token-service-level)
    #[error("Invalid token")]
    InvalidToken,

    /// Refresh token forged, expired or revoked
    #[error("Invalid or expired refresh token")]
    InvalidOrExpiredToken,

    #[error("Invalid or missing access token")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    /// No live session matches the refresh token (store-level)
    #[error("Session not found")]
    SessionNotFound,

    /// Account vanished after its token was validated
    #[error("User not found")]
    UserNotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Token signing error: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("Password hashing error: {0}")]
    Hashing(String),
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuthError::Validation(errors)
    }
}

impl AuthError {
    /// Build a validation error for a single field
    pub fn field(field: &'static str, code: &'static str) -> Self {
        let mut errors = validator::ValidationErrors::new();
        errors.add(field, validator::ValidationError::new(code));
        AuthError::Validation(errors)
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::WeakCredential { .. } => StatusCode::BAD_REQUEST,
            AuthError::CredentialMismatch => StatusCode::UNAUTHORIZED,
            AuthError::DuplicateAccount => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::InvalidOrExpiredToken => StatusCode::UNAUTHORIZED,
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::SessionNotFound => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Database(_) | AuthError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Signing(_) | AuthError::Hashing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable classification sent to clients
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::WeakCredential { .. } => "WEAK_CREDENTIAL",
            AuthError::DuplicateAccount => "DUPLICATE_ACCOUNT",
            AuthError::CredentialMismatch | AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::InvalidToken | AuthError::Unauthorized => "UNAUTHORIZED",
            AuthError::InvalidOrExpiredToken | AuthError::SessionNotFound => {
                "INVALID_OR_EXPIRED_TOKEN"
            }
            AuthError::Forbidden => "FORBIDDEN",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::Database(_) | AuthError::Timeout(_) => "PERSISTENCE_ERROR",
            AuthError::Signing(_) | AuthError::Hashing(_) => "INTERNAL_ERROR",
        }
    }

    /// Get a descriptive error message for this error
    /// This message is safe to send to clients (no sensitive data)
    pub fn error_message(&self) -> String {
        match self {
            AuthError::CredentialMismatch => AuthError::InvalidCredentials.to_string(),
            AuthError::InvalidToken => AuthError::Unauthorized.to_string(),
            AuthError::SessionNotFound => AuthError::InvalidOrExpiredToken.to_string(),
            AuthError::Database(_) | AuthError::Timeout(_) => {
                "A storage error occurred".to_string()
            }
            AuthError::Signing(_) | AuthError::Hashing(_) => {
                "An internal server error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Convert to the client-facing error body, logging at a level that matches severity
    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            AuthError::Validation(errors) => {
                debug!("Validation error: {:?}", errors);
                ErrorResponse::new(self.error_code(), self.error_message()).with_details(
                    serde_json::to_value(errors).unwrap_or(serde_json::json!({})),
                )
            }
            AuthError::Database(e) => {
                error!("Database error in auth: {:?}", e);
                ErrorResponse::new(self.error_code(), self.error_message())
            }
            AuthError::Timeout(deadline) => {
                error!("Store operation timed out after {:?}", deadline);
                ErrorResponse::new(self.error_code(), self.error_message())
            }
            AuthError::Signing(e) => {
                error!("Token signing error: {}", e);
                ErrorResponse::new(self.error_code(), self.error_message())
            }
            AuthError::Hashing(msg) => {
                error!("Password hashing error: {}", msg);
                ErrorResponse::new(self.error_code(), self.error_message())
            }
            AuthError::Forbidden => {
                warn!("Forbidden access attempt");
                ErrorResponse::new(self.error_code(), self.error_message())
            }
            _ => ErrorResponse::new(self.error_code(), self.error_message()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = self.to_error_response();
        (self.status_code(), Json(body)).into_response()
    }
}
