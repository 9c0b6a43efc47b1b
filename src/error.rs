// Shared error response shape
// Every failure that crosses the HTTP boundary is serialized with this structure

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Consistent error response structure
///
/// Carries a machine-readable classification (`error_code`) and a
/// client-safe message. Internal detail is logged, never serialized here.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "VALIDATION_ERROR", "INVALID_CREDENTIALS")
    #[schema(example = "INVALID_CREDENTIALS")]
    pub error_code: String,

    /// Human-readable error message
    #[schema(example = "Invalid email or password")]
    pub message: String,

    /// Optional field-level details, omitted from JSON when None
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,

    /// RFC 3339 timestamp of when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message: message.into(),
            details: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
