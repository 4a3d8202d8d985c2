// HTTP API Error Types
use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::approval::GatewayError;
use crate::translator::TranslateError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 404 Not Found
    NotFound {
        message: String,
        operation_id: Option<Uuid>,
    },

    // 409 Conflict (decision replay or race)
    AlreadyResolved {
        message: String,
        operation_id: Uuid,
    },

    // 422 Unprocessable Entity (the data layer refused the statement)
    ExecutionFailed {
        message: String,
        operation_id: Option<Uuid>,
    },

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (translator issues)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::NotFound { .. } => 404,
            ApiError::AlreadyResolved { .. } => 409,
            ApiError::ExecutionFailed { .. } => 422,
            ApiError::InternalServerError(_) => 500,
            ApiError::BadGateway(_) => 502,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::NotFound { message, .. } => message,
            ApiError::AlreadyResolved { message, .. } => message,
            ApiError::ExecutionFailed { message, .. } => message,
            ApiError::InternalServerError(msg) => msg,
            ApiError::BadGateway(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::AlreadyResolved { .. } => "ALREADY_RESOLVED",
            ApiError::ExecutionFailed { .. } => "EXECUTION_ERROR",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway(_) => "TRANSLATION_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    fn operation_id(&self) -> Option<Uuid> {
        match self {
            ApiError::NotFound { operation_id, .. } => *operation_id,
            ApiError::AlreadyResolved { operation_id, .. } => Some(*operation_id),
            ApiError::ExecutionFailed { operation_id, .. } => *operation_id,
            _ => None,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        });

        if let ApiError::ValidationError {
            field_errors: Some(field_errors),
            ..
        } = self
        {
            response["field_errors"] = json!(field_errors);
        }
        if let Some(id) = self.operation_id() {
            response["operation_id"] = json!(id);
        }

        response
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn field_error(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), message.clone());
        ApiError::validation_error(message, Some(field_errors))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
            operation_id: None,
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(id) => ApiError::NotFound {
                message: format!("Operation {} not found", id),
                operation_id: Some(id),
            },
            GatewayError::AlreadyResolved { id, status } => ApiError::AlreadyResolved {
                message: format!("Operation {} was already resolved ({})", id, status),
                operation_id: id,
            },
            GatewayError::Validation(msg) => ApiError::validation_error(msg, None),
            GatewayError::Execution { id, source } => ApiError::ExecutionFailed {
                message: source.to_string(),
                operation_id: id,
            },
            GatewayError::InvalidTransition { .. } => {
                tracing::error!("Lifecycle violation: {}", err);
                ApiError::internal_server_error("Operation is in an inconsistent state")
            }
            GatewayError::Storage(msg) => {
                // Don't expose storage internals to clients
                tracing::error!("Pending store error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<TranslateError> for ApiError {
    fn from(err: TranslateError) -> Self {
        match err {
            TranslateError::NotConfigured(msg) => {
                ApiError::bad_gateway(format!("Natural language translation unavailable: {}", msg))
            }
            TranslateError::Request(msg) => {
                tracing::error!("Translator request failed: {}", msg);
                ApiError::bad_gateway("Translator request failed")
            }
            TranslateError::Unintelligible(msg) => ApiError::bad_gateway(format!(
                "Could not interpret the query ({}). Try a simpler phrasing.",
                msg
            )),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // Well-formed JSON that does not fit the request shape
            JsonRejection::JsonDataError(err) => ApiError::validation_error(err.body_text(), None),
            other => ApiError::bad_request(other.body_text()),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
