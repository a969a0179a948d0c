//! Error handling for the API server
//!
//! Handlers return [`ApiResult`]; every domain error converts into
//! [`ApiError`], which renders as a JSON [`ErrorResponse`]. The `message` of
//! that body is the text the page shows to the user (inline for the auth
//! forms, as a toast on the dashboards).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use taskdesk_shared::{
    backend::BackendError,
    forms::{FieldError, FormError},
    session::{SessionError, PROFILE_MISSING_MESSAGE},
    store::StoreError,
};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409), e.g. an already registered email
    Conflict(String),

    /// Unprocessable entity (422); nothing was sent to the backend
    ValidationError {
        message: String,
        details: Vec<ValidationErrorDetail>,
    },

    /// Bad gateway (502): the backend answered with something unusable
    BadGateway(String),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503): the backend could not be reached
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

impl From<FieldError> for ValidationErrorDetail {
    fn from(e: FieldError) -> Self {
        Self {
            field: e.field,
            message: e.message,
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g. "bad_request", "unauthorized")
    pub error: String,

    /// Message for the user
    pub message: String,

    /// Per-field validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Validation failure without field details
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Maps a backend failure to a status, showing `message` to the user
    pub fn from_backend(err: &BackendError, message: impl Into<String>) -> Self {
        let message = message.into();
        match err {
            BackendError::InvalidCredentials(_) | BackendError::Unauthorized(_) => {
                ApiError::Unauthorized(message)
            }
            BackendError::Rejected(_) => ApiError::Conflict(message),
            BackendError::NotFound(_) => ApiError::NotFound(message),
            BackendError::Transport(_) => ApiError::ServiceUnavailable(message),
            BackendError::MalformedResponse(_) => ApiError::BadGateway(message),
            BackendError::Internal(_) => ApiError::InternalError(message),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ValidationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError { message, details } => {
                write!(f, "Validation failed: {} ({} fields)", message, details.len())
            }
            ApiError::BadGateway(msg) => write!(f, "Bad gateway: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error_code, message, details) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::Unauthorized(msg) => ("unauthorized", msg, None),
            ApiError::Forbidden(msg) => ("forbidden", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::ValidationError { message, details } => {
                let details = if details.is_empty() { None } else { Some(details) };
                ("validation_error", message, details)
            }
            ApiError::BadGateway(msg) => {
                tracing::warn!("Bad gateway: {}", msg);
                ("bad_gateway", msg, None)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("internal_error", msg, None)
            }
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg, None),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        let message = match &err {
            BackendError::InvalidCredentials(msg)
            | BackendError::Unauthorized(msg)
            | BackendError::Rejected(msg)
            | BackendError::NotFound(msg) => msg.clone(),
            BackendError::Transport(_) => "The backend could not be reached".to_string(),
            BackendError::MalformedResponse(_) | BackendError::Internal(_) => {
                tracing::error!(error = %err, "Backend failure");
                "An internal error occurred".to_string()
            }
        };
        ApiError::from_backend(&err, message)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Invalid(message) => ApiError::invalid(message),
            StoreError::NotFound { message } => ApiError::NotFound(message),
            StoreError::Backend { message, source } => ApiError::from_backend(&source, message),
        }
    }
}

impl From<FormError> for ApiError {
    fn from(err: FormError) -> Self {
        let message = err.to_string();
        match err {
            FormError::Invalid(fields) => ApiError::ValidationError {
                message,
                details: fields.into_iter().map(Into::into).collect(),
            },
            FormError::Credentials(_) => ApiError::Unauthorized(message),
            FormError::RoleLookup(None) => ApiError::Unauthorized(message),
            FormError::RoleLookup(Some(source)) => match source {
                BackendError::MalformedResponse(_) | BackendError::NotFound(_) => {
                    ApiError::Unauthorized(message)
                }
                other => ApiError::from_backend(&other, message),
            },
            FormError::RoleNotPermitted(_) => ApiError::Forbidden(message),
            FormError::ProfileSave(source) => ApiError::from_backend(&source, message),
            FormError::Backend(source) => ApiError::from(source),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Identity(source) => ApiError::from(source),
            SessionError::Profile(source) => ApiError::from_backend(&source, PROFILE_MISSING_MESSAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("Task not found".to_string());
        assert_eq!(err.to_string(), "Not found: Task not found");
    }

    #[test]
    fn test_store_error_keeps_toast_message() {
        let err = ApiError::from(StoreError::Backend {
            message: "Failed to delete task.".to_string(),
            source: BackendError::Transport("connection reset".to_string()),
        });
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "Service unavailable: Failed to delete task.");

        let err = ApiError::from(StoreError::Invalid(
            "Please enter a valid progress percentage (0-100).".to_string(),
        ));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_form_errors() {
        let err = ApiError::from(FormError::Credentials("Invalid login credentials".to_string()));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = ApiError::from(FormError::RoleLookup(Some(BackendError::MalformedResponse(
            "invalid value for users.role".to_string(),
        ))));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = ApiError::from(FormError::Invalid(vec![FieldError {
            field: "email".to_string(),
            message: "Invalid email format".to_string(),
        }]));
        match err {
            ApiError::ValidationError { message, details } => {
                assert_eq!(message, "Invalid email format");
                assert_eq!(details.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_internal_backend_error_is_not_leaked() {
        let err = ApiError::from(BackendError::Internal("pool exhausted".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("pool"));
    }
}
