use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Request refused before reaching the handler (e.g. body too large).
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("{message}: {source}")]
    Backend {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

/// JSON body shared by every error response: `{"error": true, "message", "details"?}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            details,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Rejected { status, .. } => *status,
            AppError::Backend { .. } | AppError::InternalError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Body rendered for this error. Client errors carry no `details`.
    pub fn body(&self) -> ErrorResponse {
        match self {
            AppError::BadRequest(err) => ErrorResponse::new(err.to_string(), None),
            AppError::MethodNotAllowed(msg) => ErrorResponse::new(msg.clone(), None),
            AppError::Rejected { message, .. } => ErrorResponse::new(message.clone(), None),
            AppError::Backend { message, source } => {
                ErrorResponse::new(message.clone(), Some(source.to_string()))
            }
            AppError::InternalError(err) => {
                ErrorResponse::new("Internal server error", Some(err.to_string()))
            }
            AppError::ServiceUnavailable(reason) => {
                ErrorResponse::new("Service unavailable", Some(reason.clone()))
            }
            AppError::ConfigError(err) => {
                ErrorResponse::new("Configuration error", Some(err.to_string()))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (status, Json(self.body())).into_response()
    }
}
