// plan-pdf-service/src/error.rs

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Missing template_key. Allowed: {}", .allowed.join(", "))]
    MissingTemplateKey { allowed: Vec<String> },

    #[error("Unknown template_key '{key}'. Allowed: {}", .allowed.join(", "))]
    UnknownTemplate { key: String, allowed: Vec<String> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Template file unavailable for {key}: {source}")]
    TemplateIo {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF rendering failed: {0}")]
    Render(String),

    #[error("Storage not configured: {0}")]
    StorageConfig(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),
}

impl ServiceError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::MissingTemplateKey { .. } => "missing_template_key",
            ServiceError::UnknownTemplate { .. } => "unknown_template",
            ServiceError::InvalidRequest(_) => "invalid_request",
            ServiceError::TemplateIo { .. } => "template_io",
            ServiceError::Render(_) => "render_failed",
            ServiceError::StorageConfig(_) => "storage_config",
            ServiceError::Storage(_) => "storage_failed",
        }
    }

    /// Caller errors map to 400; everything downstream collapses into 500.
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::MissingTemplateKey { .. }
            | ServiceError::UnknownTemplate { .. }
            | ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        let allowed = match self {
            ServiceError::MissingTemplateKey { allowed }
            | ServiceError::UnknownTemplate { allowed, .. } => Some(allowed.clone()),
            _ => None,
        };

        ErrorResponse {
            ok: false,
            error: self.to_string(),
            allowed,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error_type = self.error_type(), error = %self, "Request failed");
        } else {
            warn!(error_type = self.error_type(), error = %self, "Rejected request");
        }

        (status, Json(self.to_error_response())).into_response()
    }
}
