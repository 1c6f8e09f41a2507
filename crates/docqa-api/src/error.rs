//! API error handling
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docqa_core::DocQaError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    #[schema(example = "NO_CONTEXT")]
    pub code: String,
    /// Human-readable message
    #[schema(example = "No documents available. Please upload a document first.")]
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Malformed request rejected before reaching the service
    BadRequest(String),
    /// Error raised by the document service
    Service(DocQaError),
}

impl AppError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        let err = match self {
            AppError::BadRequest(_) => return StatusCode::BAD_REQUEST,
            AppError::Service(err) => err,
        };

        match err {
            DocQaError::InvalidDocument { .. } | DocQaError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            DocQaError::NoContext | DocQaError::EmptyIndex { .. } => StatusCode::CONFLICT,
            DocQaError::NotFound { .. } => StatusCode::NOT_FOUND,
            DocQaError::AccessDenied { .. }
            | DocQaError::AuthError { .. }
            | DocQaError::AnswerGeneration { .. }
            | DocQaError::RateLimited { .. }
            | DocQaError::TransientProvider { .. }
            | DocQaError::ProviderRejected { .. } => StatusCode::BAD_GATEWAY,
            DocQaError::EmbeddingUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DocQaError::CorruptIndex { .. }
            | DocQaError::Storage { .. }
            | DocQaError::Config(_)
            | DocQaError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let error = match self {
            AppError::BadRequest(msg) => ApiError::bad_request(msg),
            AppError::Service(err) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %err, code = err.code(), "Request failed");
                ApiError::internal_error().with_details(err.to_string())
            }
            AppError::Service(err) => {
                tracing::warn!(error = %err, code = err.code(), "Request rejected");
                ApiError::new(err.code(), err.to_string())
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<DocQaError> for AppError {
    fn from(err: DocQaError) -> Self {
        AppError::Service(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Service(DocQaError::Other(err))
    }
}
