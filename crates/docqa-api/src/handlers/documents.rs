//! Document upload handler
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Upload document request
#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadDocumentRequest {
    /// File name; its extension selects the parser
    #[schema(example = "quarterly_report.pdf")]
    pub filename: String,

    /// Base64 encoded file content
    pub content: String,
}

/// Upload document response
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadDocumentResponse {
    pub upload_id: Uuid,
    /// Key of the per-upload index snapshot
    #[schema(example = "quarterly_report.pdf.index")]
    pub index_name: String,
    pub document: String,
    pub page_count: usize,
    pub chunk_count: usize,
    /// Vectors in the live index after this upload
    pub index_size: usize,
    pub uploaded_at: DateTime<Utc>,
    pub message: String,
}

/// Upload and index a document
#[utoipa::path(
    post,
    path = "/api/v1/upload",
    tag = "documents",
    request_body = UploadDocumentRequest,
    responses(
        (status = 201, description = "Document uploaded and indexed", body = UploadDocumentResponse),
        (status = 400, description = "Invalid request or document", body = crate::error::ApiError),
        (status = 503, description = "Embedding provider unavailable", body = crate::error::ApiError)
    )
)]
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    if req.filename.trim().is_empty() {
        return Err(AppError::BadRequest("Filename cannot be empty".to_string()));
    }
    if req.content.is_empty() {
        return Err(AppError::BadRequest("Content cannot be empty".to_string()));
    }

    let bytes = STANDARD
        .decode(req.content.as_bytes())
        .map_err(|e| AppError::BadRequest(format!("Content is not valid base64: {e}")))?;

    let receipt = state.service.upload(&req.filename, bytes).await?;

    let response = UploadDocumentResponse {
        upload_id: receipt.upload_id,
        index_name: receipt.index_id,
        document: receipt.document,
        page_count: receipt.page_count,
        chunk_count: receipt.chunk_count,
        index_size: receipt.index_size,
        uploaded_at: receipt.uploaded_at,
        message: "File uploaded & indexed successfully!".to_string(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}
