//! Question answering handler
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use docqa_core::DocQaError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Ask request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct AskRequest {
    /// User's question
    #[schema(example = "What is the main topic?")]
    #[serde(default)]
    pub query: String,
}

/// Ask response body
#[derive(Debug, Serialize, ToSchema)]
pub struct AskResponse {
    /// Generated answer
    pub answer: String,

    /// Deduplicated sources of the retrieved chunks
    #[schema(example = json!(["quarterly_report.pdf#page=2"]))]
    pub sources: Vec<String>,

    /// Processing time in milliseconds
    #[schema(example = 1250)]
    pub processing_time_ms: u64,
}

/// Answer a question from the uploaded documents
#[utoipa::path(
    post,
    path = "/api/v1/ask",
    tag = "query",
    request_body = AskRequest,
    responses(
        (status = 200, description = "Question answered", body = AskResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 409, description = "No documents uploaded yet", body = crate::error::ApiError),
        (status = 502, description = "Language model failed", body = crate::error::ApiError)
    )
)]
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    if state.service.registry().is_empty() {
        return Err(DocQaError::NoContext.into());
    }
    if req.query.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Query not provided in the request.".to_string(),
        ));
    }

    let answer = state.service.ask(&req.query).await?;

    Ok(Json(AskResponse {
        answer: answer.answer,
        sources: answer.sources,
        processing_time_ms: answer.processing_time_ms,
    }))
}
