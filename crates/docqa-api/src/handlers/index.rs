//! Index statistics handler

use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Live index statistics
#[derive(Debug, Serialize, ToSchema)]
pub struct IndexStatsResponse {
    /// Number of stored vectors
    pub size: usize,
    pub dimension: usize,
    /// Distinct documents in the index
    pub sources: Vec<String>,
    #[schema(example = "merge")]
    pub ingest_mode: String,
    pub query_cache_hit_rate: Option<f64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/index",
    tag = "documents",
    responses(
        (status = 200, description = "Live index statistics", body = IndexStatsResponse)
    )
)]
pub async fn index_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();

    let stats = state.service.stats();
    let ingest_mode = match stats.ingest_mode {
        docqa_core::IngestMode::Merge => "merge",
        docqa_core::IngestMode::Replace => "replace",
    };

    Json(IndexStatsResponse {
        size: stats.size,
        dimension: stats.dimension,
        sources: stats.sources,
        ingest_mode: ingest_mode.to_string(),
        query_cache_hit_rate: stats.query_cache.map(|c| c.hit_rate),
    })
}
