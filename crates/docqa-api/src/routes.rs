//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::{documents, index, query};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Document endpoints
        .route("/upload", post(documents::upload_document))
        .route("/index", get(index::index_stats))
        // Query endpoints
        .route("/ask", post(query::ask_handler))
}
