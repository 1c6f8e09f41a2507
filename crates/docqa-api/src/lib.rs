//! DocQA API - REST server
//!
//! Exposes document upload and question answering over HTTP.
//!
//! Author: hephaex@gmail.com

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

#[cfg(feature = "test-utils")]
pub mod testing;

use axum::{extract::DefaultBodyLimit, http::HeaderValue, routing::get, Router};
use docqa_core::ServerConfig;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "DocQA API",
        description = "Upload documents and ask questions answered from their content"
    ),
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::documents::upload_document,
        handlers::query::ask_handler,
        handlers::index::index_stats,
    ),
    components(schemas(
        error::ApiError,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
        handlers::documents::UploadDocumentRequest,
        handlers::documents::UploadDocumentResponse,
        handlers::query::AskRequest,
        handlers::query::AskResponse,
        handlers::index::IndexStatsResponse,
    )),
    tags(
        (name = "health", description = "Liveness and readiness probes"),
        (name = "documents", description = "Document ingestion"),
        (name = "query", description = "Retrieval-augmented question answering")
    )
)]
pub struct ApiDoc;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server);
    let body_limit = state.config.server.max_body_size;

    let mut router = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .nest("/api/v1", routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors {
        router = router.layer(cors);
    }

    router.with_state(state)
}

fn cors_layer(config: &ServerConfig) -> Option<CorsLayer> {
    if !config.cors_enabled {
        return None;
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// Router over in-memory storage and offline providers
#[cfg(feature = "test-utils")]
pub fn create_router_for_testing() -> Router {
    create_router(create_test_state())
}

/// Ready state over in-memory storage and offline providers
#[cfg(feature = "test-utils")]
pub fn create_test_state() -> Arc<AppState> {
    let config = testing::test_config();
    let service = testing::offline_service(&config);
    let state = AppState::new(config, Arc::new(service));
    state.set_ready(true);
    Arc::new(state)
}
