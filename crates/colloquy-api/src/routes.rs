//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression and a body
//! size limit in front of the conversation handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use colloquy_core::config::ApiConfig;
use colloquy_core::error::ColloquyError;

use crate::handlers;
use crate::state::AppState;

/// Requests served at once; further requests wait for a free slot.
const MAX_CONCURRENT_REQUESTS: usize = 256;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Only same-host origins may call the API from a browser.
    let port = state.api.port;
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
    ]
    .iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let body_limit = state.api.max_body_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/conversations/import", post(handlers::import_conversation))
        .route(
            "/conversations/{id}",
            axum::routing::delete(handlers::clear_conversation),
        )
        .route(
            "/conversations/{id}/commands",
            post(handlers::process_command),
        )
        .route("/conversations/{id}/history", get(handlers::get_history))
        .route("/conversations/{id}/state", get(handlers::get_state))
        .route(
            "/conversations/{id}/parameters",
            get(handlers::get_parameters),
        )
        .route(
            "/conversations/{id}/export",
            get(handlers::export_conversation),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server and serve until `shutdown` resolves.
pub async fn start_server(
    config: &ApiConfig,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), ColloquyError> {
    let addr = format!("{}:{}", config.host, config.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ColloquyError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ColloquyError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
