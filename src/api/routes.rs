//! API Routes
//!
//! Configures the Axum router with all gateway endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    fetch_handler, focus_handler, get_query_handler, health_handler, invalidate_handler,
    remove_query_handler, set_query_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /fetch` - Read-through fetch of an upstream path
/// - `GET /query?key=` - Inspect the cached state of a key
/// - `PUT /query` - Write data for a key directly
/// - `DELETE /query?key=` - Remove every query matching a key
/// - `POST /invalidate` - Mark every query matching a key stale
/// - `POST /focus` - Emit a focus event
/// - `GET /stats` - Get coordinator statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/fetch", post(fetch_handler))
        .route(
            "/query",
            get(get_query_handler)
                .put(set_query_handler)
                .delete(remove_query_handler),
        )
        .route("/invalidate", post(invalidate_handler))
        .route("/focus", post(focus_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
