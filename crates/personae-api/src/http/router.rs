//! Axum router configuration with middleware.
//!
//! Middleware: CORS, request tracing.

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Chat
        .route("/chats/stream", post(handlers::chat::stream_chat))
        .route("/chats", get(handlers::chat::list_chats))
        .route(
            "/chats/{thread_id}/{character_id}",
            delete(handlers::chat::delete_chat),
        )
        .route("/chat/history", get(handlers::chat::get_history))
        // Personas
        .route("/characters", get(handlers::persona::list_characters))
        .route("/characters/{id}", get(handlers::persona::get_character))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
