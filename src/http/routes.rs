use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/sessions/start", post(handlers::start_session))
        .route("/sessions/:session_id/stop", post(handlers::stop_session))
        .route(
            "/sessions/:session_id/cancel",
            post(handlers::cancel_session),
        )
        // Collaborator read surface
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/:session_id", get(handlers::get_session))
        .route(
            "/sessions/:session_id/chunks",
            get(handlers::get_session_chunks),
        )
        .route(
            "/sessions/:session_id/transcript",
            get(handlers::get_session_transcript),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
