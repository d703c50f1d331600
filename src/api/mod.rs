// API layer module (adapter over the bus and the workflow)

pub mod errors;
pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use errors::ApiError;
pub use state::AppState;

use handlers::{agents, health, stream, workflow};

/// Build the application router
pub fn router(state: AppState) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Agents and workflow
        .route("/api/agents", get(agents::list_agents))
        .route("/api/workflow", post(workflow::run_workflow))
        // Live event feeds
        .route("/stream", get(stream::stream_events))
        .route("/ws", get(stream::websocket))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Shared state
        .with_state(state)
}
