//! REST API routes, grouped by the entity they operate on.

pub mod agents;
pub mod cognitions;
pub mod health;
pub mod memories;

use axum::Router;

use crate::state::AppState;
use crate::ws::ws_handler;

/// Assemble the full API router: `/api/v1/{cognitions,memories,agents}`,
/// `/health/*`, and a `/ws` WebSocket upgrade endpoint.
pub fn create_api_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/cognitions", cognitions::create_router())
        .nest("/memories", memories::create_router())
        .nest("/agents", agents::create_router());

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health::create_router())
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state)
}
