use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers::{health_handler, query_handler, ready_handler};
use crate::server::AppState;

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/query", post(query_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
