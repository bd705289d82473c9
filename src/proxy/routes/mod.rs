use axum::{middleware, routing::get, routing::post, Router};

use crate::proxy::handlers;
use crate::proxy::health;
use crate::proxy::middleware::auth_middleware;
use crate::proxy::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check_handler))
        .route("/v1/messages", post(handlers::messages::handle_messages))
        .fallback(handlers::messages::handle_passthrough)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}
