//! HTTP route handlers.

pub mod health;
pub mod list;
pub mod metrics;

use axum::Router;
use axum::middleware::from_fn_with_state;

use crate::state::AppState;

/// All routes with authentication and request metrics applied.
///
/// CORS and tracing layers are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(list::router())
        .merge(health::router())
        .merge(metrics::router())
        // Last added = first executed: metrics → bearer auth → routes
        .layer(from_fn_with_state(
            state.clone(),
            crate::middleware::authenticate_bearer_token,
        ))
        .layer(from_fn_with_state(state.clone(), crate::middleware::track_requests))
        .with_state(state)
}
