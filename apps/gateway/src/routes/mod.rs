pub mod status;

use axum::routing::get;
use axum::Router;

use crate::proxy;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(status::health_handler))
        .route("/api/gateway-status", get(status::gateway_status_handler))
        // Everything else is either a registered proxy prefix or a 404
        // envelope; nothing falls through silently.
        .fallback(proxy::proxy_handler)
        .with_state(state)
}
