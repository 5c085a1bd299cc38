use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    AppState,
    middleware::{RateLimiter, log_server_errors, rate_limit},
    routes::system,
};

/// Builds the HTTP router. Everything under `/api` is rate limited.
pub fn create_router(state: AppState) -> Router {
    let limiter = Arc::new(RateLimiter::new(state.cache.clone(), &state.config));

    let api_routes = Router::new()
        .route("/admin/system", get(system::system_stats))
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit));

    let router = Router::new()
        .route("/", get(system::service_info))
        .route("/health", get(system::health))
        .nest("/api", api_routes)
        .fallback(system::not_found)
        .layer(axum::middleware::from_fn(log_server_errors))
        .layer(TraceLayer::new_for_http());

    // Browsers only hit the API cross-origin during development.
    let router = if state.config.is_production() {
        router
    } else {
        tracing::debug!("Adding permissive CORS layer");
        router.layer(CorsLayer::permissive())
    };

    router.with_state(state)
}
