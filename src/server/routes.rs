use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::config::RateLimitConfig;
use crate::server::handlers::{health_handler, verify_handler, AppState};
use crate::server::logging::request_logging_middleware;
use crate::server::rate_limit::create_verify_rate_limiter;

/// Build the application router.
///
/// # Routes
///
/// - `POST /api/v1/client/:team_id/verify` - Verify a license
/// - `GET /health` - Service and database health
///
/// The rate limiting layer wraps only the verification route; the health
/// endpoint stays unthrottled for monitoring. The request logging
/// middleware wraps everything.
pub fn build_router(state: AppState, rate_limit: &RateLimitConfig) -> Router {
    let mut verify_routes =
        Router::new().route("/api/v1/client/:team_id/verify", post(verify_handler));

    if rate_limit.enabled {
        verify_routes = verify_routes.route_layer(create_verify_rate_limiter(rate_limit));
    }

    verify_routes
        .route("/health", get(health_handler))
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}
