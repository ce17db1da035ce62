//! Per-IP rate limiting for the verification route.
//!
//! A fixed request budget per source IP and rolling minute, enforced ahead
//! of any policy evaluation. The 429 path is deliberately low-detail: it
//! must not confirm whether a probed license exists, so the body carries
//! the usual verdict envelope and nothing else.
//!
//! # Configuration
//!
//! ```toml
//! [rate_limit]
//! enabled = true
//! verify_rpm = 60   # verification endpoint: requests per minute per IP
//! burst_size = 5    # allow short bursts above the limit
//! ```
//!
//! Key extraction follows X-Forwarded-For and X-Real-IP before the peer
//! address, which requires the server to be started with
//! `.into_make_service_with_connect_info::<SocketAddr>()` rather than
//! `.into_make_service()`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;
use governor::middleware::NoOpMiddleware;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorError;

pub use tower_governor::key_extractor::SmartIpKeyExtractor;
pub use tower_governor::GovernorLayer;

use crate::config::RateLimitConfig;

/// Build the layer that throttles the verification endpoint per source IP.
///
/// The requests-per-minute budget becomes a token replenish interval;
/// `burst_size` tokens may be spent ahead of it.
pub fn create_verify_rate_limiter(
    config: &RateLimitConfig,
) -> GovernorLayer<SmartIpKeyExtractor, NoOpMiddleware> {
    // One token every 60000/rpm ms. The max(1) guards building a layer
    // from a zero budget; validate() rejects that configuration anyway.
    let replenish_ms = 60_000u64 / u64::from(config.verify_rpm.max(1));

    let governor = GovernorConfigBuilder::default()
        .per_millisecond(replenish_ms)
        .burst_size(config.burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .error_handler(|error| match error {
            GovernorError::TooManyRequests { wait_time, .. } => {
                rate_limit_error_response(wait_time)
            }
            GovernorError::UnableToExtractKey => empty_status(StatusCode::INTERNAL_SERVER_ERROR),
            GovernorError::Other { code, .. } => empty_status(code),
        })
        .finish()
        .expect("rate limiter configuration is valid");

    GovernorLayer {
        config: Arc::new(governor),
    }
}

/// The throttled response: 429 with a Retry-After header and the verdict
/// envelope, no further detail.
pub fn rate_limit_error_response(wait_secs: u64) -> Response<Body> {
    let retry_after = wait_secs.max(1);
    let body = serde_json::json!({
        "data": null,
        "result": {
            "valid": false,
            "details": "Too many requests",
            "retry_after_seconds": retry_after,
        }
    });

    Response::builder()
        .status(StatusCode::TOO_MANY_REQUESTS)
        .header("Content-Type", "application/json")
        .header("Retry-After", retry_after.to_string())
        .body(Body::from(body.to_string()))
        .expect("static response is well formed")
}

fn empty_status(code: StatusCode) -> Response<Body> {
    Response::builder()
        .status(code)
        .body(Body::empty())
        .expect("static response is well formed")
}
