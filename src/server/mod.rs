//! Server-side components for Argus.
//!
//! This module contains:
//! - `database`   → DB abstraction over SQLite/Postgres with the engine's
//!   snapshot reads and atomic writes
//! - `handlers`   → Axum HTTP handlers for the verification API
//! - `routes`     → Router builder
//! - `rate_limit` → Per-IP rate limiting middleware
//! - `validation` → Request validation utilities
//! - `logging`    → Request logging middleware and health reporting

pub mod database;
pub mod handlers;
pub mod logging;
pub mod rate_limit;
pub mod routes;
pub mod validation;

// Convenient re-exports so callers can do `argus::server::X`
// instead of digging into submodules.

pub use database::Database;
pub use handlers::{
    health_handler, verify_handler, AppState, VerifyRequest, VerifyResponse, VerifyResult,
};
pub use logging::{request_logging_middleware, HealthResponse, REQUEST_ID_HEADER};
pub use rate_limit::{create_verify_rate_limiter, rate_limit_error_response, SmartIpKeyExtractor};
pub use routes::build_router;
pub use validation::{
    validate_length, validate_not_empty, validate_optional_field, validate_optional_uuid,
    validate_uuid, ValidationError, ValidationResult,
};
