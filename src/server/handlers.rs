//! HTTP handlers for the verification API.
//!
//! The verify handler validates request shape before any store access,
//! resolves the caller IP, runs the engine pipeline and maps the outcome
//! to the transport envelope. Unexpected failures surface as a generic
//! internal-error verdict; internals never leak into responses.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::outcome::Outcome;
use crate::engine::{EngineContext, VerifyParams};
use crate::server::database::Database;
use crate::server::logging::HealthResponse;
use crate::server::validation::{
    validate_length, validate_not_empty, validate_optional_field, validate_optional_uuid,
    validate_uuid, ValidationError, ValidationResult,
};

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub engine: Arc<EngineContext>,
}

/// Verification request body. Every field is optional at the serde level
/// so shape problems produce our envelope instead of an extractor error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyRequest {
    pub license_key: Option<String>,
    pub customer_id: Option<String>,
    pub product_id: Option<String>,
    pub device_identifier: Option<String>,
    pub version: Option<String>,
    pub challenge: Option<String>,
}

/// Inner verdict object of the response envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub timestamp: String,
    pub valid: bool,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_response: Option<String>,
}

/// Response envelope. `data` is always present and always null on this
/// endpoint; the verdict lives under `result`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub data: Option<serde_json::Value>,
    pub result: VerifyResult,
}

fn respond(
    outcome: Outcome,
    challenge_response: Option<String>,
) -> (StatusCode, Json<VerifyResponse>) {
    (
        outcome.status_code(),
        Json(VerifyResponse {
            data: None,
            result: VerifyResult {
                timestamp: Utc::now().to_rfc3339(),
                valid: outcome.is_valid(),
                details: outcome.details().to_string(),
                challenge_response,
            },
        }),
    )
}

fn reject(outcome: Outcome) -> (StatusCode, Json<VerifyResponse>) {
    respond(outcome, None)
}

/// Validate request shape. Runs before any store access.
fn validate_request(team_id: &str, body: &VerifyRequest) -> ValidationResult<()> {
    validate_uuid(team_id, "team_id")?;

    let license_key = body
        .license_key
        .as_deref()
        .ok_or_else(|| ValidationError::new("licenseKey", "is required"))?;
    validate_not_empty(license_key, "licenseKey")?;
    validate_length(license_key, 1, 255, "licenseKey")?;

    validate_optional_uuid(body.customer_id.as_deref(), "customerId")?;
    validate_optional_uuid(body.product_id.as_deref(), "productId")?;
    validate_optional_field(body.device_identifier.as_deref(), 1, 255, "deviceIdentifier")?;
    validate_optional_field(body.version.as_deref(), 1, 255, "version")?;
    validate_optional_field(body.challenge.as_deref(), 1, 1024, "challenge")?;

    Ok(())
}

/// Resolve the caller IP: X-Forwarded-For, then X-Real-IP, then peer address.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return Some(real_ip.to_string());
        }
    }

    peer.map(|addr| addr.ip().to_string())
}

/// Handler for `POST /api/v1/client/:team_id/verify`.
pub async fn verify_handler(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> (StatusCode, Json<VerifyResponse>) {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected unparseable verification payload: {rejection}");
            return reject(Outcome::BadRequest);
        }
    };

    if let Err(e) = validate_request(&team_id, &body) {
        warn!("Rejected malformed verification request: {e}");
        return reject(Outcome::BadRequest);
    }

    let ip_address = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    let params = VerifyParams {
        team_id,
        license_key: body.license_key.unwrap_or_default(),
        customer_id: body.customer_id,
        product_id: body.product_id,
        device_identifier: body.device_identifier,
        version: body.version,
        challenge: body.challenge,
        ip_address,
    };

    let verdict = state.engine.verify(params).await;
    respond(verdict.outcome, verdict.challenge_response)
}

/// Handler for `GET /health`.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let connected = state.db.ping().await;
    (
        StatusCode::OK,
        Json(HealthResponse::healthy(connected, state.db.db_type())),
    )
}
