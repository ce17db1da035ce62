//! Verification outcomes.
//!
//! Every branch of the pipeline terminates in exactly one `Outcome`. The
//! code is preserved end to end: it decides the HTTP status, the human
//! detail string in the response, and the status recorded in the request
//! log. Rejections are never collapsed into a generic "invalid".

use axum::http::StatusCode;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Final outcome of a verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// All checks passed
    Valid,
    /// Malformed request, rejected before any store access
    BadRequest,
    /// Team does not exist
    TeamNotFound,
    /// No license matches the lookup key within the team
    LicenseNotFound,
    /// Customer axis violation (mismatch or missing-when-required)
    CustomerNotFound,
    /// Product axis violation
    ProductNotFound,
    /// Release/version axis violation
    ReleaseNotFound,
    /// Caller IP is blacklisted
    IpBlacklisted,
    /// Caller's resolved country is blacklisted
    CountryBlacklisted,
    /// Supplied device identifier is blacklisted
    DeviceIdentifierBlacklisted,
    /// License is suspended
    LicenseSuspended,
    /// License has expired
    LicenseExpired,
    /// Distinct-IP window limit reached
    IpLimitReached,
    /// Concurrent seat limit reached
    MaximumConcurrentSeats,
    /// Per-IP request budget exceeded
    RateLimit,
    /// Infrastructure failure; internals withheld from the response
    InternalError,
}

impl Outcome {
    /// Transport status code for this outcome.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Outcome::Valid => StatusCode::OK,

            Outcome::BadRequest => StatusCode::BAD_REQUEST,

            Outcome::TeamNotFound
            | Outcome::LicenseNotFound
            | Outcome::CustomerNotFound
            | Outcome::ProductNotFound
            | Outcome::ReleaseNotFound => StatusCode::NOT_FOUND,

            Outcome::IpBlacklisted
            | Outcome::CountryBlacklisted
            | Outcome::DeviceIdentifierBlacklisted
            | Outcome::LicenseSuspended
            | Outcome::LicenseExpired
            | Outcome::IpLimitReached
            | Outcome::MaximumConcurrentSeats => StatusCode::FORBIDDEN,

            Outcome::RateLimit => StatusCode::TOO_MANY_REQUESTS,

            Outcome::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable detail string for the response body.
    pub fn details(&self) -> &'static str {
        match self {
            Outcome::Valid => "License is valid",
            Outcome::BadRequest => "Invalid request",
            Outcome::TeamNotFound => "Team not found",
            Outcome::LicenseNotFound => "License not found",
            Outcome::CustomerNotFound => "Customer not found",
            Outcome::ProductNotFound => "Product not found",
            Outcome::ReleaseNotFound => "Release not found",
            Outcome::IpBlacklisted => "IP address is blacklisted",
            Outcome::CountryBlacklisted => "Country is blacklisted",
            Outcome::DeviceIdentifierBlacklisted => "Device identifier is blacklisted",
            Outcome::LicenseSuspended => "License is suspended",
            Outcome::LicenseExpired => "License has expired",
            Outcome::IpLimitReached => "IP address limit reached",
            Outcome::MaximumConcurrentSeats => "Maximum concurrent seats reached",
            Outcome::RateLimit => "Too many requests",
            Outcome::InternalError => "Internal server error",
        }
    }

    /// Stable machine-readable code, as recorded in the request log.
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Valid => "VALID",
            Outcome::BadRequest => "BAD_REQUEST",
            Outcome::TeamNotFound => "TEAM_NOT_FOUND",
            Outcome::LicenseNotFound => "LICENSE_NOT_FOUND",
            Outcome::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            Outcome::ProductNotFound => "PRODUCT_NOT_FOUND",
            Outcome::ReleaseNotFound => "RELEASE_NOT_FOUND",
            Outcome::IpBlacklisted => "IP_BLACKLISTED",
            Outcome::CountryBlacklisted => "COUNTRY_BLACKLISTED",
            Outcome::DeviceIdentifierBlacklisted => "DEVICE_IDENTIFIER_BLACKLISTED",
            Outcome::LicenseSuspended => "LICENSE_SUSPENDED",
            Outcome::LicenseExpired => "LICENSE_EXPIRED",
            Outcome::IpLimitReached => "IP_LIMIT_REACHED",
            Outcome::MaximumConcurrentSeats => "MAXIMUM_CONCURRENT_SEATS",
            Outcome::RateLimit => "RATE_LIMIT",
            Outcome::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Outcome::Valid)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Normalized record of one verification attempt, handed to the request
/// logger. Matched entity ids are present only when they actually matched.
#[derive(Debug, Clone)]
pub struct OutcomeRecord {
    pub team_id: String,
    pub license_id: Option<String>,
    pub license_key_lookup: Option<String>,
    pub customer_id: Option<String>,
    pub product_id: Option<String>,
    pub release_id: Option<String>,
    pub device_identifier: Option<String>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub outcome: Outcome,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(Outcome::Valid.status_code(), StatusCode::OK);
        assert_eq!(Outcome::BadRequest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Outcome::TeamNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Outcome::LicenseNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(Outcome::IpBlacklisted.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(Outcome::LicenseExpired.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Outcome::MaximumConcurrentSeats.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Outcome::RateLimit.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            Outcome::InternalError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&Outcome::MaximumConcurrentSeats).unwrap();
        assert_eq!(json, "\"MAXIMUM_CONCURRENT_SEATS\"");

        let json = serde_json::to_string(&Outcome::DeviceIdentifierBlacklisted).unwrap();
        assert_eq!(json, "\"DEVICE_IDENTIFIER_BLACKLISTED\"");
    }

    #[test]
    fn code_matches_serde_name() {
        for outcome in [
            Outcome::Valid,
            Outcome::BadRequest,
            Outcome::TeamNotFound,
            Outcome::LicenseNotFound,
            Outcome::CustomerNotFound,
            Outcome::ProductNotFound,
            Outcome::ReleaseNotFound,
            Outcome::IpBlacklisted,
            Outcome::CountryBlacklisted,
            Outcome::DeviceIdentifierBlacklisted,
            Outcome::LicenseSuspended,
            Outcome::LicenseExpired,
            Outcome::IpLimitReached,
            Outcome::MaximumConcurrentSeats,
            Outcome::RateLimit,
            Outcome::InternalError,
        ] {
            let json = serde_json::to_string(&outcome).unwrap();
            assert_eq!(json, format!("\"{}\"", outcome.code()));
        }
    }

    #[test]
    fn only_valid_is_valid() {
        assert!(Outcome::Valid.is_valid());
        assert!(!Outcome::LicenseExpired.is_valid());
        assert!(!Outcome::InternalError.is_valid());
    }
}
