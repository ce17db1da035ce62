//! License verification engine.
//!
//! The engine is an ordered pipeline of policy checks over an immutable
//! per-request snapshot of team and license state:
//!
//! 1. team snapshot (settings, key pair, blacklist)
//! 2. license snapshot by lookup key (associations, activity)
//! 3. suspension gate
//! 4. blacklist filter (IP, country, device identifier)
//! 5. entitlement matcher (customer, product, release)
//! 6. expiration state machine
//! 7. usage limiters (distinct IPs, concurrent seats)
//! 8. verdict assembly and challenge signing
//!
//! The checks themselves are pure functions in the submodules; this module
//! performs the store reads and the three atomic writes (blacklist hit
//! counter, lazy expiration activation, heartbeat upsert) and hands every
//! outcome to the request logger. Later checks assume earlier ones passed,
//! so the order is fixed.

pub mod blacklist;
pub mod entitlement;
pub mod expiration;
pub mod limits;
pub mod outcome;

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use tracing::{error, info, warn};

use crate::crypto;
use crate::errors::{EngineError, EngineResult};
use crate::geo::Geolocator;
use crate::server::database::Database;

use self::expiration::ExpirationDecision;
use self::outcome::{Outcome, OutcomeRecord};

/// Engine-level options resolved once at startup.
pub struct EngineOptions {
    /// HMAC secret for lookup key derivation.
    pub lookup_secret: Vec<u8>,
    /// Whether the release/version matching axis is enabled.
    pub release_matching: bool,
}

/// Everything a verification needs: store, geolocation and options.
pub struct EngineContext {
    pub db: Arc<Database>,
    pub geo: Geolocator,
    pub options: EngineOptions,
}

/// Validated inputs of one verification request.
#[derive(Debug, Clone)]
pub struct VerifyParams {
    pub team_id: String,
    pub license_key: String,
    pub customer_id: Option<String>,
    pub product_id: Option<String>,
    pub device_identifier: Option<String>,
    pub version: Option<String>,
    pub challenge: Option<String>,
    pub ip_address: Option<String>,
}

/// Final verdict handed back to the transport layer.
#[derive(Debug)]
pub struct Verdict {
    pub outcome: Outcome,
    pub challenge_response: Option<String>,
}

/// Working state accumulated while the pipeline runs. Matched entity ids
/// stay recorded even when a later stage rejects the request.
struct Evaluation {
    outcome: Outcome,
    challenge_response: Option<String>,
    license_id: Option<String>,
    lookup_key: Option<String>,
    customer_id: Option<String>,
    product_id: Option<String>,
    release_id: Option<String>,
}

impl Evaluation {
    fn new() -> Self {
        // Fail closed: any early bail-out that does not set an explicit
        // outcome reports an internal error, never a pass.
        Self {
            outcome: Outcome::InternalError,
            challenge_response: None,
            license_id: None,
            lookup_key: None,
            customer_id: None,
            product_id: None,
            release_id: None,
        }
    }

    fn finish(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// Run a store write on a detached task, then wait for its result.
///
/// A caller disconnect cancels the handler future; detaching keeps the
/// write from being abandoned mid-statement while the pipeline still
/// observes its result.
async fn complete_write(
    fut: impl std::future::Future<Output = EngineResult<()>> + Send + 'static,
) -> EngineResult<()> {
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(e) => Err(EngineError::DatabaseError(format!(
            "store write task failed: {e}"
        ))),
    }
}

impl EngineContext {
    /// Run the full verification pipeline for one request.
    ///
    /// Always returns a fully formed verdict; infrastructure failures map
    /// to an internal-error outcome. The outcome record is written
    /// fire-and-forget on a detached task so it completes even if the
    /// caller disconnects mid-request.
    pub async fn verify(&self, params: VerifyParams) -> Verdict {
        let now = Utc::now().naive_utc();

        let country = match params.ip_address.as_deref() {
            Some(ip) => self.geo.resolve_country(ip).await,
            None => None,
        };

        let evaluation = self.evaluate(&params, now, country.as_deref()).await;

        if evaluation.outcome.is_valid() {
            info!(
                team_id = %params.team_id,
                outcome = %evaluation.outcome,
                "License verification passed"
            );
        } else {
            warn!(
                team_id = %params.team_id,
                outcome = %evaluation.outcome,
                "License verification rejected"
            );
        }

        let record = OutcomeRecord {
            team_id: params.team_id,
            license_id: evaluation.license_id,
            license_key_lookup: evaluation.lookup_key,
            customer_id: evaluation.customer_id,
            product_id: evaluation.product_id,
            release_id: evaluation.release_id,
            device_identifier: params.device_identifier,
            ip_address: params.ip_address,
            country,
            outcome: evaluation.outcome,
            created_at: now,
        };

        let db = Arc::clone(&self.db);
        tokio::spawn(async move {
            if let Err(e) = db.insert_request_log(&record).await {
                warn!("Failed to record verification outcome: {e}");
            }
        });

        Verdict {
            outcome: evaluation.outcome,
            challenge_response: evaluation.challenge_response,
        }
    }

    async fn evaluate(
        &self,
        params: &VerifyParams,
        now: NaiveDateTime,
        country: Option<&str>,
    ) -> Evaluation {
        let mut ev = Evaluation::new();

        let team = match self.db.load_team_snapshot(&params.team_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return ev.finish(Outcome::TeamNotFound),
            Err(e) => {
                error!(team_id = %params.team_id, "Team snapshot read failed: {e}");
                return ev;
            }
        };

        let lookup = crypto::lookup_key(
            &params.license_key,
            &params.team_id,
            &self.options.lookup_secret,
        );
        ev.lookup_key = Some(lookup.clone());

        let Some(window) = team.settings.ip_limit_window() else {
            error!(
                team_id = %params.team_id,
                "Unrecognized ip_limit_period '{}'",
                team.settings.ip_limit_period
            );
            return ev;
        };
        let ip_cutoff = now - Duration::days(window.days());

        let license = match self
            .db
            .load_license_snapshot(&params.team_id, &lookup, ip_cutoff)
            .await
        {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return ev.finish(Outcome::LicenseNotFound),
            Err(e) => {
                error!(team_id = %params.team_id, "License snapshot read failed: {e}");
                return ev;
            }
        };
        ev.license_id = Some(license.license.id.clone());

        if license.license.suspended {
            return ev.finish(Outcome::LicenseSuspended);
        }

        if let Some(hit) = blacklist::evaluate(
            &team.blacklist,
            params.ip_address.as_deref(),
            country,
            params.device_identifier.as_deref(),
        ) {
            let db = Arc::clone(&self.db);
            let entry_id = hit.entry.id.clone();
            if let Err(e) =
                complete_write(async move { db.increment_blacklist_hits(&entry_id).await }).await
            {
                error!(entry_id = %hit.entry.id, "Blacklist hit counter update failed: {e}");
                return ev;
            }
            return ev.finish(hit.outcome);
        }

        match entitlement::match_customer(
            &license.customers,
            team.settings.strict_customers,
            params.customer_id.as_deref(),
        ) {
            Ok(matched) => ev.customer_id = matched,
            Err(outcome) => return ev.finish(outcome),
        }

        let matched_product = match entitlement::match_product(
            &license.products,
            team.settings.strict_products,
            params.product_id.as_deref(),
        ) {
            Ok(matched) => matched,
            Err(outcome) => return ev.finish(outcome),
        };
        ev.product_id = matched_product.map(|entry| entry.product.id.clone());

        match entitlement::match_release(
            matched_product,
            team.settings.strict_releases,
            self.options.release_matching,
            params.version.as_deref(),
        ) {
            Ok(matched) => ev.release_id = matched.map(|release| release.id.clone()),
            Err(outcome) => return ev.finish(outcome),
        }

        match expiration::evaluate(&license.license, now) {
            Ok(ExpirationDecision::Pass) => {}
            Ok(ExpirationDecision::Expired) => return ev.finish(Outcome::LicenseExpired),
            Ok(ExpirationDecision::ActivateDuration { expires_at }) => {
                // Set-once conditional write; a concurrent racer that loses
                // still observes this verification as valid.
                let db = Arc::clone(&self.db);
                let license_id = license.license.id.clone();
                if let Err(e) = complete_write(async move {
                    db.activate_duration_expiration(&license_id, expires_at).await
                })
                .await
                {
                    error!(license_id = %license.license.id, "Expiration activation failed: {e}");
                    return ev;
                }
            }
            Err(outcome) => {
                error!(
                    license_id = %license.license.id,
                    "Expiration evaluation failed closed"
                );
                return ev.finish(outcome);
            }
        }

        if let Err(outcome) = limits::check_ip_limit(
            license.license.ip_limit,
            &license.recent_ips,
            params.ip_address.as_deref(),
        ) {
            return ev.finish(outcome);
        }

        if let Err(outcome) = limits::check_seat_limit(
            license.license.seats,
            &license.devices,
            team.settings.device_timeout_minutes,
            now,
            params.device_identifier.as_deref(),
        ) {
            return ev.finish(outcome);
        }

        if let Some(identifier) = params.device_identifier.as_deref() {
            let db = Arc::clone(&self.db);
            let license_id = license.license.id.clone();
            let identifier = identifier.to_string();
            let ip_address = params.ip_address.clone();
            let country = country.map(|c| c.to_string());
            if let Err(e) = complete_write(async move {
                db.upsert_device_heartbeat(
                    &license_id,
                    &identifier,
                    now,
                    ip_address.as_deref(),
                    country.as_deref(),
                )
                .await
            })
            .await
            {
                error!(license_id = %license.license.id, "Heartbeat upsert failed: {e}");
                return ev;
            }
        }

        // Challenge signing happens last so a signature can never leak out
        // of a rejected verification.
        if let Some(challenge) = params.challenge.as_deref() {
            let Some(key_pair) = team.key_pair.as_ref() else {
                error!(team_id = %params.team_id, "Signing key pair is missing");
                return ev;
            };
            match crypto::sign_challenge(challenge, &key_pair.private_key) {
                Ok(signature) => ev.challenge_response = Some(signature),
                Err(e) => {
                    error!(team_id = %params.team_id, "Challenge signing failed: {e}");
                    return ev;
                }
            }
        }

        ev.finish(Outcome::Valid)
    }
}
