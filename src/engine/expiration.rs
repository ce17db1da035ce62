//! Expiration state machine.
//!
//! States: `NEVER` (terminal, always valid), `DATE` (valid while
//! `now <= expiration_date`), and `DURATION` with two sub-states:
//! `NOT_STARTED` (no stored date yet) and `STARTED` (behaves as `DATE`).
//!
//! The evaluation itself is pure; the `ActivateDuration` decision tells the
//! orchestrator to perform the one-time conditional date write. The first
//! verification of a `DURATION` license is always treated as valid since
//! the clock starts at that moment.

use chrono::{Duration, NaiveDateTime};

use crate::engine::outcome::Outcome;
use crate::model::{ExpirationType, License};

/// Decision of the expiration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationDecision {
    /// License is within its validity window.
    Pass,
    /// First verification of a DURATION license: the orchestrator must
    /// atomically set `expiration_date = expires_at` (only if still unset).
    ActivateDuration { expires_at: NaiveDateTime },
    /// License is past its expiration date.
    Expired,
}

/// Evaluate the license's expiration policy at `now`.
///
/// Unrecognized policy text and inconsistent rows (a dated policy with no
/// date, a duration policy with no day count) fail closed as an internal
/// error rather than defaulting to valid.
pub fn evaluate(license: &License, now: NaiveDateTime) -> Result<ExpirationDecision, Outcome> {
    let Some(policy) = license.expiration_policy() else {
        return Err(Outcome::InternalError);
    };

    match policy {
        ExpirationType::Never => Ok(ExpirationDecision::Pass),

        ExpirationType::Date => match license.expiration_date {
            Some(expiration_date) if now <= expiration_date => Ok(ExpirationDecision::Pass),
            Some(_) => Ok(ExpirationDecision::Expired),
            None => Err(Outcome::InternalError),
        },

        ExpirationType::Duration => match license.expiration_date {
            // STARTED: identical comparison to DATE.
            Some(expiration_date) if now <= expiration_date => Ok(ExpirationDecision::Pass),
            Some(_) => Ok(ExpirationDecision::Expired),
            // NOT_STARTED: the clock starts now.
            None => match license.expiration_days {
                Some(days) if days > 0 => Ok(ExpirationDecision::ActivateDuration {
                    expires_at: now + Duration::days(days),
                }),
                _ => Err(Outcome::InternalError),
            },
        },
    }
}
