//! Blacklist filter.
//!
//! Evaluates the team's blacklist against the request in fixed order:
//! IP address, then resolved country, then device identifier. The request
//! terminates at the first hit; the matched entry is returned so the
//! orchestrator can atomically bump its hit counter.

use crate::engine::outcome::Outcome;
use crate::model::{BlacklistEntry, BlacklistKind};

/// A blacklist hit: the entry that matched and the outcome it maps to.
#[derive(Debug)]
pub struct BlacklistHit<'a> {
    pub entry: &'a BlacklistEntry,
    pub outcome: Outcome,
}

/// Evaluate the blacklist against the request.
///
/// Country comparison is case-insensitive since providers and operators
/// disagree on casing; IP and device identifier comparisons are exact.
/// Entries with an unrecognized kind are ignored.
pub fn evaluate<'a>(
    entries: &'a [BlacklistEntry],
    ip_address: Option<&str>,
    country: Option<&str>,
    device_identifier: Option<&str>,
) -> Option<BlacklistHit<'a>> {
    if let Some(ip) = ip_address {
        if let Some(entry) = find(entries, BlacklistKind::IpAddress, |value| value == ip) {
            return Some(BlacklistHit {
                entry,
                outcome: Outcome::IpBlacklisted,
            });
        }
    }

    if let Some(country) = country {
        if let Some(entry) = find(entries, BlacklistKind::Country, |value| {
            value.eq_ignore_ascii_case(country)
        }) {
            return Some(BlacklistHit {
                entry,
                outcome: Outcome::CountryBlacklisted,
            });
        }
    }

    if let Some(device) = device_identifier {
        if let Some(entry) = find(entries, BlacklistKind::DeviceIdentifier, |value| {
            value == device
        }) {
            return Some(BlacklistHit {
                entry,
                outcome: Outcome::DeviceIdentifierBlacklisted,
            });
        }
    }

    None
}

fn find(
    entries: &[BlacklistEntry],
    kind: BlacklistKind,
    matches: impl Fn(&str) -> bool,
) -> Option<&BlacklistEntry> {
    entries
        .iter()
        .find(|entry| entry.blacklist_kind() == Some(kind) && matches(&entry.value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, kind: BlacklistKind, value: &str) -> BlacklistEntry {
        BlacklistEntry {
            id: id.to_string(),
            team_id: "team".to_string(),
            kind: kind.as_str().to_string(),
            value: value.to_string(),
            hits: 0,
        }
    }

    #[test]
    fn no_entries_means_no_hit() {
        assert!(evaluate(&[], Some("203.0.113.7"), Some("FI"), Some("dev-1")).is_none());
    }

    #[test]
    fn matches_ip_address() {
        let entries = vec![entry("b1", BlacklistKind::IpAddress, "203.0.113.7")];

        let hit = evaluate(&entries, Some("203.0.113.7"), None, None).expect("hit");
        assert_eq!(hit.outcome, Outcome::IpBlacklisted);
        assert_eq!(hit.entry.id, "b1");

        assert!(evaluate(&entries, Some("203.0.113.8"), None, None).is_none());
    }

    #[test]
    fn matches_country_case_insensitively() {
        let entries = vec![entry("b1", BlacklistKind::Country, "FI")];

        let hit = evaluate(&entries, None, Some("fi"), None).expect("hit");
        assert_eq!(hit.outcome, Outcome::CountryBlacklisted);
    }

    #[test]
    fn matches_device_identifier_exactly() {
        let entries = vec![entry("b1", BlacklistKind::DeviceIdentifier, "dev-1")];

        let hit = evaluate(&entries, None, None, Some("dev-1")).expect("hit");
        assert_eq!(hit.outcome, Outcome::DeviceIdentifierBlacklisted);

        assert!(evaluate(&entries, None, None, Some("DEV-1")).is_none());
    }

    #[test]
    fn ip_takes_precedence_over_country_and_device() {
        let entries = vec![
            entry("dev", BlacklistKind::DeviceIdentifier, "dev-1"),
            entry("country", BlacklistKind::Country, "FI"),
            entry("ip", BlacklistKind::IpAddress, "203.0.113.7"),
        ];

        let hit = evaluate(&entries, Some("203.0.113.7"), Some("FI"), Some("dev-1")).expect("hit");
        assert_eq!(hit.outcome, Outcome::IpBlacklisted);
        assert_eq!(hit.entry.id, "ip");

        // Without an IP match the country entry wins over the device entry.
        let hit = evaluate(&entries, Some("203.0.113.8"), Some("FI"), Some("dev-1")).expect("hit");
        assert_eq!(hit.outcome, Outcome::CountryBlacklisted);
    }

    #[test]
    fn unknown_country_skips_country_check() {
        let entries = vec![entry("b1", BlacklistKind::Country, "FI")];
        assert!(evaluate(&entries, Some("203.0.113.7"), None, Some("dev-1")).is_none());
    }

    #[test]
    fn unrecognized_kind_is_ignored() {
        let mut bad = entry("b1", BlacklistKind::IpAddress, "203.0.113.7");
        bad.kind = "MAC_ADDRESS".to_string();
        assert!(evaluate(&[bad], Some("203.0.113.7"), None, None).is_none());
    }
}
