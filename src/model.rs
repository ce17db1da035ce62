//! Domain model for the verification engine.
//!
//! These structs mirror the database schema (see `server::database`) and
//! carry the typed accessors the policy checks rely on. Enum-like columns
//! are stored as text; the accessors parse them and return `None` for
//! unrecognized values so callers fail closed instead of defaulting to a
//! permissive interpretation.

use chrono::{Duration, NaiveDateTime};
use sqlx::FromRow;

/// Expiration policy of a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationType {
    /// Terminal state, always valid.
    Never,
    /// Valid while `now <= expiration_date`.
    Date,
    /// Clock starts on first verification; behaves as `Date` afterwards.
    Duration,
}

impl ExpirationType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NEVER" => Some(ExpirationType::Never),
            "DATE" => Some(ExpirationType::Date),
            "DURATION" => Some(ExpirationType::Duration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpirationType::Never => "NEVER",
            ExpirationType::Date => "DATE",
            ExpirationType::Duration => "DURATION",
        }
    }
}

/// Rolling window over which distinct client IPs are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpLimitPeriod {
    Day,
    Week,
    Month,
}

impl IpLimitPeriod {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DAY" => Some(IpLimitPeriod::Day),
            "WEEK" => Some(IpLimitPeriod::Week),
            "MONTH" => Some(IpLimitPeriod::Month),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IpLimitPeriod::Day => "DAY",
            IpLimitPeriod::Week => "WEEK",
            IpLimitPeriod::Month => "MONTH",
        }
    }

    /// Window length in days.
    pub fn days(&self) -> i64 {
        match self {
            IpLimitPeriod::Day => 1,
            IpLimitPeriod::Week => 7,
            IpLimitPeriod::Month => 30,
        }
    }
}

/// Kind of a blacklist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistKind {
    IpAddress,
    Country,
    DeviceIdentifier,
}

impl BlacklistKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IP_ADDRESS" => Some(BlacklistKind::IpAddress),
            "COUNTRY" => Some(BlacklistKind::Country),
            "DEVICE_IDENTIFIER" => Some(BlacklistKind::DeviceIdentifier),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlacklistKind::IpAddress => "IP_ADDRESS",
            BlacklistKind::Country => "COUNTRY",
            BlacklistKind::DeviceIdentifier => "DEVICE_IDENTIFIER",
        }
    }
}

/// Release status eligible for version matching.
pub const RELEASE_PUBLISHED: &str = "PUBLISHED";

/// A tenant. Owns licenses, products, customers, settings and key material.
#[derive(Debug, Clone, FromRow)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub created_at: NaiveDateTime,
}

/// Per-team policy settings, fetched fresh on every verification.
#[derive(Debug, Clone, FromRow)]
pub struct TeamSettings {
    pub team_id: String,
    pub strict_customers: bool,
    pub strict_products: bool,
    pub strict_releases: bool,
    pub ip_limit_period: String,
    pub device_timeout_minutes: i64,
}

impl TeamSettings {
    /// Parsed IP-limit window, `None` when the stored value is unrecognized.
    pub fn ip_limit_window(&self) -> Option<IpLimitPeriod> {
        IpLimitPeriod::parse(&self.ip_limit_period)
    }
}

/// A team's asymmetric signing key pair.
///
/// The private key is a PKCS#8 Ed25519 document and never leaves the engine.
#[derive(Debug, Clone, FromRow)]
pub struct TeamKeyPair {
    pub team_id: String,
    pub private_key: Vec<u8>,
    pub public_key: Vec<u8>,
}

/// A license row.
///
/// Identified internally by `(team_id, license_key_lookup)`; the raw key is
/// stored encrypted in `license_key_encrypted` and never used for lookup.
#[derive(Debug, Clone, FromRow)]
pub struct License {
    pub id: String,
    pub team_id: String,
    pub license_key_lookup: String,
    pub license_key_encrypted: String,
    pub suspended: bool,
    pub expiration_type: String,
    pub expiration_date: Option<NaiveDateTime>,
    pub expiration_days: Option<i64>,
    pub ip_limit: Option<i64>,
    pub seats: Option<i64>,
    pub created_at: NaiveDateTime,
}

impl License {
    /// Parsed expiration policy, `None` when the stored value is unrecognized.
    pub fn expiration_policy(&self) -> Option<ExpirationType> {
        ExpirationType::parse(&self.expiration_type)
    }
}

/// A customer optionally attached to licenses.
#[derive(Debug, Clone, FromRow)]
pub struct Customer {
    pub id: String,
    pub team_id: String,
    pub name: String,
}

/// A product optionally attached to licenses.
#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub id: String,
    pub team_id: String,
    pub name: String,
}

/// A release of a product. Only PUBLISHED releases are eligible for
/// version matching.
#[derive(Debug, Clone, FromRow)]
pub struct Release {
    pub id: String,
    pub product_id: String,
    pub version: String,
    pub status: String,
}

impl Release {
    pub fn is_published(&self) -> bool {
        self.status == RELEASE_PUBLISHED
    }
}

/// A blacklist entry. `(team_id, kind, value)` is unique; `hits` only grows.
#[derive(Debug, Clone, FromRow)]
pub struct BlacklistEntry {
    pub id: String,
    pub team_id: String,
    pub kind: String,
    pub value: String,
    pub hits: i64,
}

impl BlacklistEntry {
    pub fn blacklist_kind(&self) -> Option<BlacklistKind> {
        BlacklistKind::parse(&self.kind)
    }
}

/// The active-seat ledger: one row per `(license, device identifier)`,
/// refreshed in place on every verification that carries the identifier.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceRecord {
    pub license_id: String,
    pub device_identifier: String,
    pub last_beat_at: NaiveDateTime,
    pub ip_address: Option<String>,
    pub country: Option<String>,
}

impl DeviceRecord {
    /// Whether this device counts as an active seat at `now`.
    ///
    /// Expiry is computed on read; there is no background sweep.
    pub fn is_active(&self, now: NaiveDateTime, timeout_minutes: i64) -> bool {
        now - self.last_beat_at <= Duration::minutes(timeout_minutes)
    }
}

/// Consistent per-team read: team, settings, key pair and blacklist,
/// fetched in one transaction.
#[derive(Debug, Clone)]
pub struct TeamSnapshot {
    pub team: Team,
    pub settings: TeamSettings,
    pub key_pair: Option<TeamKeyPair>,
    pub blacklist: Vec<BlacklistEntry>,
}

/// A product together with its PUBLISHED releases.
#[derive(Debug, Clone)]
pub struct ProductWithReleases {
    pub product: Product,
    pub releases: Vec<Release>,
}

/// Consistent per-license read: the license with its associated entities
/// and recent activity, fetched in one transaction.
#[derive(Debug, Clone)]
pub struct LicenseSnapshot {
    pub license: License,
    pub customers: Vec<Customer>,
    pub products: Vec<ProductWithReleases>,
    pub devices: Vec<DeviceRecord>,
    /// Distinct IPs seen in request logs within the IP-limit window.
    pub recent_ips: Vec<String>,
}
