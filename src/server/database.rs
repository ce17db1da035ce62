//! Database abstraction for the verification engine.
//!
//! Mirrors the schema the engine reads: teams with settings, key pairs and
//! blacklists; licenses with customer/product/release associations; the
//! device heartbeat ledger; and the append-only request log.
//!
//! Two access patterns matter here:
//!
//! - **Snapshot reads** (`load_team_snapshot`, `load_license_snapshot`)
//!   run inside one transaction so a verification never observes a license
//!   mid-update across multiple non-transactional reads.
//! - **Atomic writes** (`increment_blacklist_hits`,
//!   `activate_duration_expiration`, `upsert_device_heartbeat`) are single
//!   SQL statements. Shared counters and the lazy expiration date are never
//!   read-modify-written from application code.

use chrono::NaiveDateTime;
use sqlx::{query, query_as, query_scalar};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::get_config;
use crate::engine::outcome::OutcomeRecord;
use crate::errors::{EngineError, EngineResult};
use crate::model::{
    BlacklistEntry, Customer, DeviceRecord, License, LicenseSnapshot, Product,
    ProductWithReleases, Release, Team, TeamKeyPair, TeamSettings, TeamSnapshot,
};

// Shared DML. `$N` placeholders are understood by both backends.

const SQL_SELECT_TEAM: &str = "SELECT id, name, created_at FROM teams WHERE id = $1";

const SQL_SELECT_SETTINGS: &str = "SELECT team_id, strict_customers, strict_products, \
     strict_releases, ip_limit_period, device_timeout_minutes \
     FROM team_settings WHERE team_id = $1";

const SQL_SELECT_KEY_PAIR: &str =
    "SELECT team_id, private_key, public_key FROM team_key_pairs WHERE team_id = $1";

const SQL_SELECT_BLACKLIST: &str =
    "SELECT id, team_id, kind, value, hits FROM blacklist WHERE team_id = $1";

const SQL_SELECT_LICENSE: &str = "SELECT id, team_id, license_key_lookup, license_key_encrypted, \
     suspended, expiration_type, expiration_date, expiration_days, ip_limit, seats, created_at \
     FROM licenses WHERE team_id = $1 AND license_key_lookup = $2";

const SQL_SELECT_LICENSE_CUSTOMERS: &str = "SELECT c.id, c.team_id, c.name FROM customers c \
     JOIN license_customers lc ON lc.customer_id = c.id WHERE lc.license_id = $1";

const SQL_SELECT_LICENSE_PRODUCTS: &str = "SELECT p.id, p.team_id, p.name FROM products p \
     JOIN license_products lp ON lp.product_id = p.id WHERE lp.license_id = $1";

const SQL_SELECT_PUBLISHED_RELEASES: &str =
    "SELECT r.id, r.product_id, r.version, r.status FROM releases r \
     JOIN license_products lp ON lp.product_id = r.product_id \
     WHERE lp.license_id = $1 AND r.status = 'PUBLISHED'";

const SQL_SELECT_DEVICES: &str =
    "SELECT license_id, device_identifier, last_beat_at, ip_address, country \
     FROM devices WHERE license_id = $1";

// Only successful verifications occupy an IP slot; otherwise a rejected
// IP would be admitted as "returning" on its next attempt.
const SQL_SELECT_RECENT_IPS: &str = "SELECT DISTINCT ip_address FROM request_logs \
     WHERE license_id = $1 AND created_at >= $2 AND ip_address IS NOT NULL \
     AND status = 'VALID'";

const SQL_INCREMENT_HITS: &str = "UPDATE blacklist SET hits = hits + 1 WHERE id = $1";

const SQL_ACTIVATE_EXPIRATION: &str =
    "UPDATE licenses SET expiration_date = $1 WHERE id = $2 AND expiration_date IS NULL";

const SQL_UPSERT_HEARTBEAT: &str =
    "INSERT INTO devices (license_id, device_identifier, last_beat_at, ip_address, country) \
     VALUES ($1, $2, $3, $4, $5) \
     ON CONFLICT (license_id, device_identifier) DO UPDATE SET \
         last_beat_at = excluded.last_beat_at, \
         ip_address   = excluded.ip_address, \
         country      = excluded.country";

const SQL_INSERT_REQUEST_LOG: &str = "INSERT INTO request_logs (\
         id, team_id, license_id, license_key_lookup, customer_id, product_id, release_id, \
         device_identifier, ip_address, country, status, status_code, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)";

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS teams (
        id         TEXT PRIMARY KEY,
        name       TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS team_settings (
        team_id                TEXT PRIMARY KEY,
        strict_customers       INTEGER NOT NULL DEFAULT 0,
        strict_products        INTEGER NOT NULL DEFAULT 0,
        strict_releases        INTEGER NOT NULL DEFAULT 0,
        ip_limit_period        TEXT NOT NULL DEFAULT 'DAY',
        device_timeout_minutes INTEGER NOT NULL DEFAULT 60
    )",
    "CREATE TABLE IF NOT EXISTS team_key_pairs (
        team_id     TEXT PRIMARY KEY,
        private_key BLOB NOT NULL,
        public_key  BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS licenses (
        id                    TEXT PRIMARY KEY,
        team_id               TEXT NOT NULL,
        license_key_lookup    TEXT NOT NULL,
        license_key_encrypted TEXT NOT NULL,
        suspended             INTEGER NOT NULL DEFAULT 0,
        expiration_type       TEXT NOT NULL DEFAULT 'NEVER',
        expiration_date       TEXT,
        expiration_days       INTEGER,
        ip_limit              INTEGER,
        seats                 INTEGER,
        created_at            TEXT NOT NULL,
        UNIQUE (team_id, license_key_lookup)
    )",
    "CREATE TABLE IF NOT EXISTS customers (
        id      TEXT PRIMARY KEY,
        team_id TEXT NOT NULL,
        name    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS products (
        id      TEXT PRIMARY KEY,
        team_id TEXT NOT NULL,
        name    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS releases (
        id         TEXT PRIMARY KEY,
        product_id TEXT NOT NULL,
        version    TEXT NOT NULL,
        status     TEXT NOT NULL DEFAULT 'DRAFT'
    )",
    "CREATE TABLE IF NOT EXISTS license_customers (
        license_id  TEXT NOT NULL,
        customer_id TEXT NOT NULL,
        PRIMARY KEY (license_id, customer_id)
    )",
    "CREATE TABLE IF NOT EXISTS license_products (
        license_id TEXT NOT NULL,
        product_id TEXT NOT NULL,
        PRIMARY KEY (license_id, product_id)
    )",
    "CREATE TABLE IF NOT EXISTS blacklist (
        id      TEXT PRIMARY KEY,
        team_id TEXT NOT NULL,
        kind    TEXT NOT NULL,
        value   TEXT NOT NULL,
        hits    INTEGER NOT NULL DEFAULT 0,
        UNIQUE (team_id, kind, value)
    )",
    "CREATE TABLE IF NOT EXISTS devices (
        license_id        TEXT NOT NULL,
        device_identifier TEXT NOT NULL,
        last_beat_at      TEXT NOT NULL,
        ip_address        TEXT,
        country           TEXT,
        PRIMARY KEY (license_id, device_identifier)
    )",
    "CREATE TABLE IF NOT EXISTS request_logs (
        id                 TEXT PRIMARY KEY,
        team_id            TEXT NOT NULL,
        license_id         TEXT,
        license_key_lookup TEXT,
        customer_id        TEXT,
        product_id         TEXT,
        release_id         TEXT,
        device_identifier  TEXT,
        ip_address         TEXT,
        country            TEXT,
        status             TEXT NOT NULL,
        status_code        INTEGER NOT NULL,
        created_at         TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_request_logs_license_created \
        ON request_logs (license_id, created_at)",
];

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS teams (
        id         TEXT PRIMARY KEY,
        name       TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS team_settings (
        team_id                TEXT PRIMARY KEY,
        strict_customers       BOOLEAN NOT NULL DEFAULT FALSE,
        strict_products        BOOLEAN NOT NULL DEFAULT FALSE,
        strict_releases        BOOLEAN NOT NULL DEFAULT FALSE,
        ip_limit_period        TEXT NOT NULL DEFAULT 'DAY',
        device_timeout_minutes BIGINT NOT NULL DEFAULT 60
    )",
    "CREATE TABLE IF NOT EXISTS team_key_pairs (
        team_id     TEXT PRIMARY KEY,
        private_key BYTEA NOT NULL,
        public_key  BYTEA NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS licenses (
        id                    TEXT PRIMARY KEY,
        team_id               TEXT NOT NULL,
        license_key_lookup    TEXT NOT NULL,
        license_key_encrypted TEXT NOT NULL,
        suspended             BOOLEAN NOT NULL DEFAULT FALSE,
        expiration_type       TEXT NOT NULL DEFAULT 'NEVER',
        expiration_date       TIMESTAMP,
        expiration_days       BIGINT,
        ip_limit              BIGINT,
        seats                 BIGINT,
        created_at            TIMESTAMP NOT NULL,
        UNIQUE (team_id, license_key_lookup)
    )",
    "CREATE TABLE IF NOT EXISTS customers (
        id      TEXT PRIMARY KEY,
        team_id TEXT NOT NULL,
        name    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS products (
        id      TEXT PRIMARY KEY,
        team_id TEXT NOT NULL,
        name    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS releases (
        id         TEXT PRIMARY KEY,
        product_id TEXT NOT NULL,
        version    TEXT NOT NULL,
        status     TEXT NOT NULL DEFAULT 'DRAFT'
    )",
    "CREATE TABLE IF NOT EXISTS license_customers (
        license_id  TEXT NOT NULL,
        customer_id TEXT NOT NULL,
        PRIMARY KEY (license_id, customer_id)
    )",
    "CREATE TABLE IF NOT EXISTS license_products (
        license_id TEXT NOT NULL,
        product_id TEXT NOT NULL,
        PRIMARY KEY (license_id, product_id)
    )",
    "CREATE TABLE IF NOT EXISTS blacklist (
        id      TEXT PRIMARY KEY,
        team_id TEXT NOT NULL,
        kind    TEXT NOT NULL,
        value   TEXT NOT NULL,
        hits    BIGINT NOT NULL DEFAULT 0,
        UNIQUE (team_id, kind, value)
    )",
    "CREATE TABLE IF NOT EXISTS devices (
        license_id        TEXT NOT NULL,
        device_identifier TEXT NOT NULL,
        last_beat_at      TIMESTAMP NOT NULL,
        ip_address        TEXT,
        country           TEXT,
        PRIMARY KEY (license_id, device_identifier)
    )",
    "CREATE TABLE IF NOT EXISTS request_logs (
        id                 TEXT PRIMARY KEY,
        team_id            TEXT NOT NULL,
        license_id         TEXT,
        license_key_lookup TEXT,
        customer_id        TEXT,
        product_id         TEXT,
        release_id         TEXT,
        device_identifier  TEXT,
        ip_address         TEXT,
        country            TEXT,
        status             TEXT NOT NULL,
        status_code        BIGINT NOT NULL,
        created_at         TIMESTAMP NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_request_logs_license_created \
        ON request_logs (license_id, created_at)",
];

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

/// Group products and their published releases fetched as flat rows.
fn group_products(products: Vec<Product>, releases: Vec<Release>) -> Vec<ProductWithReleases> {
    products
        .into_iter()
        .map(|product| {
            let releases = releases
                .iter()
                .filter(|release| release.product_id == product.id)
                .cloned()
                .collect();
            ProductWithReleases { product, releases }
        })
        .collect()
}

fn db_error(context: &str, e: impl std::fmt::Display) -> EngineError {
    error!("{context}: {e}");
    EngineError::DatabaseError(format!("{context}: {e}"))
}

impl Database {
    /// Initialize the database connection based on configuration.
    ///
    /// Uses the global configuration from `config.toml` and environment
    /// variables. See `crate::config` for configuration options.
    pub async fn new() -> EngineResult<Arc<Self>> {
        let config = get_config()?;
        let db_config = &config.database;

        match db_config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePool::connect(&db_config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        EngineError::DatabaseError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(EngineError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPool::connect(&db_config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        EngineError::DatabaseError(format!("failed to connect to PostgreSQL: {e}"))
                    })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(EngineError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(EngineError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(&self) -> EngineResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                for statement in SQLITE_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(|e| db_error("SQLite migration failed", e))?;
                }
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                for statement in POSTGRES_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(|e| db_error("Postgres migration failed", e))?;
                }
            }
        }

        Ok(())
    }

    /// Connectivity probe for the health endpoint.
    pub async fn ping(&self) -> bool {
        let result: Result<i64, sqlx::Error> = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_scalar("SELECT 1").fetch_one(pool).await,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_scalar("SELECT 1").fetch_one(pool).await,
        };
        result.is_ok()
    }

    /// Backend name for diagnostics.
    pub fn db_type(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }

    /// Load the per-team snapshot: team, settings, key pair and blacklist,
    /// in one transaction.
    ///
    /// Returns:
    /// - `Ok(Some(TeamSnapshot))` if the team exists
    /// - `Ok(None)` if not found
    /// - `Err(EngineError::DatabaseError)` on DB failure or a team row
    ///   without its settings row
    pub async fn load_team_snapshot(&self, team_id: &str) -> EngineResult<Option<TeamSnapshot>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| db_error("SQLite begin failed", e))?;

                let team = query_as::<_, Team>(SQL_SELECT_TEAM)
                    .bind(team_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_error("SQLite team read failed", e))?;

                let Some(team) = team else {
                    return Ok(None);
                };

                let settings = query_as::<_, TeamSettings>(SQL_SELECT_SETTINGS)
                    .bind(team_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_error("SQLite settings read failed", e))?
                    .ok_or_else(|| {
                        db_error("team has no settings row", team_id)
                    })?;

                let key_pair = query_as::<_, TeamKeyPair>(SQL_SELECT_KEY_PAIR)
                    .bind(team_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_error("SQLite key pair read failed", e))?;

                let blacklist = query_as::<_, BlacklistEntry>(SQL_SELECT_BLACKLIST)
                    .bind(team_id)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("SQLite blacklist read failed", e))?;

                tx.commit()
                    .await
                    .map_err(|e| db_error("SQLite commit failed", e))?;

                Ok(Some(TeamSnapshot {
                    team,
                    settings,
                    key_pair,
                    blacklist,
                }))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| db_error("Postgres begin failed", e))?;

                let team = query_as::<_, Team>(SQL_SELECT_TEAM)
                    .bind(team_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_error("Postgres team read failed", e))?;

                let Some(team) = team else {
                    return Ok(None);
                };

                let settings = query_as::<_, TeamSettings>(SQL_SELECT_SETTINGS)
                    .bind(team_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_error("Postgres settings read failed", e))?
                    .ok_or_else(|| {
                        db_error("team has no settings row", team_id)
                    })?;

                let key_pair = query_as::<_, TeamKeyPair>(SQL_SELECT_KEY_PAIR)
                    .bind(team_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_error("Postgres key pair read failed", e))?;

                let blacklist = query_as::<_, BlacklistEntry>(SQL_SELECT_BLACKLIST)
                    .bind(team_id)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("Postgres blacklist read failed", e))?;

                tx.commit()
                    .await
                    .map_err(|e| db_error("Postgres commit failed", e))?;

                Ok(Some(TeamSnapshot {
                    team,
                    settings,
                    key_pair,
                    blacklist,
                }))
            }
        }
    }

    /// Load the per-license snapshot by lookup key, in one transaction:
    /// the license, its customers, its products with their PUBLISHED
    /// releases, the device heartbeat ledger, and the distinct IPs seen in
    /// request logs since `ip_cutoff`.
    pub async fn load_license_snapshot(
        &self,
        team_id: &str,
        lookup_key: &str,
        ip_cutoff: NaiveDateTime,
    ) -> EngineResult<Option<LicenseSnapshot>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| db_error("SQLite begin failed", e))?;

                let license = query_as::<_, License>(SQL_SELECT_LICENSE)
                    .bind(team_id)
                    .bind(lookup_key)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_error("SQLite license read failed", e))?;

                let Some(license) = license else {
                    return Ok(None);
                };

                let customers = query_as::<_, Customer>(SQL_SELECT_LICENSE_CUSTOMERS)
                    .bind(&license.id)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("SQLite customers read failed", e))?;

                let products = query_as::<_, Product>(SQL_SELECT_LICENSE_PRODUCTS)
                    .bind(&license.id)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("SQLite products read failed", e))?;

                let releases = query_as::<_, Release>(SQL_SELECT_PUBLISHED_RELEASES)
                    .bind(&license.id)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("SQLite releases read failed", e))?;

                let devices = query_as::<_, DeviceRecord>(SQL_SELECT_DEVICES)
                    .bind(&license.id)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("SQLite devices read failed", e))?;

                let recent_ips = query_scalar::<_, String>(SQL_SELECT_RECENT_IPS)
                    .bind(&license.id)
                    .bind(ip_cutoff)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("SQLite recent IPs read failed", e))?;

                tx.commit()
                    .await
                    .map_err(|e| db_error("SQLite commit failed", e))?;

                Ok(Some(LicenseSnapshot {
                    license,
                    customers,
                    products: group_products(products, releases),
                    devices,
                    recent_ips,
                }))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| db_error("Postgres begin failed", e))?;

                let license = query_as::<_, License>(SQL_SELECT_LICENSE)
                    .bind(team_id)
                    .bind(lookup_key)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_error("Postgres license read failed", e))?;

                let Some(license) = license else {
                    return Ok(None);
                };

                let customers = query_as::<_, Customer>(SQL_SELECT_LICENSE_CUSTOMERS)
                    .bind(&license.id)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("Postgres customers read failed", e))?;

                let products = query_as::<_, Product>(SQL_SELECT_LICENSE_PRODUCTS)
                    .bind(&license.id)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("Postgres products read failed", e))?;

                let releases = query_as::<_, Release>(SQL_SELECT_PUBLISHED_RELEASES)
                    .bind(&license.id)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("Postgres releases read failed", e))?;

                let devices = query_as::<_, DeviceRecord>(SQL_SELECT_DEVICES)
                    .bind(&license.id)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("Postgres devices read failed", e))?;

                let recent_ips = query_scalar::<_, String>(SQL_SELECT_RECENT_IPS)
                    .bind(&license.id)
                    .bind(ip_cutoff)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| db_error("Postgres recent IPs read failed", e))?;

                tx.commit()
                    .await
                    .map_err(|e| db_error("Postgres commit failed", e))?;

                Ok(Some(LicenseSnapshot {
                    license,
                    customers,
                    products: group_products(products, releases),
                    devices,
                    recent_ips,
                }))
            }
        }
    }

    /// Atomically increment a blacklist entry's hit counter by 1.
    ///
    /// The counter only ever grows; there is no reset path.
    pub async fn increment_blacklist_hits(&self, entry_id: &str) -> EngineResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(SQL_INCREMENT_HITS)
                    .bind(entry_id)
                    .execute(pool)
                    .await
                    .map_err(|e| db_error("SQLite hit increment failed", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(SQL_INCREMENT_HITS)
                    .bind(entry_id)
                    .execute(pool)
                    .await
                    .map_err(|e| db_error("Postgres hit increment failed", e))?;
            }
        }

        Ok(())
    }

    /// Set a DURATION license's expiration date, once.
    ///
    /// The `WHERE expiration_date IS NULL` guard makes this a set-once
    /// write: concurrent first-verifications race harmlessly and the first
    /// writer wins. Callers treat the verification as valid either way.
    pub async fn activate_duration_expiration(
        &self,
        license_id: &str,
        expires_at: NaiveDateTime,
    ) -> EngineResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(SQL_ACTIVATE_EXPIRATION)
                    .bind(expires_at)
                    .bind(license_id)
                    .execute(pool)
                    .await
                    .map_err(|e| db_error("SQLite expiration activation failed", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(SQL_ACTIVATE_EXPIRATION)
                    .bind(expires_at)
                    .bind(license_id)
                    .execute(pool)
                    .await
                    .map_err(|e| db_error("Postgres expiration activation failed", e))?;
            }
        }

        Ok(())
    }

    /// Create or refresh the heartbeat record for `(license, device)`.
    ///
    /// Atomic per key: concurrent heartbeats for the same identifier
    /// cannot create duplicates.
    pub async fn upsert_device_heartbeat(
        &self,
        license_id: &str,
        device_identifier: &str,
        last_beat_at: NaiveDateTime,
        ip_address: Option<&str>,
        country: Option<&str>,
    ) -> EngineResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(SQL_UPSERT_HEARTBEAT)
                    .bind(license_id)
                    .bind(device_identifier)
                    .bind(last_beat_at)
                    .bind(ip_address)
                    .bind(country)
                    .execute(pool)
                    .await
                    .map_err(|e| db_error("SQLite heartbeat upsert failed", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(SQL_UPSERT_HEARTBEAT)
                    .bind(license_id)
                    .bind(device_identifier)
                    .bind(last_beat_at)
                    .bind(ip_address)
                    .bind(country)
                    .execute(pool)
                    .await
                    .map_err(|e| db_error("Postgres heartbeat upsert failed", e))?;
            }
        }

        Ok(())
    }

    /// Append one verification attempt to the request log.
    pub async fn insert_request_log(&self, record: &OutcomeRecord) -> EngineResult<()> {
        let id = Uuid::new_v4().to_string();
        let status_code = record.outcome.status_code().as_u16() as i64;

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(SQL_INSERT_REQUEST_LOG)
                    .bind(&id)
                    .bind(&record.team_id)
                    .bind(&record.license_id)
                    .bind(&record.license_key_lookup)
                    .bind(&record.customer_id)
                    .bind(&record.product_id)
                    .bind(&record.release_id)
                    .bind(&record.device_identifier)
                    .bind(&record.ip_address)
                    .bind(&record.country)
                    .bind(record.outcome.code())
                    .bind(status_code)
                    .bind(record.created_at)
                    .execute(pool)
                    .await
                    .map_err(|e| db_error("SQLite request log insert failed", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(SQL_INSERT_REQUEST_LOG)
                    .bind(&id)
                    .bind(&record.team_id)
                    .bind(&record.license_id)
                    .bind(&record.license_key_lookup)
                    .bind(&record.customer_id)
                    .bind(&record.product_id)
                    .bind(&record.release_id)
                    .bind(&record.device_identifier)
                    .bind(&record.ip_address)
                    .bind(&record.country)
                    .bind(record.outcome.code())
                    .bind(status_code)
                    .bind(record.created_at)
                    .execute(pool)
                    .await
                    .map_err(|e| db_error("Postgres request log insert failed", e))?;
            }
        }

        Ok(())
    }
}
