//! Layered configuration for Argus.
//!
//! Values come from three sources, later ones overriding earlier:
//! built-in defaults, then an optional `config.toml`, then `ARGUS_*`
//! environment variables. The result is validated once and cached for the
//! process lifetime.
//!
//! # Environment Variables
//! - `ARGUS_SERVER_HOST` - Server bind address
//! - `ARGUS_SERVER_PORT` - Server port
//! - `ARGUS_DATABASE_TYPE` - Database type ("sqlite" or "postgres")
//! - `ARGUS_DATABASE_URL` - Database connection URL
//! - `ARGUS_LOOKUP_SECRET` - HMAC secret for license key lookup derivation
//! - `ARGUS_STORAGE_KEY` - Base64 AES-256 key for license keys at rest
//! - `ARGUS_GEO_ENABLED` - Enable geolocation lookups
//! - `ARGUS_GEO_ENDPOINT` - Geolocation provider base URL
//! - `ARGUS_GEO_TIMEOUT_MS` - Geolocation request timeout
//! - `ARGUS_RATE_LIMIT_ENABLED` - Enable per-IP rate limiting
//! - `ARGUS_VERIFY_RPM` - Verification endpoint requests per minute
//! - `ARGUS_RELEASE_MATCHING` - Enable the release/version matching axis
//! - `ARGUS_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{EngineError, EngineResult};

/// Process-wide configuration, loaded once.
static CONFIG: OnceLock<ArgusConfig> = OnceLock::new();

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArgusConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Cryptographic material configuration
    pub crypto: CryptoConfig,
    /// Geolocation collaborator configuration
    pub geo: GeoConfig,
    /// Per-IP rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Engine behavior toggles
    pub engine: EngineConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server binding.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Listen port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Store backend selection and connection URLs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Backend: "sqlite" or "postgres"
    pub db_type: String,
    /// Connection URL for the SQLite backend
    pub sqlite_url: String,
    /// Connection URL for the PostgreSQL backend
    pub postgres_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://argus.db".to_string(),
            postgres_url: "postgres://localhost/argus".to_string(),
        }
    }
}

/// Cryptographic material configuration.
///
/// The lookup secret keys the HMAC digest used to locate licenses without
/// ever persisting the raw key in searchable form. The storage key encrypts
/// raw license keys at rest and is only needed by provisioning tooling.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// HMAC secret for lookup key derivation (required, non-empty)
    pub lookup_secret: String,
    /// Base64-encoded 32-byte AES key for license keys at rest (optional)
    pub storage_key: String,
}

/// Geolocation collaborator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Enable country resolution for incoming requests
    pub enabled: bool,
    /// Base URL of the IP-to-country provider
    pub endpoint: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://ip-api.com/json".to_string(),
            timeout_ms: 1500,
        }
    }
}

/// Per-IP rate limiting configuration for the verification endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Verification endpoint: requests per minute per source IP
    pub verify_rpm: u32,
    /// Allow short bursts above the limit
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            verify_rpm: 60,
            burst_size: 5,
        }
    }
}

/// Engine behavior toggles.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Enable the release/version matching axis of the entitlement matcher
    pub release_matching: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            release_matching: true,
        }
    }
}

/// Tracing output configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit logs at all
    pub enabled: bool,
    /// Minimum level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

impl ArgusConfig {
    /// Load configuration from defaults, `config.toml` and environment.
    fn load() -> EngineResult<Self> {
        let builder = Config::builder()
            // Start with defaults
            .set_default("server.host", "127.0.0.1")
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("server.port", 8080)
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("database.db_type", "sqlite")
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("database.sqlite_url", "sqlite://argus.db")
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("database.postgres_url", "postgres://localhost/argus")
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("crypto.lookup_secret", "")
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("crypto.storage_key", "")
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("geo.enabled", false)
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("geo.endpoint", "http://ip-api.com/json")
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("geo.timeout_ms", 1500)
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("rate_limit.enabled", true)
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("rate_limit.verify_rpm", 60)
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("rate_limit.burst_size", 5)
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("engine.release_matching", true)
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("logging.enabled", true)
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_default("logging.level", "info")
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("ARGUS_SERVER_HOST").ok())
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option(
                "server.port",
                env::var("ARGUS_SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option("database.db_type", env::var("ARGUS_DATABASE_TYPE").ok())
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.sqlite_url",
                env::var("ARGUS_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.postgres_url",
                env::var("ARGUS_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option("crypto.lookup_secret", env::var("ARGUS_LOOKUP_SECRET").ok())
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option("crypto.storage_key", env::var("ARGUS_STORAGE_KEY").ok())
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option(
                "geo.enabled",
                env::var("ARGUS_GEO_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option("geo.endpoint", env::var("ARGUS_GEO_ENDPOINT").ok())
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option(
                "geo.timeout_ms",
                env::var("ARGUS_GEO_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option(
                "rate_limit.enabled",
                env::var("ARGUS_RATE_LIMIT_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option(
                "rate_limit.verify_rpm",
                env::var("ARGUS_VERIFY_RPM")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option(
                "engine.release_matching",
                env::var("ARGUS_RELEASE_MATCHING")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option(
                "logging.enabled",
                env::var("ARGUS_LOGGING_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| EngineError::ConfigError(e.to_string()))?
            .set_override_option("logging.level", env::var("ARGUS_LOG_LEVEL").ok())
            .map_err(|e| EngineError::ConfigError(e.to_string()))?;

        let settings = builder
            .build()
            .map_err(|e| EngineError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| EngineError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.server.port == 0 {
            return Err(EngineError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(EngineError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.crypto.lookup_secret.is_empty() {
            return Err(EngineError::ConfigError(
                "crypto.lookup_secret is required (set ARGUS_LOOKUP_SECRET)".to_string(),
            ));
        }

        // The storage key is optional, but when present it must decode to a
        // valid AES-256 key so misconfiguration surfaces at startup.
        if !self.crypto.storage_key.is_empty() {
            use base64::engine::general_purpose::STANDARD as B64;
            use base64::Engine;
            match B64.decode(&self.crypto.storage_key) {
                Ok(bytes) if bytes.len() == 32 => {}
                Ok(bytes) => {
                    return Err(EngineError::ConfigError(format!(
                        "crypto.storage_key must decode to 32 bytes, got {}",
                        bytes.len()
                    )));
                }
                Err(e) => {
                    return Err(EngineError::ConfigError(format!(
                        "crypto.storage_key is not valid base64: {e}"
                    )));
                }
            }
        }

        if self.rate_limit.enabled && self.rate_limit.verify_rpm == 0 {
            return Err(EngineError::ConfigError(
                "rate_limit.verify_rpm must be greater than 0 when rate limiting is enabled"
                    .to_string(),
            ));
        }

        if self.geo.enabled && self.geo.endpoint.is_empty() {
            return Err(EngineError::ConfigError(
                "geo.endpoint is required when geo.enabled is true".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(EngineError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the process-wide configuration, loading and validating it on first
/// access.
pub fn get_config() -> EngineResult<&'static ArgusConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = ArgusConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; the stored value wins.
    let _ = CONFIG.set(config.clone());

    Ok(CONFIG.get().expect("config was just set"))
}

/// Load configuration eagerly so startup fails on a bad configuration
/// instead of the first request.
pub fn init_config() -> EngineResult<&'static ArgusConfig> {
    get_config()
}
