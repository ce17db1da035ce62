//! Geolocation collaborator.
//!
//! Resolves a caller IP to an ISO country code for country blacklisting and
//! heartbeat records. Resolution failure is never fatal: the engine treats
//! an unresolvable country as "unknown" and skips the country check.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::config::GeoConfig;
use crate::errors::{EngineError, EngineResult};

/// Geolocation provider variants.
///
/// `Http` queries an ip-api style endpoint. `Disabled` always resolves to
/// unknown. `Fixed` pins every lookup to one answer and exists for tests
/// and air-gapped deployments.
#[derive(Debug, Clone)]
pub enum Geolocator {
    Http(HttpGeolocator),
    Disabled,
    Fixed(Option<String>),
}

/// HTTP-backed provider querying `{endpoint}/{ip}`.
#[derive(Debug, Clone)]
pub struct HttpGeolocator {
    client: reqwest::Client,
    endpoint: String,
}

/// Response shape of ip-api style providers. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

impl Geolocator {
    /// Construct a provider from configuration.
    ///
    /// The HTTP client carries a bounded timeout so a slow provider cannot
    /// stall the worker pool.
    pub fn from_config(config: &GeoConfig) -> EngineResult<Self> {
        if !config.enabled {
            return Ok(Geolocator::Disabled);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EngineError::GeoError(format!("failed to build HTTP client: {e}")))?;

        Ok(Geolocator::Http(HttpGeolocator {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        }))
    }

    /// Resolve the country code for an IP address.
    ///
    /// Returns `None` when the provider is disabled, the lookup fails, or
    /// the provider has no answer. Codes are normalized to uppercase.
    pub async fn resolve_country(&self, ip: &str) -> Option<String> {
        match self {
            Geolocator::Disabled => None,
            Geolocator::Fixed(country) => country.clone(),
            Geolocator::Http(provider) => provider.resolve(ip).await,
        }
    }
}

impl HttpGeolocator {
    async fn resolve(&self, ip: &str) -> Option<String> {
        let url = format!("{}/{}", self.endpoint, ip);

        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Geolocation lookup failed for {ip}: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                "Geolocation provider returned {} for {ip}",
                response.status()
            );
            return None;
        }

        match response.json::<GeoResponse>().await {
            Ok(body) => body
                .country_code
                .filter(|code| !code.is_empty())
                .map(|code| code.to_ascii_uppercase()),
            Err(e) => {
                warn!("Geolocation response parse failed for {ip}: {e}");
                None
            }
        }
    }
}
