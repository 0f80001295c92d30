//! Named-location resolution against the Nominatim search API.

use crate::error::MissionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
const USER_AGENT: &str = concat!("skipper/", env!("CARGO_PKG_VERSION"));

/// A location name turned into coordinates, kept in mission context for
/// substitution into later coordinate-taking steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub label: String,
}

/// Resolves freeform place names to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, location_name: &str) -> Result<ResolvedLocation, MissionError>;
}

/// Geocoder backed by a Nominatim instance.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: String,
}

impl NominatimGeocoder {
    pub fn new() -> Result<Self, MissionError> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: &str) -> Result<Self, MissionError> {
        // Nominatim's usage policy requires an identifying User-Agent.
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| MissionError::Geocode(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn resolve(&self, location_name: &str) -> Result<ResolvedLocation, MissionError> {
        let hits: Vec<SearchHit> = self
            .client
            .get(&self.endpoint)
            .query(&[("q", location_name), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|err| MissionError::Geocode(format!("request failed: {err}")))?
            .error_for_status()
            .map_err(|err| MissionError::Geocode(format!("search rejected: {err}")))?
            .json()
            .await
            .map_err(|err| MissionError::Geocode(format!("malformed response: {err}")))?;

        let hit = hits.into_iter().next().ok_or_else(|| {
            MissionError::Geocode(format!("no results for {location_name:?}"))
        })?;

        let latitude_deg: f64 = hit
            .lat
            .parse()
            .map_err(|_| MissionError::Geocode(format!("bad latitude {:?}", hit.lat)))?;
        let longitude_deg: f64 = hit
            .lon
            .parse()
            .map_err(|_| MissionError::Geocode(format!("bad longitude {:?}", hit.lon)))?;

        debug!(
            query = location_name,
            latitude_deg, longitude_deg, "location resolved"
        );

        Ok(ResolvedLocation {
            latitude_deg,
            longitude_deg,
            label: hit.display_name,
        })
    }
}
