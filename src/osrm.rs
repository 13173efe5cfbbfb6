//! OSRM HTTP adapter implementing [`TravelTimeProvider`] (spec.md §6): one
//! `/table/v1` call per `(from, to, mode)` pair, mapped onto whichever
//! OSRM profile the deployment runs under that mode.
//!
//! The matrix builder already falls back to a haversine estimate on any
//! `Err` from this adapter (spec.md §4.1), so failures here are reported,
//! never panicked on.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::GeoPoint;
use crate::traits::{TravelTimeMode, TravelTimeProvider};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub walk_profile: String,
    pub drive_profile: String,
    pub transit_profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            walk_profile: "foot".to_string(),
            drive_profile: "car".to_string(),
            // OSRM has no native transit profile; the car profile is the
            // closest stand-in most self-hosted deployments run.
            transit_profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

impl OsrmConfig {
    fn profile_for(&self, mode: TravelTimeMode) -> &str {
        match mode {
            TravelTimeMode::Walk => &self.walk_profile,
            TravelTimeMode::Drive => &self.drive_profile,
            TravelTimeMode::Transit => &self.transit_profile,
        }
    }
}

/// Async OSRM client, one HTTP round trip per `duration()` call against
/// the `/table/v1` endpoint with exactly two waypoints.
pub struct OsrmTravelTimeProvider {
    config: OsrmConfig,
    client: reqwest::Client,
}

impl OsrmTravelTimeProvider {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TravelTimeProvider for OsrmTravelTimeProvider {
    async fn duration(&self, from: GeoPoint, to: GeoPoint, mode: TravelTimeMode) -> Result<f64, String> {
        let coords = format!("{:.6},{:.6};{:.6},{:.6}", from.lng, from.lat, to.lng, to.lat);
        let url = format!(
            "{}/table/v1/{}/{}?annotations=duration",
            self.config.base_url,
            self.config.profile_for(mode),
            coords
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("osrm request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("osrm returned error status: {e}"))?;

        let body: OsrmTableResponse = response
            .json()
            .await
            .map_err(|e| format!("osrm response parse failed: {e}"))?;

        body.durations
            .and_then(|rows| rows.into_iter().next().and_then(|row| row.into_iter().nth(1)))
            .map(|seconds| seconds / 60.0)
            .ok_or_else(|| "osrm table response had no duration entry".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    durations: Option<Vec<Vec<f64>>>,
}
