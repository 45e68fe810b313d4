//! OpenRouteService directions adapter.
//!
//! Calls `GET {base_url}/v2/directions/{profile}?start=lng,lat&end=lng,lat` and reads the
//! first feature's line geometry. The credential travels in the `Authorization` header
//! and is only taken from configuration; pointing `base_url` at a proxy that adds it
//! server-side keeps it off the client entirely.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::{DispatchError, config::RoutingConfig, geo::GeoPoint};

use super::RouteProvider;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize, Debug)]
struct DirectionsResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize, Debug)]
struct Feature {
    geometry: Geometry,
}

#[derive(Deserialize, Debug)]
struct Geometry {
    #[serde(default)]
    coordinates: Vec<Vec<f64>>,
}

/// Route provider backed by the OpenRouteService HTTP API.
#[derive(Clone)]
pub struct OpenRouteServiceProvider {
    client: Client,
    base_url: String,
    profile: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenRouteServiceProvider {
    pub fn new(config: &RoutingConfig) -> Self {
        if config.api_key.is_none() {
            warn!("No routing API key configured, requests rely on a proxy adding one");
        }
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            profile: config.profile.clone(),
            api_key: config.api_key.clone(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn directions_url(&self) -> String {
        format!("{}/v2/directions/{}", self.base_url, self.profile)
    }

    fn lng_lat(point: GeoPoint) -> String {
        format!("{},{}", point.longitude, point.latitude)
    }

    /// Waypoints of the first path in the response, converted from `[lng, lat]` pairs.
    /// Malformed coordinates are skipped.
    fn parse_directions(response: DirectionsResponse) -> Vec<GeoPoint> {
        let Some(feature) = response.features.into_iter().next() else {
            return Vec::new();
        };
        feature
            .geometry
            .coordinates
            .into_iter()
            .filter(|pair| pair.len() >= 2)
            .map(|pair| GeoPoint::from_lng_lat([pair[0], pair[1]]))
            .filter(GeoPoint::is_finite)
            .collect()
    }
}

#[async_trait]
impl RouteProvider for OpenRouteServiceProvider {
    async fn route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<Vec<GeoPoint>, DispatchError> {
        let url = self.directions_url();
        debug!("Requesting directions {} -> {} from {}", origin, destination, url);

        let mut request = self
            .client
            .get(&url)
            .query(&[
                ("start", Self::lng_lat(origin)),
                ("end", Self::lng_lat(destination)),
            ])
            .timeout(self.timeout);

        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::RouteLookupFailed { source: e })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DispatchError::RouteLookupRejected {
                reason: format!("directions API error ({}): {}", status, body),
            });
        }

        let directions = response
            .json::<DirectionsResponse>()
            .await
            .map_err(|e| DispatchError::RouteLookupFailed { source: e })?;

        let points = Self::parse_directions(directions);
        debug!("Directions returned {} waypoints", points.len());
        Ok(points)
    }

    fn name(&self) -> &'static str {
        "openrouteservice"
    }
}
