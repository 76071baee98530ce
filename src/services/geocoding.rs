//! Mapping collaborator used by delivery tracking.
//!
//! [`MapsClient`] is the seam: tracking only ever talks to the trait, and
//! [`GoogleMapsClient`] is the production implementation over the Google
//! Maps web services. Every call is a single request with a fixed timeout and
//! no retries.

use crate::{config::AppConfig, errors::ServiceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ServiceError::ValidationError(format!(
                "latitude {} out of range [-90, 90]",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ServiceError::ValidationError(format!(
                "longitude {} out of range [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    fn as_param(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

impl From<(f64, f64)> for Coordinates {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedAddress {
    pub coordinates: Coordinates,
    pub formatted_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelEstimate {
    pub distance_km: f64,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    pub distance: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub distance_km: f64,
    pub distance_text: String,
    pub duration_minutes: f64,
    pub duration_text: String,
    pub start_address: String,
    pub end_address: String,
    pub polyline: String,
    pub steps: Vec<RouteStep>,
}

/// Geocoding and distance lookups.
///
/// Errors are `ExternalServiceError` when the service is unreachable or
/// answers with a non-OK status, and `UnresolvableLocation` when it answers
/// OK but finds nothing.
#[async_trait]
pub trait MapsClient: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeocodedAddress, ServiceError>;

    async fn reverse_geocode(&self, position: Coordinates) -> Result<String, ServiceError>;

    async fn distance_and_duration(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<TravelEstimate, ServiceError>;

    async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<RouteSummary, ServiceError>;
}

/// Whole minutes to cover `distance_km` at `average_speed_kmh`, never less than one.
pub fn eta_minutes(distance_km: f64, average_speed_kmh: f64) -> i64 {
    if average_speed_kmh.is_nan() || average_speed_kmh <= 0.0 || !distance_km.is_finite() {
        return 1;
    }
    let minutes = (distance_km * 60.0 / average_speed_kmh).floor() as i64;
    minutes.max(1)
}

#[derive(Debug, Clone)]
pub struct GoogleMapsConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub language: String,
    pub timeout: Duration,
}

impl From<&AppConfig> for GoogleMapsConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            api_key: cfg
                .google_maps_api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            base_url: cfg.maps_base_url.trim_end_matches('/').to_string(),
            language: cfg.maps_language.clone(),
            timeout: cfg.maps_request_timeout(),
        }
    }
}

/// Google Maps web services client.
#[derive(Debug, Clone)]
pub struct GoogleMapsClient {
    client: reqwest::Client,
    config: GoogleMapsConfig,
}

impl GoogleMapsClient {
    pub fn new(config: GoogleMapsConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let key = self.config.api_key.as_deref().ok_or_else(|| {
            ServiceError::ExternalServiceError("Google Maps API key is not configured".to_string())
        })?;

        let url = format!("{}/{}/json", self.config.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", key), ("language", self.config.language.as_str())])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, endpoint, "Maps request failed");
                ServiceError::ExternalServiceError(format!("maps {} request failed", endpoint))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "maps {} returned HTTP {}",
                endpoint,
                response.status()
            )));
        }

        response.json::<T>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("maps {} response: {}", endpoint, e))
        })
    }
}

fn check_status(endpoint: &str, status: &str) -> Result<(), ServiceError> {
    match status {
        "OK" => Ok(()),
        "ZERO_RESULTS" | "NOT_FOUND" => Err(ServiceError::UnresolvableLocation(format!(
            "maps {} found no results",
            endpoint
        ))),
        other => Err(ServiceError::ExternalServiceError(format!(
            "maps {} status {}",
            endpoint, other
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    text: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<DistanceMatrixRow>,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixRow {
    elements: Vec<DistanceMatrixElement>,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixElement {
    status: String,
    distance: Option<TextValue>,
    duration: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    legs: Vec<DirectionsLeg>,
    overview_polyline: Polyline,
}

#[derive(Debug, Deserialize)]
struct Polyline {
    points: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    distance: TextValue,
    duration: TextValue,
    start_address: String,
    end_address: String,
    #[serde(default)]
    steps: Vec<DirectionsStep>,
}

#[derive(Debug, Deserialize)]
struct DirectionsStep {
    html_instructions: String,
    distance: TextValue,
    duration: TextValue,
}

#[async_trait]
impl MapsClient for GoogleMapsClient {
    #[instrument(skip(self))]
    async fn geocode(&self, address: &str) -> Result<GeocodedAddress, ServiceError> {
        let body: GeocodeResponse = self
            .get("geocode", &[("address", address.to_string())])
            .await?;
        check_status("geocode", &body.status)?;

        let result = body.results.into_iter().next().ok_or_else(|| {
            ServiceError::UnresolvableLocation(format!("no geocoding result for {}", address))
        })?;
        debug!(formatted = %result.formatted_address, "Address geocoded");

        Ok(GeocodedAddress {
            coordinates: Coordinates::new(
                result.geometry.location.lat,
                result.geometry.location.lng,
            ),
            formatted_address: result.formatted_address,
        })
    }

    #[instrument(skip(self))]
    async fn reverse_geocode(&self, position: Coordinates) -> Result<String, ServiceError> {
        let body: GeocodeResponse = self
            .get("geocode", &[("latlng", position.as_param())])
            .await?;
        check_status("reverse geocode", &body.status)?;

        body.results
            .into_iter()
            .next()
            .map(|r| r.formatted_address)
            .ok_or_else(|| {
                ServiceError::UnresolvableLocation("no reverse geocoding result".to_string())
            })
    }

    #[instrument(skip(self))]
    async fn distance_and_duration(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<TravelEstimate, ServiceError> {
        let body: DistanceMatrixResponse = self
            .get(
                "distancematrix",
                &[
                    ("origins", origin.as_param()),
                    ("destinations", destination.as_param()),
                    ("mode", "driving".to_string()),
                ],
            )
            .await?;
        check_status("distancematrix", &body.status)?;

        let element = body
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.elements.into_iter().next())
            .ok_or_else(|| {
                ServiceError::ExternalServiceError("distancematrix returned no rows".to_string())
            })?;
        check_status("distancematrix element", &element.status)?;

        match (element.distance, element.duration) {
            (Some(distance), Some(duration)) => Ok(TravelEstimate {
                distance_km: distance.value / 1000.0,
                duration_minutes: duration.value / 60.0,
            }),
            _ => Err(ServiceError::ExternalServiceError(
                "distancematrix element without distance".to_string(),
            )),
        }
    }

    #[instrument(skip(self))]
    async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<RouteSummary, ServiceError> {
        let body: DirectionsResponse = self
            .get(
                "directions",
                &[
                    ("origin", origin.as_param()),
                    ("destination", destination.as_param()),
                    ("mode", "driving".to_string()),
                ],
            )
            .await?;
        check_status("directions", &body.status)?;

        let route = body.routes.into_iter().next().ok_or_else(|| {
            ServiceError::UnresolvableLocation("no route between points".to_string())
        })?;
        let polyline = route.overview_polyline.points;
        let leg = route.legs.into_iter().next().ok_or_else(|| {
            ServiceError::ExternalServiceError("directions route without legs".to_string())
        })?;

        Ok(RouteSummary {
            distance_km: leg.distance.value / 1000.0,
            distance_text: leg.distance.text,
            duration_minutes: leg.duration.value / 60.0,
            duration_text: leg.duration.text,
            start_address: leg.start_address,
            end_address: leg.end_address,
            polyline,
            steps: leg
                .steps
                .into_iter()
                .map(|step| RouteStep {
                    instruction: step.html_instructions,
                    distance: step.distance.text,
                    duration: step.duration.text,
                })
                .collect(),
        })
    }
}
