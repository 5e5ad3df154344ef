//! Geocoding providers: the `Geocoder` capability and its Google Maps Platform backend.

use super::types::{Coordinate, LocationError, PlaceId};
use crate::config::Config;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Lookups delegated to a third-party mapping provider.
///
/// `Ok(None)` means the provider answered but had no match.
pub trait Geocoder: Send + Sync {
    fn by_place_id(&self, id: &PlaceId) -> Result<Option<Coordinate>, LocationError>;
    fn by_address(&self, text: &str) -> Result<Option<Coordinate>, LocationError>;
    fn reverse_geocode(&self, coord: Coordinate) -> Result<Option<PlaceId>, LocationError>;
    /// Canonical Maps URL for a place.
    fn details_url(&self, id: &PlaceId) -> Result<Option<String>, LocationError>;
}

// ─── Google Maps Platform ───────────────────────────────────────

const GOOGLE_API_BASE: &str = "https://maps.googleapis.com/maps/api";

#[derive(Deserialize, Debug)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize, Debug)]
struct GeocodeResult {
    #[serde(default)]
    place_id: Option<String>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Deserialize, Debug)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize, Debug)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize, Debug)]
struct DetailsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    result: Option<DetailsResult>,
}

#[derive(Deserialize, Debug)]
struct DetailsResult {
    #[serde(default)]
    url: Option<String>,
}

/// Google Geocoding + Places Details over blocking HTTP.
pub struct GoogleMaps {
    agent: ureq::Agent,
    api_key: String,
    base: String,
}

impl GoogleMaps {
    pub fn new(config: &Config) -> Result<Self, LocationError> {
        let api_key = config.api_key.clone().ok_or(LocationError::MissingApiKey)?;
        let agent = ureq::AgentBuilder::new()
            .timeout(config.fetch_timeout)
            .build();
        Ok(Self {
            agent,
            api_key,
            base: GOOGLE_API_BASE.to_string(),
        })
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T, LocationError> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("key", self.api_key.as_str()));

        let url = Url::parse_with_params(&format!("{}/{}", self.base, path), &query)
            .map_err(|e| LocationError::InvalidInput(e.to_string()))?;

        let response = match self.agent.get(url.as_str()).call() {
            Ok(r) => r,
            // The URL carries the key; report only the path.
            Err(ureq::Error::Status(status, _)) => {
                return Err(LocationError::HttpStatus { url: path.to_string(), status });
            }
            Err(e) => return Err(LocationError::Network(e.to_string())),
        };

        response
            .into_json()
            .map_err(|e| LocationError::InvalidResponse(e.to_string()))
    }
}

/// The Google backend when an API key is configured.
pub fn google_geocoder(config: &Config) -> Option<Arc<dyn Geocoder>> {
    match GoogleMaps::new(config) {
        Ok(g) => Some(Arc::new(g)),
        Err(e) => {
            debug!("google geocoder unavailable: {}", e);
            None
        }
    }
}

impl Geocoder for GoogleMaps {
    fn by_place_id(&self, id: &PlaceId) -> Result<Option<Coordinate>, LocationError> {
        debug!("geocode place_id={}", id);
        let resp: GeocodeResponse = self.get_json("geocode/json", &[("place_id", id.as_str())])?;
        geocode_location("Geocode by place_id failed", resp)
    }

    fn by_address(&self, text: &str) -> Result<Option<Coordinate>, LocationError> {
        debug!("geocode address={:?}", text);
        let resp: GeocodeResponse = self.get_json("geocode/json", &[("address", text)])?;
        geocode_location("Geocode by address failed", resp)
    }

    fn reverse_geocode(&self, coord: Coordinate) -> Result<Option<PlaceId>, LocationError> {
        let latlng = coord.to_string();
        let resp: GeocodeResponse = self.get_json("geocode/json", &[("latlng", latlng.as_str())])?;
        info!("reverse geocode {} -> status {}", latlng, resp.status);
        geocode_place_id(resp)
    }

    fn details_url(&self, id: &PlaceId) -> Result<Option<String>, LocationError> {
        let resp: DetailsResponse = self.get_json(
            "place/details/json",
            &[("place_id", id.as_str()), ("fields", "url")],
        )?;
        info!("place details {} -> status {}", id, resp.status);
        details_url_from(resp)
    }
}

/// `true` for results, `false` for an empty answer, `Err` for API failures.
fn check_status(operation: &str, status: &str, message: Option<String>) -> Result<bool, LocationError> {
    match status {
        "OK" => Ok(true),
        "ZERO_RESULTS" | "NOT_FOUND" => Ok(false),
        other => Err(LocationError::Upstream {
            operation: operation.to_string(),
            status: other.to_string(),
            message,
        }),
    }
}

fn geocode_location(operation: &str, resp: GeocodeResponse) -> Result<Option<Coordinate>, LocationError> {
    if !check_status(operation, &resp.status, resp.error_message)? {
        return Ok(None);
    }
    Ok(resp
        .results
        .into_iter()
        .filter_map(|r| r.geometry)
        .find_map(|g| Coordinate::new(g.location.lat, g.location.lng)))
}

fn geocode_place_id(resp: GeocodeResponse) -> Result<Option<PlaceId>, LocationError> {
    if !check_status("Reverse geocode failed", &resp.status, resp.error_message)? {
        return Ok(None);
    }
    Ok(resp.results.into_iter().find_map(|r| r.place_id.and_then(PlaceId::new)))
}

fn details_url_from(resp: DetailsResponse) -> Result<Option<String>, LocationError> {
    if resp.status != "OK" {
        return Err(LocationError::Upstream {
            operation: "Places Details failed".to_string(),
            status: resp.status,
            message: resp.error_message,
        });
    }
    Ok(resp.result.and_then(|r| r.url).filter(|u| !u.is_empty()))
}

// ─── Canonical place URL ────────────────────────────────────────

/// Canonical place link and the identifier it was looked up by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceUrl {
    pub url: String,
    #[serde(rename = "placeId")]
    pub place_id: PlaceId,
}

/// Canonical Maps URL for a place id, or for the place nearest to `coords`.
pub fn place_url(
    geocoder: &dyn Geocoder,
    place_id: Option<PlaceId>,
    coords: Option<Coordinate>,
) -> Result<PlaceUrl, LocationError> {
    let place_id = match (place_id, coords) {
        (Some(id), _) => id,
        (None, Some(c)) => geocoder.reverse_geocode(c)?.ok_or_else(|| LocationError::Upstream {
            operation: "Reverse geocode failed".to_string(),
            status: "ZERO_RESULTS".to_string(),
            message: None,
        })?,
        (None, None) => {
            return Err(LocationError::InvalidInput("Need place_id or lat,lng".into()));
        }
    };

    let url = geocoder
        .details_url(&place_id)?
        .ok_or_else(|| LocationError::NotFound(format!("canonical url for place {}", place_id)))?;

    Ok(PlaceUrl { url, place_id })
}
