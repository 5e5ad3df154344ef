use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::location::{providers, Coordinate, LocationError, PlaceId, PlaceUrl, Resolution};
use crate::shortlink;

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    upstream_status: Option<String>,
    upstream_message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("{} {}", self.status.as_u16(), self.error);
        }
        let body = ApiErrorBody {
            error: self.error,
            code: self.status.as_u16(),
            status: self.upstream_status,
            message: self.upstream_message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<LocationError> for ApiError {
    fn from(e: LocationError) -> Self {
        let status = status_for(&e);
        match e {
            LocationError::Upstream { operation, status: upstream, message } => ApiError {
                status,
                error: operation,
                upstream_status: Some(upstream),
                upstream_message: message,
            },
            other => api_error(status, other.to_string()),
        }
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError {
        status,
        error: msg.into(),
        upstream_status: None,
        upstream_message: None,
    }
}

fn status_for(e: &LocationError) -> StatusCode {
    match e {
        LocationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        LocationError::NotFound(_) => StatusCode::NOT_FOUND,
        LocationError::Network(_)
        | LocationError::HttpStatus { .. }
        | LocationError::InvalidResponse(_)
        | LocationError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        LocationError::MissingApiKey => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Run blocking network work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, LocationError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("worker failed: {}", e)))?
        .map_err(ApiError::from)
}

fn required(value: Option<String>, msg: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, msg))
}

/// Raw query strings so a malformed number still gets the JSON error body.
fn coordinate(lat: Option<&str>, lng: Option<&str>) -> Result<Option<Coordinate>, ApiError> {
    fn present(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|v| !v.is_empty())
    }
    match (present(lat), present(lng)) {
        (Some(lat), Some(lng)) => Coordinate::parse(lat, lng).map(Some).ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, "Invalid coordinates. Lat: -90..90, Lng: -180..180")
        }),
        _ => Ok(None),
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// ─── GET /api/resolve ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UrlQuery {
    pub url: Option<String>,
}

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UrlQuery>,
) -> Result<Json<Resolution>, ApiError> {
    let start = Instant::now();
    let url = required(params.url, "No url provided")?;

    let input = url.clone();
    let resolution = blocking(move || state.resolver.resolve(&input)).await?;

    info!(
        "GET /api/resolve url={} -> {} ({:.1}ms)",
        url,
        resolution.source,
        elapsed_ms(start),
    );
    Ok(Json(resolution))
}

// ─── GET /api/short ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TokenQuery {
    pub t: Option<String>,
}

pub async fn short_redirect(Query(params): Query<TokenQuery>) -> Result<Response, ApiError> {
    let token = required(params.t, "Missing token t")?;
    let coord = shortlink::decode(&token)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Invalid coords in token"))?;

    let target = shortlink::map_url(&coord);
    info!("GET /api/short t={} -> {}", token, target);
    Ok((StatusCode::FOUND, [(header::LOCATION, target)]).into_response())
}

// ─── GET /api/shortlink ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct CoordQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShortlinkResponse {
    pub token: String,
    pub path: String,
    pub map_url: String,
}

pub async fn share_link(Query(params): Query<CoordQuery>) -> Result<Json<ShortlinkResponse>, ApiError> {
    let coord = coordinate(params.lat.as_deref(), params.lng.as_deref())?
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Provide 'lat' and 'lng' parameters"))?;

    let token = shortlink::encode(&coord);
    Ok(Json(ShortlinkResponse {
        path: shortlink::share_path(&token),
        map_url: shortlink::map_url(&coord),
        token,
    }))
}

// ─── GET /api/place-url ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct PlaceUrlQuery {
    pub place_id: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
}

pub async fn place_url(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PlaceUrlQuery>,
) -> Result<Json<PlaceUrl>, ApiError> {
    let start = Instant::now();
    let geocoder = state.geocoder.clone().ok_or(LocationError::MissingApiKey)?;
    let place_id = params.place_id.and_then(PlaceId::new);
    let coords = coordinate(params.lat.as_deref(), params.lng.as_deref())?;

    let found = blocking(move || providers::place_url(geocoder.as_ref(), place_id, coords)).await?;

    info!(
        "GET /api/place-url -> {} ({:.1}ms)",
        found.place_id,
        elapsed_ms(start),
    );
    Ok(Json(found))
}

// ─── GET /api/unshorten ──────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnshortenResponse {
    pub final_url: String,
}

pub async fn unshorten(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UrlQuery>,
) -> Result<Json<UnshortenResponse>, ApiError> {
    let url = required(params.url, "No url provided")?;
    let final_url = blocking(move || state.resolver.follower().unshorten(&url)).await?;
    Ok(Json(UnshortenResponse { final_url }))
}
