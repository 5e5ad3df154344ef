//! Core types for the location subsystem.

use serde::Serialize;
use std::fmt;

/// A latitude/longitude pair in decimal degrees.
///
/// Always finite and inside [-90, 90] x [-180, 180]; the only way to build one
/// is [`Coordinate::new`], which rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return None;
        }
        Some(Self { lat, lng })
    }

    /// Parse a pair of decimal strings. Malformed or out-of-range input yields `None`.
    pub fn parse(lat: &str, lng: &str) -> Option<Self> {
        let lat: f64 = lat.trim().parse().ok()?;
        let lng: f64 = lng.trim().parse().ok()?;
        Self::new(lat, lng)
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// Which cascade stage produced a coordinate. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionSource {
    /// Pattern found in the fully redirected link.
    Redirect,
    /// Pattern found in the embed markup of the redirected link.
    Embed,
    /// Pattern found after following the canonical `cid=` link.
    Cid,
    /// Pattern found in the embed markup of the canonical `cid=` link.
    CidEmbed,
    /// Geometry looked up by place identifier.
    PlaceDetails,
    /// Geometry looked up by free-text address.
    ReverseGeocode,
    /// Cascade exhausted.
    #[serde(rename = "none")]
    Unresolved,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redirect => write!(f, "redirect"),
            Self::Embed => write!(f, "embed"),
            Self::Cid => write!(f, "cid"),
            Self::CidEmbed => write!(f, "cid-embed"),
            Self::PlaceDetails => write!(f, "place-details"),
            Self::ReverseGeocode => write!(f, "reverse-geocode"),
            Self::Unresolved => write!(f, "none"),
        }
    }
}

/// Outcome of one resolution request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub source: ResolutionSource,
    pub coords: Option<Coordinate>,
    /// Set when the coordinate is a map viewport center rather than a pinned place.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub viewport: bool,
}

impl Resolution {
    pub fn found(source: ResolutionSource, coords: Coordinate) -> Self {
        Self { source, coords: Some(coords), viewport: false }
    }

    pub fn unresolved() -> Self {
        Self { source: ResolutionSource::Unresolved, coords: None, viewport: false }
    }
}

/// Result of a single outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub final_url: String,
    pub body: Option<String>,
}

/// Google `place_id`. Opaque; carries no geometry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PlaceId(String);

impl PlaceId {
    /// Returns `None` for blank input.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location resolution errors.
#[derive(Debug)]
pub enum LocationError {
    /// Missing or malformed caller input.
    InvalidInput(String),
    /// Connection, DNS, TLS or timeout failure.
    Network(String),
    /// Upstream answered with a non-success status.
    HttpStatus { url: String, status: u16 },
    /// Upstream body could not be decoded.
    InvalidResponse(String),
    /// Mapping API answered with a non-OK status field.
    Upstream {
        operation: String,
        status: String,
        message: Option<String>,
    },
    MissingApiKey,
    NotFound(String),
}

impl LocationError {
    /// Network failure or non-success HTTP status.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::HttpStatus { .. })
    }
}

impl fmt::Display for LocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::HttpStatus { url, status } => write!(f, "HTTP {} from {}", status, url),
            Self::InvalidResponse(msg) => write!(f, "Invalid API response: {}", msg),
            Self::Upstream { operation, status, message } => {
                write!(f, "{} (status {})", operation, status)?;
                if let Some(m) = message {
                    write!(f, ": {}", m)?;
                }
                Ok(())
            }
            Self::MissingApiKey => write!(f, "Missing API key (GOOGLE_MAPS_API_KEY)"),
            Self::NotFound(what) => write!(f, "Not found: {}", what),
        }
    }
}

impl std::error::Error for LocationError {}
