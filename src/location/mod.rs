//! Location intelligence subsystem for routepin.
//!
//! Pulls coordinates out of map links: offline pattern matching, CID
//! lookups, redirect and embed fetching, and an opt-in geocoding fallback.

pub mod cid;
pub mod extract;
pub mod fetch;
pub mod providers;
pub mod resolver;
pub mod types;

pub use cid::extract_cid;
pub use extract::{extract, extract_match, extract_pinned, MatchKind, PatternMatch};
pub use fetch::{append_embed_param, FetchOptions, HttpFetcher, LinkFollower, UreqFetcher};
pub use providers::{google_geocoder, place_url, Geocoder, GoogleMaps, PlaceUrl};
pub use resolver::LinkResolver;
pub use types::{Coordinate, FetchResult, LocationError, PlaceId, Resolution, ResolutionSource};
