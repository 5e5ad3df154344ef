use crate::location::{Geocoder, LinkResolver};
use std::sync::Arc;

/// Shared, read-only per process. Each request keeps its own scratch state.
pub struct AppState {
    pub resolver: LinkResolver,
    /// `None` when no API key is configured.
    pub geocoder: Option<Arc<dyn Geocoder>>,
}
