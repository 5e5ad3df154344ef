mod handlers;
mod state;

use axum::http::{header, HeaderValue};
use axum::routing::get;
use axum::Router;
use log::{info, warn};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

pub use state::AppState;

use crate::config::Config;
use crate::location::{google_geocoder, LinkResolver};

/// Wire the production fetcher and geocoder from `config`.
pub fn build_state(config: &Config) -> AppState {
    let geocoder = google_geocoder(config);
    if geocoder.is_none() {
        warn!("no Google Maps API key; /api/place-url and geocoding fallback disabled");
    }
    let resolver = LinkResolver::from_config(config, geocoder.clone());
    AppState { resolver, geocoder }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/resolve", get(handlers::resolve))
        .route("/api/short", get(handlers::short_redirect))
        .route("/api/shortlink", get(handlers::share_link))
        .route("/api/place-url", get(handlers::place_url))
        .route("/api/unshorten", get(handlers::unshorten))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

pub async fn start(config: &Config, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(build_state(config));
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("routepin server listening on http://{}", addr);
    axum::serve(listener, app).await
}
