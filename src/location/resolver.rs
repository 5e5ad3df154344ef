//! Link resolver: runs the fallback cascade.
//!
//! Link flow:  redirect → cid (+ cid embed) → embed → viewport center → geocoding → none
//! Text flow:  geocoding → none
//!
//! Cheapest and most precise first. Free-text geocoding can land somewhere
//! other than the pinned place, so it only runs when explicitly enabled.

use super::cid::{cid_url, extract_cid};
use super::extract::{extract_match, MatchKind};
use super::fetch::{append_embed_param, HttpFetcher, LinkFollower, UreqFetcher};
use super::providers::Geocoder;
use super::types::{Coordinate, LocationError, PlaceId, Resolution, ResolutionSource};
use crate::config::Config;
use log::{debug, info, warn};
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Redirect,
    Cid,
    Embed,
    ViewportCenter,
    Geocode,
}

const CASCADE: &[Stage] = &[
    Stage::Redirect,
    Stage::Cid,
    Stage::Embed,
    Stage::ViewportCenter,
    Stage::Geocode,
];

/// Parameters that may carry free text worth geocoding.
const ADDRESS_PARAMS: &[&str] = &["q", "query", "destination", "daddr"];
const PLACE_ID_PARAMS: &[&str] = &["place_id", "query_place_id"];

/// Per-request scratch state. Nothing here outlives one `resolve` call.
struct Attempt<'a> {
    input: &'a str,
    is_link: bool,
    final_url: Option<String>,
    /// First viewport center seen, held back until pinned stages are exhausted.
    viewport: Option<Resolution>,
}

/// The link resolver with its fallback pipeline.
pub struct LinkResolver {
    follower: LinkFollower,
    geocoder: Option<Arc<dyn Geocoder>>,
    allow_geocoding: bool,
    accept_viewport_center: bool,
}

impl LinkResolver {
    pub fn new(follower: LinkFollower, config: &Config) -> Self {
        Self {
            follower,
            geocoder: None,
            allow_geocoding: config.allow_geocoding,
            accept_viewport_center: config.accept_viewport_center,
        }
    }

    /// Production wiring: ureq transport plus an optional geocoder.
    pub fn from_config(config: &Config, geocoder: Option<Arc<dyn Geocoder>>) -> Self {
        let fetcher: Arc<dyn HttpFetcher> = Arc::new(UreqFetcher::new(config));
        let mut resolver = Self::new(LinkFollower::new(fetcher, config), config);
        resolver.geocoder = geocoder;
        resolver
    }

    /// Attach the geocoding capability used by the last-resort stage.
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn set_geocoding(&mut self, allow: bool) {
        self.allow_geocoding = allow;
    }

    pub fn set_viewport_center(&mut self, accept: bool) {
        self.accept_viewport_center = accept;
    }

    pub fn follower(&self) -> &LinkFollower {
        &self.follower
    }

    /// Resolve a map link (or, with geocoding on, a free-text address).
    ///
    /// An exhausted cascade is `Ok` with source `none`. A stage that fails just
    /// hands over to the next one. If the input link itself could not be
    /// fetched and no other stage found anything, that transport error is
    /// returned instead.
    pub fn resolve(&self, input: &str) -> Result<Resolution, LocationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LocationError::InvalidInput("No url provided".into()));
        }

        let mut attempt = Attempt {
            input,
            is_link: is_http_url(input),
            final_url: None,
            viewport: None,
        };
        info!("resolve: incoming {}", input);

        let mut unreachable = None;
        for &stage in CASCADE {
            match self.run(stage, &mut attempt) {
                Ok(Some(resolution)) => {
                    info!(
                        "resolve: {:?} stage hit -> {} ({})",
                        stage,
                        resolution.coords.map(|c| c.to_string()).unwrap_or_default(),
                        resolution.source,
                    );
                    return Ok(resolution);
                }
                Ok(None) => debug!("resolve: {:?} stage missed", stage),
                Err(e) if stage == Stage::Redirect => {
                    warn!("resolve: input link unreachable: {}", e);
                    unreachable = Some(e);
                }
                Err(e) => warn!("resolve: {:?} stage failed: {}", stage, e),
            }
        }

        if let Some(e) = unreachable {
            return Err(e);
        }
        info!("resolve: no coordinates for {}", input);
        Ok(Resolution::unresolved())
    }

    fn run(&self, stage: Stage, attempt: &mut Attempt<'_>) -> Result<Option<Resolution>, LocationError> {
        match stage {
            Stage::Redirect => self.redirect_stage(attempt),
            Stage::Cid => self.cid_stage(attempt),
            Stage::Embed => self.embed_stage(attempt),
            Stage::ViewportCenter => Ok(if self.accept_viewport_center {
                attempt.viewport.take()
            } else {
                None
            }),
            Stage::Geocode => self.geocode_stage(attempt),
        }
    }

    fn redirect_stage(&self, attempt: &mut Attempt<'_>) -> Result<Option<Resolution>, LocationError> {
        if !attempt.is_link {
            return Ok(None);
        }
        let final_url = self.follower.follow_redirects(attempt.input)?;
        debug!("resolve: final redirect URL {}", final_url);
        let hit = inspect(&final_url, ResolutionSource::Redirect, attempt);
        attempt.final_url = Some(final_url);
        Ok(hit)
    }

    fn cid_stage(&self, attempt: &mut Attempt<'_>) -> Result<Option<Resolution>, LocationError> {
        let cid = extract_cid(attempt.input)
            .or_else(|| attempt.final_url.as_deref().and_then(extract_cid));
        let Some(cid) = cid else {
            return Ok(None);
        };
        debug!("resolve: cid detected {}", cid);

        let cid_final = self.follower.follow_redirects(&cid_url(&cid))?;
        if let Some(hit) = inspect(&cid_final, ResolutionSource::Cid, attempt) {
            return Ok(Some(hit));
        }

        let body = self.follower.fetch_body(&append_embed_param(&cid_final))?;
        Ok(inspect(&body, ResolutionSource::CidEmbed, attempt))
    }

    fn embed_stage(&self, attempt: &mut Attempt<'_>) -> Result<Option<Resolution>, LocationError> {
        let Some(final_url) = attempt.final_url.clone() else {
            return Ok(None);
        };
        let embed_url = append_embed_param(&final_url);
        debug!("resolve: embed url {}", embed_url);
        let body = self.follower.fetch_body(&embed_url)?;
        Ok(inspect(&body, ResolutionSource::Embed, attempt))
    }

    fn geocode_stage(&self, attempt: &mut Attempt<'_>) -> Result<Option<Resolution>, LocationError> {
        if !self.allow_geocoding {
            return Ok(None);
        }
        let Some(geocoder) = &self.geocoder else {
            warn!("resolve: geocoding enabled but no geocoder configured");
            return Ok(None);
        };

        if let Some(id) = place_id_hint(attempt) {
            debug!("resolve: place id hint {}", id);
            match geocoder.by_place_id(&id) {
                Ok(Some(c)) => return Ok(Some(Resolution::found(ResolutionSource::PlaceDetails, c))),
                Ok(None) => debug!("resolve: no geocode for place id {}", id),
                Err(e) => warn!("resolve: place id lookup failed, trying address: {}", e),
            }
        }

        let Some(text) = address_hint(attempt) else {
            return Ok(None);
        };
        debug!("resolve: geocoding text {:?}", text);
        Ok(geocoder
            .by_address(&text)?
            .map(|c: Coordinate| Resolution::found(ResolutionSource::ReverseGeocode, c)))
    }
}

/// Pinned matches resolve immediately; a viewport center is parked on the attempt.
fn inspect(text: &str, source: ResolutionSource, attempt: &mut Attempt<'_>) -> Option<Resolution> {
    let m = extract_match(text)?;
    match m.kind {
        MatchKind::Pinned => Some(Resolution::found(source, m.coord)),
        MatchKind::ViewportCenter => {
            if attempt.viewport.is_none() {
                debug!("resolve: holding viewport center {} from {}", m.coord, source);
                attempt.viewport = Some(Resolution {
                    source,
                    coords: Some(m.coord),
                    viewport: true,
                });
            }
            None
        }
    }
}

fn is_http_url(s: &str) -> bool {
    Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Final URL first, then the original input.
fn candidate_urls(attempt: &Attempt<'_>) -> Vec<Url> {
    if !attempt.is_link {
        return Vec::new();
    }
    attempt
        .final_url
        .as_deref()
        .into_iter()
        .chain(std::iter::once(attempt.input))
        .filter_map(|u| Url::parse(u).ok())
        .collect()
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, v)| k == key && !v.trim().is_empty())
        .map(|(_, v)| v.trim().to_string())
}

fn place_id_hint(attempt: &Attempt<'_>) -> Option<PlaceId> {
    for url in candidate_urls(attempt) {
        for key in PLACE_ID_PARAMS {
            if let Some(id) = query_value(&url, key).and_then(PlaceId::new) {
                return Some(id);
            }
        }
        // `q=place_id:ChIJ...`
        if let Some(id) = query_value(&url, "q")
            .and_then(|q| q.strip_prefix("place_id:").map(str::to_string))
            .and_then(PlaceId::new)
        {
            return Some(id);
        }
    }
    None
}

fn address_hint(attempt: &Attempt<'_>) -> Option<String> {
    if !attempt.is_link {
        return Some(attempt.input.to_string());
    }
    for url in candidate_urls(attempt) {
        for key in ADDRESS_PARAMS {
            if let Some(v) = query_value(&url, key).filter(|v| !v.starts_with("place_id:")) {
                return Some(v);
            }
        }
        if let Some(name) = place_name_from_path(&url) {
            return Some(name);
        }
    }
    None
}

/// `/maps/place/Galata+Tower/@...` → "Galata Tower".
fn place_name_from_path(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == "place")?;
    let raw = segments.next()?.replace('+', " ");
    let name = percent_decode_str(&raw).decode_utf8().ok()?.trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::fetch::testing::StaticFetcher;
    use crate::location::providers::testing::StaticGeocoder;
    use approx::assert_abs_diff_eq;

    const SHORT: &str = "https://maps.app.goo.gl/xyz";

    fn resolver(fetcher: StaticFetcher) -> (LinkResolver, Arc<StaticFetcher>) {
        let fetcher = Arc::new(fetcher);
        let config = Config::default();
        let follower = LinkFollower::new(fetcher.clone(), &config);
        (LinkResolver::new(follower, &config), fetcher)
    }

    fn assert_coords(res: &Resolution, lat: f64, lng: f64) {
        let c = res.coords.expect("expected coordinates");
        assert_abs_diff_eq!(c.lat(), lat, epsilon = 1e-9);
        assert_abs_diff_eq!(c.lng(), lng, epsilon = 1e-9);
    }

    #[test]
    fn test_redirect_stage_hit() {
        let (r, fetcher) = resolver(StaticFetcher::new().route(
            SHORT,
            "https://www.google.com/maps/place/X/@41.0082,28.9784,15z/data=!3d41.01!4d28.98",
            "",
        ));
        let res = r.resolve(SHORT).unwrap();
        assert_eq!(res.source, ResolutionSource::Redirect);
        assert!(!res.viewport);
        assert_coords(&res, 41.01, 28.98);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[test]
    fn test_embed_center_json() {
        let (r, _) = resolver(
            StaticFetcher::new()
                .route(SHORT, "https://www.google.com/maps/place/Somewhere", "")
                .route(
                    "https://www.google.com/maps/place/Somewhere?output=embed",
                    "https://www.google.com/maps/place/Somewhere?output=embed",
                    r#"<script>window.init({"center":{"lat":39.92,"lng":32.85}})</script>"#,
                ),
        );
        let res = r.resolve(SHORT).unwrap();
        assert_eq!(res.source, ResolutionSource::Embed);
        assert_coords(&res, 39.92, 32.85);
    }

    #[test]
    fn test_cid_stage_from_ftid() {
        let input = "https://www.google.com/maps?ftid=0x1:0x2a";
        let (r, fetcher) = resolver(
            StaticFetcher::new()
                .route(input, input, "")
                .route(
                    "https://maps.google.com/?cid=42",
                    "https://www.google.com/maps/place/Cafe/data=!3d1.5!4d2.5",
                    "",
                ),
        );
        let res = r.resolve(input).unwrap();
        assert_eq!(res.source, ResolutionSource::Cid);
        assert_coords(&res, 1.5, 2.5);
        assert_eq!(fetcher.calls(), vec![input.to_string(), "https://maps.google.com/?cid=42".to_string()]);
    }

    #[test]
    fn test_cid_embed_stage() {
        let input = "https://maps.google.com/?cid=42";
        let (r, _) = resolver(
            StaticFetcher::new()
                .route(input, "https://www.google.com/maps/place/Cafe", "")
                .route(
                    "https://www.google.com/maps/place/Cafe?output=embed",
                    "https://www.google.com/maps/place/Cafe?output=embed",
                    "[null,\"!3d-6.2088!4d106.8456\"]",
                ),
        );
        let res = r.resolve(input).unwrap();
        assert_eq!(res.source, ResolutionSource::CidEmbed);
        assert_coords(&res, -6.2088, 106.8456);
    }

    #[test]
    fn test_exhausted_cascade_is_none_not_error() {
        // Embed fetch is unreachable; that branch fails quietly.
        let (r, _) = resolver(StaticFetcher::new().route(SHORT, "https://www.google.com/maps/place/Nowhere", ""));
        let res = r.resolve(SHORT).unwrap();
        assert_eq!(res, Resolution::unresolved());
    }

    #[test]
    fn test_unreachable_input_is_transport_error() {
        let (r, _) = resolver(StaticFetcher::new());
        let err = r.resolve(SHORT).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_unreachable_input_still_tries_cid() {
        let input = "https://www.google.com/maps?ftid=0x1:0x2a";
        let (r, fetcher) = resolver(StaticFetcher::new().route(
            "https://maps.google.com/?cid=42",
            "https://www.google.com/maps/place/Cafe/data=!3d1.5!4d2.5",
            "",
        ));
        let res = r.resolve(input).unwrap();
        assert_eq!(res.source, ResolutionSource::Cid);
        assert_coords(&res, 1.5, 2.5);
        assert_eq!(fetcher.calls(), vec![input.to_string(), "https://maps.google.com/?cid=42".to_string()]);
    }

    #[test]
    fn test_unreachable_input_error_kept_when_cid_misses() {
        let input = "https://www.google.com/maps?cid=42";
        let (r, fetcher) = resolver(StaticFetcher::new());
        let err = r.resolve(input).unwrap_err();
        assert!(matches!(err, LocationError::Network(ref m) if m.contains(input)));
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[test]
    fn test_cid_failure_falls_through_to_embed() {
        let input = "https://www.google.com/maps/place/Cafe?cid=7";
        let final_url = "https://www.google.com/maps/place/Cafe/data=xyz";
        let embed = "https://www.google.com/maps/place/Cafe/data=xyz?output=embed";
        let (r, fetcher) = resolver(
            StaticFetcher::new()
                .route(input, final_url, "")
                .route(embed, embed, r#"<script>init({"center":{"lat":40.4168,"lng":-3.7038}})</script>"#),
        );
        let res = r.resolve(input).unwrap();
        assert_eq!(res.source, ResolutionSource::Embed);
        assert_coords(&res, 40.4168, -3.7038);
        assert!(fetcher.calls().contains(&"https://maps.google.com/?cid=7".to_string()));
    }

    #[test]
    fn test_empty_input_is_invalid() {
        let (r, _) = resolver(StaticFetcher::new());
        assert!(matches!(r.resolve("   "), Err(LocationError::InvalidInput(_))));
    }

    #[test]
    fn test_viewport_deferred_until_pinned_stages_miss() {
        let final_url = "https://www.google.com/maps/place/Louvre/@48.8606,2.3376,17z";
        let embed = "https://www.google.com/maps/place/Louvre/@48.8606,2.3376,17z?output=embed";

        let (r, _) = resolver(
            StaticFetcher::new()
                .route(SHORT, final_url, "")
                .route(embed, embed, r#"{"center":{"lat":48.8611,"lng":2.3364}}"#),
        );
        let res = r.resolve(SHORT).unwrap();
        assert_eq!(res.source, ResolutionSource::Embed);
        assert_coords(&res, 48.8611, 2.3364);

        let (r, _) = resolver(StaticFetcher::new().route(SHORT, final_url, "").route(embed, embed, "<html></html>"));
        let res = r.resolve(SHORT).unwrap();
        assert_eq!(res.source, ResolutionSource::Redirect);
        assert!(res.viewport);
        assert_coords(&res, 48.8606, 2.3376);
    }

    #[test]
    fn test_viewport_rejected_when_disabled() {
        let final_url = "https://www.google.com/maps/place/Louvre/@48.8606,2.3376,17z";
        let (mut r, _) = resolver(StaticFetcher::new().route(SHORT, final_url, ""));
        r.set_viewport_center(false);
        assert_eq!(r.resolve(SHORT).unwrap(), Resolution::unresolved());
    }

    #[test]
    fn test_free_text_needs_geocoding_opt_in() {
        let mut geo = StaticGeocoder::default();
        geo.by_address.insert("Eiffel Tower, Paris".into(), Coordinate::new(48.8584, 2.2945).unwrap());

        let (r, fetcher) = resolver(StaticFetcher::new());
        let mut r = r.with_geocoder(Arc::new(geo));
        assert_eq!(r.resolve("Eiffel Tower, Paris").unwrap(), Resolution::unresolved());

        r.set_geocoding(true);
        let res = r.resolve("Eiffel Tower, Paris").unwrap();
        assert_eq!(res.source, ResolutionSource::ReverseGeocode);
        assert_coords(&res, 48.8584, 2.2945);
        assert!(fetcher.calls().is_empty());
    }

    #[test]
    fn test_geocoding_place_id_hint() {
        let mut geo = StaticGeocoder::default();
        geo.by_id.insert("ChIJ1".into(), Coordinate::new(10.0, 20.0).unwrap());

        let (r, _) = resolver(
            StaticFetcher::new().route(SHORT, "https://www.google.com/maps/search/?api=1&query=Cafe&query_place_id=ChIJ1", ""),
        );
        let mut r = r.with_geocoder(Arc::new(geo));
        r.set_geocoding(true);
        let res = r.resolve(SHORT).unwrap();
        assert_eq!(res.source, ResolutionSource::PlaceDetails);
        assert_coords(&res, 10.0, 20.0);
    }

    #[test]
    fn test_place_id_failure_falls_back_to_address() {
        let mut geo = StaticGeocoder {
            fail_place_id: true,
            ..Default::default()
        };
        geo.by_id.insert("ChIJ1".into(), Coordinate::new(10.0, 20.0).unwrap());
        geo.by_address.insert("Galata Tower".into(), Coordinate::new(41.0256, 28.9742).unwrap());

        let (r, _) = resolver(StaticFetcher::new().route(
            SHORT,
            "https://www.google.com/maps/search/?api=1&query=Galata+Tower&query_place_id=ChIJ1",
            "",
        ));
        let mut r = r.with_geocoder(Arc::new(geo));
        r.set_geocoding(true);
        let res = r.resolve(SHORT).unwrap();
        assert_eq!(res.source, ResolutionSource::ReverseGeocode);
        assert_coords(&res, 41.0256, 28.9742);
    }

    #[test]
    fn test_geocoding_place_name_from_path() {
        let mut geo = StaticGeocoder::default();
        geo.by_address.insert("Galata Tower".into(), Coordinate::new(41.0256, 28.9742).unwrap());

        let (r, _) = resolver(StaticFetcher::new().route(SHORT, "https://www.google.com/maps/place/Galata+Tower/data=xyz", ""));
        let mut r = r.with_geocoder(Arc::new(geo));
        r.set_geocoding(true);
        let res = r.resolve(SHORT).unwrap();
        assert_eq!(res.source, ResolutionSource::ReverseGeocode);
        assert_coords(&res, 41.0256, 28.9742);
    }

    #[test]
    fn test_geocoder_failure_is_a_miss() {
        let geo = StaticGeocoder {
            fail_with_status: Some("OVER_QUERY_LIMIT".into()),
            ..Default::default()
        };
        let (r, _) = resolver(StaticFetcher::new());
        let mut r = r.with_geocoder(Arc::new(geo));
        r.set_geocoding(true);
        assert_eq!(r.resolve("some address").unwrap(), Resolution::unresolved());
    }
}
