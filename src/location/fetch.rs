//! Outbound link fetching: redirect following, embed markup, unshortening.
//!
//! One attempt per call. Failures surface as [`LocationError::Network`] or
//! [`LocationError::HttpStatus`]; the resolver decides whether another branch
//! is worth trying.

use super::types::{FetchResult, LocationError};
use crate::config::Config;
use log::debug;
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use url::Url;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

static META_REFRESH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)url=([^"'>\s]+)"#).expect("valid meta refresh regex"));

/// Per-request options for [`HttpFetcher::get`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub follow_redirects: bool,
    pub user_agent: String,
    pub read_body: bool,
}

/// Generic HTTP GET transport.
pub trait HttpFetcher: Send + Sync {
    fn get(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult, LocationError>;
}

/// [`HttpFetcher`] over blocking ureq agents with a per-request timeout.
pub struct UreqFetcher {
    follow: ureq::Agent,
    direct: ureq::Agent,
}

impl UreqFetcher {
    pub fn new(config: &Config) -> Self {
        let build = |redirects: u32| {
            ureq::AgentBuilder::new()
                .timeout(config.fetch_timeout)
                .redirects(redirects)
                .build()
        };
        Self {
            follow: build(config.max_redirects),
            direct: build(0),
        }
    }
}

impl HttpFetcher for UreqFetcher {
    fn get(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult, LocationError> {
        let agent = if opts.follow_redirects { &self.follow } else { &self.direct };

        let response = match agent
            .get(url)
            .set("User-Agent", &opts.user_agent)
            .set("Accept", ACCEPT_HTML)
            .call()
        {
            Ok(r) => r,
            Err(ureq::Error::Status(status, _)) => {
                return Err(LocationError::HttpStatus { url: url.to_string(), status });
            }
            Err(e) => return Err(LocationError::Network(e.to_string())),
        };

        let final_url = response.get_url().to_string();
        let body = if opts.read_body {
            Some(
                response
                    .into_string()
                    .map_err(|e| LocationError::Network(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(FetchResult { final_url, body })
    }
}

/// Follows map links the way a browser would.
#[derive(Clone)]
pub struct LinkFollower {
    fetcher: Arc<dyn HttpFetcher>,
    user_agent: String,
    mobile_user_agent: String,
}

impl LinkFollower {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, config: &Config) -> Self {
        Self {
            fetcher,
            user_agent: config.user_agent.clone(),
            mobile_user_agent: config.mobile_user_agent.clone(),
        }
    }

    fn options(&self, read_body: bool) -> FetchOptions {
        FetchOptions {
            follow_redirects: true,
            user_agent: self.user_agent.clone(),
            read_body,
        }
    }

    /// Final URL after redirects, or `url` itself if the response names none.
    pub fn follow_redirects(&self, url: &str) -> Result<String, LocationError> {
        let result = self.fetcher.get(url, &self.options(false))?;
        debug!("followed {} -> {}", url, result.final_url);
        if result.final_url.is_empty() {
            Ok(url.to_string())
        } else {
            Ok(result.final_url)
        }
    }

    /// Full response body as text.
    pub fn fetch_body(&self, url: &str) -> Result<String, LocationError> {
        let result = self.fetcher.get(url, &self.options(true))?;
        Ok(result.body.unwrap_or_default())
    }

    /// Expand a short link to the URL it finally lands on.
    ///
    /// Uses the mobile agent. App-intent landings fall back to the page's
    /// meta-refresh target, and `google.com/url?q=...` style wrappers are
    /// unwrapped.
    pub fn unshorten(&self, url: &str) -> Result<String, LocationError> {
        let opts = FetchOptions {
            follow_redirects: true,
            user_agent: self.mobile_user_agent.clone(),
            read_body: true,
        };
        let result = self.fetcher.get(url, &opts)?;

        let mut final_url = result.final_url;
        if final_url.is_empty() || is_app_intent(&final_url) {
            if let Some(target) = result.body.as_deref().and_then(meta_refresh_target) {
                debug!("unshorten: meta refresh target {}", target);
                final_url = target;
            }
        }
        if final_url.is_empty() {
            final_url = url.to_string();
        }

        Ok(unwrap_redirector(&final_url).unwrap_or(final_url))
    }
}

/// Add `output=embed` unless an `output` parameter is already present.
/// Unparseable input comes back unchanged.
pub fn append_embed_param(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if !parsed.query_pairs().any(|(k, _)| k == "output") {
        parsed.query_pairs_mut().append_pair("output", "embed");
    }
    parsed.to_string()
}

fn is_app_intent(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("intent:") || lower.contains("comgooglemaps://")
}

fn meta_refresh_target(body: &str) -> Option<String> {
    let raw = META_REFRESH.captures(body)?.get(1)?.as_str();
    percent_decode_str(raw).decode_utf8().ok().map(|s| s.into_owned())
}

fn unwrap_redirector(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let inner = ["q", "url", "link"].iter().find_map(|key| {
        parsed
            .query_pairs()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.into_owned())
    })?;
    let lower = inner.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Some(inner)
    } else {
        None
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticFetcher;
    use super::*;

    fn follower(fetcher: StaticFetcher) -> LinkFollower {
        LinkFollower::new(Arc::new(fetcher), &Config::default())
    }

    #[test]
    fn test_append_embed_param() {
        assert_eq!(
            append_embed_param("https://www.google.com/maps/place/X"),
            "https://www.google.com/maps/place/X?output=embed"
        );
        assert_eq!(
            append_embed_param("https://maps.google.com/?cid=42"),
            "https://maps.google.com/?cid=42&output=embed"
        );
    }

    #[test]
    fn test_append_embed_param_idempotent() {
        for url in [
            "https://www.google.com/maps/place/X",
            "https://maps.google.com/?cid=42&output=classic",
            "https://example.com",
        ] {
            let once = append_embed_param(url);
            assert_eq!(append_embed_param(&once), once);
        }
    }

    #[test]
    fn test_append_embed_param_malformed_unchanged() {
        assert_eq!(append_embed_param("not a url"), "not a url");
        assert_eq!(append_embed_param(""), "");
    }

    #[test]
    fn test_follow_redirects_returns_final() {
        let f = follower(StaticFetcher::new().route(
            "https://maps.app.goo.gl/abc",
            "https://www.google.com/maps/place/X",
            "",
        ));
        assert_eq!(
            f.follow_redirects("https://maps.app.goo.gl/abc").unwrap(),
            "https://www.google.com/maps/place/X"
        );
    }

    #[test]
    fn test_follow_redirects_empty_final_keeps_input() {
        let f = follower(StaticFetcher::new().route("https://a.example/x", "", ""));
        assert_eq!(f.follow_redirects("https://a.example/x").unwrap(), "https://a.example/x");
    }

    #[test]
    fn test_fetch_failure_is_transport() {
        let f = follower(StaticFetcher::new());
        let err = f.fetch_body("https://down.example/").unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_fetch_body() {
        let f = follower(StaticFetcher::new().route("https://a.example/", "https://a.example/", "<html>hi</html>"));
        assert_eq!(f.fetch_body("https://a.example/").unwrap(), "<html>hi</html>");
    }

    #[test]
    fn test_unshorten_meta_refresh_on_intent() {
        let body = r#"<meta http-equiv="refresh" content="0; url=https%3A%2F%2Fwww.google.com%2Fmaps%2Fplace%2FX">"#;
        let f = follower(StaticFetcher::new().route(
            "https://maps.app.goo.gl/s",
            "intent://maps/place#Intent;scheme=https;end",
            body,
        ));
        assert_eq!(
            f.unshorten("https://maps.app.goo.gl/s").unwrap(),
            "https://www.google.com/maps/place/X"
        );
    }

    #[test]
    fn test_unshorten_unwraps_redirector() {
        let f = follower(StaticFetcher::new().route(
            "https://goo.gl/s",
            "https://www.google.com/url?sa=t&q=https://www.google.com/maps/@1.5,2.5,10z",
            "",
        ));
        assert_eq!(
            f.unshorten("https://goo.gl/s").unwrap(),
            "https://www.google.com/maps/@1.5,2.5,10z"
        );
    }

    #[test]
    fn test_unshorten_keeps_non_http_q() {
        let f = follower(StaticFetcher::new().route(
            "https://goo.gl/t",
            "https://www.google.com/maps?q=Eiffel+Tower",
            "",
        ));
        assert_eq!(
            f.unshorten("https://goo.gl/t").unwrap(),
            "https://www.google.com/maps?q=Eiffel+Tower"
        );
    }
}
