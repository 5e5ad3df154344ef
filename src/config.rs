//! Runtime configuration shared by the fetcher, geocoder and resolver.
//!
//! Built once at the edge (CLI flags / environment) and handed to each
//! component at construction.

use std::time::Duration;

/// Desktop browser UA. Maps serves redirect-free pages to unknown agents.
pub const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Mobile UA. Short links answer it with the full `/maps/...` URL more often.
pub const MOBILE_USER_AGENT: &str =
    "Mozilla/5.0 (Linux; Android 13; Mobile) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0 Mobile Safari/537.36";

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    /// Google Maps Platform key. Only the geocoding capability needs it.
    pub api_key: Option<String>,
    /// Upper bound for each outbound request, connect through body.
    pub fetch_timeout: Duration,
    pub max_redirects: u32,
    pub user_agent: String,
    pub mobile_user_agent: String,
    /// Allow the geocoding fallback after the link stages miss.
    pub allow_geocoding: bool,
    /// Accept an `@lat,lng` viewport center when nothing pinned is found.
    pub accept_viewport_center: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DESKTOP_USER_AGENT.to_string(),
            mobile_user_agent: MOBILE_USER_AGENT.to_string(),
            allow_geocoding: false,
            accept_viewport_center: true,
        }
    }
}

impl Config {
    /// Set the API key; blank strings count as absent.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_geocoding(mut self, allow: bool) -> Self {
        self.allow_geocoding = allow;
        self
    }

    pub fn with_viewport_center(mut self, accept: bool) -> Self {
        self.accept_viewport_center = accept;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_link_only() {
        let cfg = Config::default();
        assert!(!cfg.allow_geocoding);
        assert!(cfg.accept_viewport_center);
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(5));
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let cfg = Config::default().with_api_key(Some("   ".into()));
        assert!(cfg.api_key.is_none());
        let cfg = Config::default().with_api_key(Some(" abc ".into()));
        assert_eq!(cfg.api_key.as_deref(), Some("abc"));
    }
}
