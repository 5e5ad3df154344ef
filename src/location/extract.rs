//! Offline coordinate extraction from map links and embed markup.
//!
//! Pinned rules, in priority order:
//!   1. `!3d<lat>!4d<lng>` anywhere in the text
//!   2. any query value containing `<lat>,<lng>`
//!   3. a path segment `[!]<lat>,<lng>`
//!   4. named parameters (`q`, `ll`, `query`, ...) holding a pair or exactly two numbers
//!   5. an inline `center: { lat: .., lng: .. }` fragment
//!
//! `@<lat>,<lng>` is the map viewport center, not the pinned place. It is only
//! reported after every pinned rule missed, tagged [`MatchKind::ViewportCenter`].

use super::types::Coordinate;
use log::debug;
use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::LazyLock;
use url::Url;

static THREE_D_FOUR_D: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!3d(-?\d+\.\d+)!4d(-?\d+\.\d+)").expect("valid !3d!4d regex"));
static PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+\.\d+),(-?\d+\.\d+)").expect("valid pair regex"));
static PATH_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([!@]?)(-?\d+\.\d+),(-?\d+\.\d+)").expect("valid path regex"));
static CENTER_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"center"?\s*:\s*\{\s*"?lat"?\s*:\s*(-?\d+(?:\.\d+)?)\s*,\s*"?lng"?\s*:\s*(-?\d+(?:\.\d+)?)"#)
        .expect("valid center regex")
});
// Trailing `,` `/` `z` or end keeps a zoom level from being read as a longitude.
static VIEWPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(-?\d+\.\d+),(-?\d+\.\d+)(?:[,/z]|$)").expect("valid viewport regex"));

/// Query parameters that commonly carry a location, checked in this order.
const COORD_PARAMS: &[&str] = &[
    "q", "ll", "query", "destination", "origin", "center", "location", "daddr", "saddr",
];

/// Whether a match is the pinned place or only where the map was looking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    Pinned,
    ViewportCenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PatternMatch {
    pub coord: Coordinate,
    pub kind: MatchKind,
}

struct Subject<'a> {
    text: &'a str,
    url: Option<Url>,
}

type Rule = fn(&Subject<'_>) -> Option<Coordinate>;

const PINNED_RULES: &[(&str, Rule)] = &[
    ("!3d!4d", three_d_four_d),
    ("query-value", any_query_value),
    ("path-segment", path_segment),
    ("named-param", named_params),
    ("center-json", center_json),
];

/// Best coordinate in `text`, falling back to the viewport center.
pub fn extract(text: &str) -> Option<Coordinate> {
    extract_match(text).map(|m| m.coord)
}

/// Like [`extract`] but never returns a viewport center.
pub fn extract_pinned(text: &str) -> Option<Coordinate> {
    match extract_match(text) {
        Some(PatternMatch { coord, kind: MatchKind::Pinned }) => Some(coord),
        _ => None,
    }
}

/// Run every rule and report which kind of match won.
pub fn extract_match(text: &str) -> Option<PatternMatch> {
    if text.trim().is_empty() {
        return None;
    }
    let subject = Subject {
        text,
        url: Url::parse(text.trim()).ok(),
    };

    for (name, rule) in PINNED_RULES {
        if let Some(coord) = rule(&subject) {
            debug!("pattern '{}' matched {}", name, coord);
            return Some(PatternMatch { coord, kind: MatchKind::Pinned });
        }
    }

    viewport_center(&subject).map(|coord| {
        debug!("only a viewport center matched: {}", coord);
        PatternMatch { coord, kind: MatchKind::ViewportCenter }
    })
}

fn pair(caps: &Captures<'_>, lat: usize, lng: usize) -> Option<Coordinate> {
    Coordinate::parse(caps.get(lat)?.as_str(), caps.get(lng)?.as_str())
}

fn first_pair(re: &Regex, haystack: &str) -> Option<Coordinate> {
    re.captures_iter(haystack).find_map(|caps| pair(&caps, 1, 2))
}

fn three_d_four_d(s: &Subject<'_>) -> Option<Coordinate> {
    first_pair(&THREE_D_FOUR_D, s.text)
}

fn any_query_value(s: &Subject<'_>) -> Option<Coordinate> {
    let url = s.url.as_ref()?;
    url.query_pairs().find_map(|(_, value)| first_pair(&PAIR, &value))
}

fn path_segment(s: &Subject<'_>) -> Option<Coordinate> {
    let url = s.url.as_ref()?;
    PATH_PAIR
        .captures_iter(url.path())
        .filter(|caps| caps.get(1).map_or("", |m| m.as_str()) != "@")
        .find_map(|caps| pair(&caps, 2, 3))
}

fn named_params(s: &Subject<'_>) -> Option<Coordinate> {
    let url = s.url.as_ref()?;
    for name in COORD_PARAMS {
        let Some((_, value)) = url.query_pairs().find(|(k, _)| k == name) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        if let Some(c) = first_pair(&PAIR, &value) {
            return Some(c);
        }
        let parts: Vec<&str> = value.split(',').collect();
        if let [lat, lng] = parts.as_slice() {
            if let Some(c) = Coordinate::parse(lat, lng) {
                return Some(c);
            }
        }
    }
    None
}

fn center_json(s: &Subject<'_>) -> Option<Coordinate> {
    first_pair(&CENTER_JSON, s.text)
}

fn viewport_center(s: &Subject<'_>) -> Option<Coordinate> {
    let from_path = s.url.as_ref().and_then(|url| {
        PATH_PAIR
            .captures_iter(url.path())
            .filter(|caps| caps.get(1).map_or("", |m| m.as_str()) == "@")
            .find_map(|caps| pair(&caps, 2, 3))
    });
    from_path.or_else(|| first_pair(&VIEWPORT, s.text))
}
