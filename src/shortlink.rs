//! Short share tokens: `"<lat>,<lng>"` as unpadded base64url.
//!
//! Stateless. A token decodes back to the coordinate it was built from, up to
//! the precision of the decimal text.

use crate::location::Coordinate;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

/// Zoom used for the canonical map link a token redirects to.
const SHARE_ZOOM: u8 = 18;

pub fn encode(coord: &Coordinate) -> String {
    URL_SAFE_NO_PAD.encode(coord.to_string())
}

/// Decode a token. Anything not produced by [`encode`] yields `None`.
pub fn decode(token: &str) -> Option<Coordinate> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    let pad = (4 - token.len() % 4) % 4;
    let standard: String = token
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .chain(std::iter::repeat('=').take(pad))
        .collect();

    let bytes = STANDARD.decode(standard).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let (lat, lng) = text.split_once(',')?;
    Coordinate::parse(lat, lng)
}

/// Map link a token redirects to.
pub fn map_url(coord: &Coordinate) -> String {
    format!(
        "https://www.google.com/maps/@{},{},{}z",
        coord.lat(),
        coord.lng(),
        SHARE_ZOOM
    )
}

/// Relative share link served by the redirect handler.
pub fn share_path(token: &str) -> String {
    format!("/api/short?t={}", token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn c(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    #[test]
    fn test_known_tokens() {
        assert_eq!(encode(&c(41.01, 28.98)), "NDEuMDEsMjguOTg");
        assert_eq!(encode(&c(-33.8688, 151.2093)), "LTMzLjg2ODgsMTUxLjIwOTM");
    }

    #[test]
    fn test_round_trip() {
        for (lat, lng) in [
            (0.0, 0.0),
            (41.0082, 28.9784),
            (-89.999999, 179.999999),
            (90.0, -180.0),
            (59.32932349999999, 18.0685808),
            (1e-7, -1e-7),
        ] {
            let token = encode(&c(lat, lng));
            assert!(token.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'));
            let back = decode(&token).unwrap();
            assert_abs_diff_eq!(back.lat(), lat, epsilon = 1e-6);
            assert_abs_diff_eq!(back.lng(), lng, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_decode_garbage_is_none() {
        for token in [
            "",
            "   ",
            "!!!!",
            "a",         // impossible length
            "YWJj",      // "abc"
            "MSx4",      // "1,x"
            "TmFOLDE",   // "NaN,1"
            "OTEsMA",    // "91,0"
            "MSwyLDM",   // "1,2,3"
            "NDEuMDEsMjguOTg==", // extra padding
            "/w",        // invalid utf-8
        ] {
            assert!(decode(token).is_none(), "token {:?} should not decode", token);
        }
    }

    #[test]
    fn test_decode_tolerates_existing_padding() {
        let back = decode("MSwyLjU=").unwrap(); // "1,2.5"
        assert_eq!((back.lat(), back.lng()), (1.0, 2.5));
        let back = decode("MSwy").unwrap(); // "1,2"
        assert_eq!((back.lat(), back.lng()), (1.0, 2.0));
    }

    #[test]
    fn test_map_url() {
        assert_eq!(map_url(&c(41.01, 28.98)), "https://www.google.com/maps/@41.01,28.98,18z");
        assert_eq!(share_path("abc"), "/api/short?t=abc");
    }
}
