//! Numeric place identifier (CID) extraction.
//!
//! A `cid` parameter is passed through verbatim. An `ftid=0x<hex>:0x<hex>`
//! parameter carries the CID as its second hex group; that value routinely
//! exceeds 64 bits, so it is converted with an arbitrary-precision integer.

use num_bigint::BigUint;
use url::{form_urlencoded, Url};

/// Decimal CID from a `cid` or `ftid` query parameter.
pub fn extract_cid(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;

    if let Some((_, cid)) = parsed.query_pairs().find(|(k, _)| k == "cid") {
        let cid = cid.trim();
        if !cid.is_empty() {
            return Some(cid.to_string());
        }
    }

    let (_, ftid) = parsed.query_pairs().find(|(k, _)| k == "ftid")?;
    let (_, second) = ftid.split_once(':')?;
    hex_to_decimal(second)
}

/// `0x2eb1...` or `2eb1...` to a base-10 string.
pub fn hex_to_decimal(hex: &str) -> Option<String> {
    let digits = hex.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    if digits.is_empty() {
        return None;
    }
    BigUint::parse_bytes(digits.as_bytes(), 16).map(|n| n.to_str_radix(10))
}

/// Canonical link for a CID; follows to the place page.
pub fn cid_url(cid: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(cid.as_bytes()).collect();
    format!("https://maps.google.com/?cid={}", encoded)
}
