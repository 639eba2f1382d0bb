// File: lnnfc-core/src/codec/lnurl.rs
//
// LNURL (LUD-01) helpers: bech32 <-> URL and withdraw-link recognition.

use std::collections::BTreeMap;

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use url::Url;

use lnnfc_common::Error;

pub const LNURL_HRP: &str = "lnurl";
pub const LIGHTNING_SCHEME: &str = "lightning:";

const WITHDRAW_PATH_MARKERS: [&str; 3] = ["/withdraw/", "/lnurl/withdraw", "/api/v1/lnurl"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Withdraw,
    Unknown,
}

/// Parsed view of a redemption reference, for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceParams {
    pub url: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub kind: ReferenceKind,
}

/// Returns the part after a case-insensitive `lightning:` scheme.
pub fn extract_from_uri(uri: &str) -> Option<&str> {
    let head = uri.get(..LIGHTNING_SCHEME.len())?;
    if head.eq_ignore_ascii_case(LIGHTNING_SCHEME) {
        Some(&uri[LIGHTNING_SCHEME.len()..])
    } else {
        None
    }
}

pub fn is_bech32_lnurl(reference: &str) -> bool {
    let s = reference.trim();
    let s = extract_from_uri(s).unwrap_or(s);
    s.get(..6).is_some_and(|h| h.eq_ignore_ascii_case("lnurl1"))
}

fn is_http_url(s: &str) -> bool {
    let bytes = s.as_bytes();
    let has_prefix = |prefix: &str| {
        bytes
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
    };
    has_prefix("http://") || has_prefix("https://")
}

/// Canonical URL form of a reference: a plain http(s) URL is returned
/// unchanged, a bech32 LNURL (with or without `lightning:`) is decoded.
pub fn to_url(reference: &str) -> Result<String, Error> {
    let s = reference.trim();
    let s = extract_from_uri(s).unwrap_or(s);

    if is_http_url(s) {
        return Ok(s.to_string());
    }
    if !is_bech32_lnurl(s) {
        return Err(Error::Codec(format!("'{}' is neither a URL nor an LNURL", format_for_display(s, 40))));
    }

    let lower = s.to_ascii_lowercase();
    let checked = CheckedHrpstring::new::<Bech32>(&lower)
        .map_err(|e| Error::Codec(format!("invalid bech32 LNURL: {e}")))?;
    if checked.hrp().to_lowercase() != LNURL_HRP {
        return Err(Error::Codec(format!("unexpected LNURL prefix '{}'", checked.hrp())));
    }

    let bytes: Vec<u8> = checked.byte_iter().collect();
    let url = String::from_utf8(bytes).map_err(|_| Error::Codec("LNURL does not decode to UTF-8".into()))?;
    if !is_http_url(&url) {
        return Err(Error::Codec("LNURL does not decode to an http(s) URL".into()));
    }
    Ok(url)
}

/// Uppercase bech32 LNURL for any reference form.
pub fn to_lnurl(reference: &str) -> Result<String, Error> {
    let url = to_url(reference)?;
    let hrp = Hrp::parse(LNURL_HRP).map_err(|e| Error::Codec(e.to_string()))?;
    let encoded = bech32::encode::<Bech32>(hrp, url.as_bytes())
        .map_err(|e| Error::Codec(format!("bech32 encoding failed: {e}")))?;
    Ok(encoded.to_ascii_uppercase())
}

pub fn lightning_uri(reference: &str) -> Result<String, Error> {
    Ok(format!("{LIGHTNING_SCHEME}{}", to_lnurl(reference)?))
}

pub fn is_withdraw_url(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    if WITHDRAW_PATH_MARKERS.iter().any(|m| path.contains(m)) {
        return true;
    }
    url.query_pairs().any(|(k, v)| k == "tag" && v == "withdrawRequest")
}

pub fn reference_params(reference: &str) -> Result<ReferenceParams, Error> {
    let raw = to_url(reference)?;
    let url = Url::parse(&raw)?;
    let query = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    Ok(ReferenceParams {
        kind: if is_withdraw_url(&url) { ReferenceKind::Withdraw } else { ReferenceKind::Unknown },
        scheme: url.scheme().to_string(),
        host: url.host_str().unwrap_or_default().to_string(),
        path: url.path().to_string(),
        query,
        url: raw,
    })
}

/// Shortens long references with a middle ellipsis.
pub fn format_for_display(reference: &str, max_len: usize) -> String {
    let count = reference.chars().count();
    if count <= max_len {
        return reference.to_string();
    }
    let half = max_len.saturating_sub(3) / 2;
    let head: String = reference.chars().take(half).collect();
    let tail: String = reference.chars().skip(count - half).collect();
    format!("{head}...{tail}")
}
