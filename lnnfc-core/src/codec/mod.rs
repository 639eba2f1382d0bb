// File: lnnfc-core/src/codec/mod.rs
//
// Converts redemption references to and from the bytes stored on a tag.

pub mod lnurl;
pub mod ndef;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use lnnfc_common::Error;

pub use lnurl::{ReferenceKind, ReferenceParams};
pub use ndef::{NdefRecord, TagMessage, Tnf};

/// How the reference was stored on the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceEncoding {
    /// The URL itself in a URI record.
    Plain,
    /// `lightning:` followed by the bech32 LNURL.
    Lnurl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedClaim {
    /// Uppercase bech32 LNURL, the form LNbits issues.
    pub lnurl: String,
    /// Canonical URL form, comparable across encodings.
    pub url: String,
    pub encoding: ReferenceEncoding,
}

impl DecodedClaim {
    fn from_url(url: String, encoding: ReferenceEncoding) -> Option<Self> {
        let lnurl = lnurl::to_lnurl(&url).ok()?;
        Some(Self { lnurl, url, encoding })
    }

    /// True when `reference` (URL or LNURL, any case) names this claim.
    pub fn matches(&self, reference: &str) -> bool {
        lnurl::to_url(reference).is_ok_and(|url| url == self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceValidation {
    pub is_valid: bool,
    pub url: Option<String>,
    pub kind: ReferenceKind,
    pub error: Option<String>,
}

/// Summary of a raw tag image, including unparsable ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub size: usize,
    pub valid: bool,
    pub records: usize,
    pub record_types: Vec<String>,
    pub uri: Option<String>,
    pub text: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TagCodec;

impl TagCodec {
    pub fn new() -> Self {
        Self
    }

    /// Builds a one-record message for `reference` (URL or bech32 LNURL).
    pub fn encode(&self, reference: &str, use_alt_encoding: bool) -> Result<TagMessage, Error> {
        let url = lnurl::to_url(reference)?;
        Url::parse(&url).map_err(|e| Error::Codec(format!("reference is not a valid URL: {e}")))?;

        let uri = if use_alt_encoding {
            lnurl::lightning_uri(&url)?
        } else {
            url
        };
        debug!("Encoded reference as {} ({} chars)", if use_alt_encoding { "LNURL" } else { "URL" }, uri.len());
        Ok(TagMessage::new(vec![NdefRecord::uri(&uri)]))
    }

    /// First URI record that holds an http(s) URL or a valid LNURL.
    pub fn decode(&self, message: &TagMessage) -> Option<DecodedClaim> {
        message.uris().find_map(|uri| Self::classify(&uri))
    }

    /// Parses a raw tag image. `Err` only for structurally broken bytes.
    pub fn decode_bytes(&self, data: &[u8]) -> Result<Option<DecodedClaim>, Error> {
        let message = TagMessage::from_bytes(data)?;
        Ok(self.decode(&message))
    }

    pub fn validate(&self, reference: &str) -> ReferenceValidation {
        let invalid = |error: String| ReferenceValidation {
            is_valid: false,
            url: None,
            kind: ReferenceKind::Unknown,
            error: Some(error),
        };

        let raw = match lnurl::to_url(reference) {
            Ok(u) => u,
            Err(e) => return invalid(e.to_string()),
        };
        let url = match Url::parse(&raw) {
            Ok(u) => u,
            Err(e) => return invalid(format!("invalid URL: {e}")),
        };
        if url.host_str().is_none_or(str::is_empty) {
            return ReferenceValidation { url: Some(raw), ..invalid("URL has no host".into()) };
        }

        let kind = if lnurl::is_withdraw_url(&url) { ReferenceKind::Withdraw } else { ReferenceKind::Unknown };
        ReferenceValidation {
            is_valid: kind == ReferenceKind::Withdraw,
            url: Some(raw),
            kind,
            error: (kind != ReferenceKind::Withdraw).then(|| "not an LNURL-withdraw link".to_string()),
        }
    }

    pub fn describe(&self, data: &[u8]) -> MessageInfo {
        let mut info = MessageInfo {
            size: data.len(),
            valid: false,
            records: 0,
            record_types: Vec::new(),
            uri: None,
            text: None,
            error: None,
        };

        match TagMessage::from_bytes(data) {
            Ok(message) => {
                info.valid = !message.is_empty();
                info.records = message.records().len();
                info.record_types = message.records().iter().map(NdefRecord::kind_name).collect();
                info.uri = message.uris().next();
                info.text = message.records().iter().find_map(NdefRecord::as_text);
            }
            Err(e) => info.error = Some(e.to_string()),
        }
        info
    }

    fn classify(uri: &str) -> Option<DecodedClaim> {
        if lnurl::is_bech32_lnurl(uri) {
            let url = lnurl::to_url(uri).ok()?;
            return DecodedClaim::from_url(url, ReferenceEncoding::Lnurl);
        }
        let url = Url::parse(uri).ok()?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return None;
        }
        DecodedClaim::from_url(uri.to_string(), ReferenceEncoding::Plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://lnbits.example/withdraw/api/v1/lnurl/8Kd2";

    #[test]
    fn plain_variant_stores_the_url() {
        let codec = TagCodec::new();
        let msg = codec.encode(URL, false).unwrap();
        assert_eq!(msg.uris().next().as_deref(), Some(URL));
        let decoded = codec.decode(&msg).unwrap();
        assert_eq!(decoded.encoding, ReferenceEncoding::Plain);
        assert_eq!(decoded.url, URL);
        assert_eq!(decoded.lnurl, lnurl::to_lnurl(URL).unwrap());
    }

    #[test]
    fn alt_variant_is_lightning_uppercase_bech32() {
        let codec = TagCodec::new();
        let msg = codec.encode(URL, true).unwrap();
        let stored = msg.uris().next().unwrap();
        assert!(stored.starts_with("lightning:LNURL1"), "{stored}");
        assert_eq!(stored[10..], stored[10..].to_ascii_uppercase());

        let decoded = codec.decode(&msg).unwrap();
        assert_eq!(decoded.encoding, ReferenceEncoding::Lnurl);
        assert_eq!(decoded.url, URL);
        assert_eq!(format!("lightning:{}", decoded.lnurl), stored);
    }

    #[test]
    fn matches_any_form_of_the_same_link() {
        let codec = TagCodec::new();
        let decoded = codec.decode(&codec.encode(URL, true).unwrap()).unwrap();
        let bech = lnurl::to_lnurl(URL).unwrap();
        assert!(decoded.matches(URL));
        assert!(decoded.matches(&bech));
        assert!(decoded.matches(&bech.to_lowercase()));
        assert!(decoded.matches(&format!("LIGHTNING:{bech}")));
        assert!(!decoded.matches("https://lnbits.example/withdraw/api/v1/lnurl/other"));
        assert!(!decoded.matches("garbage"));
    }

    #[test]
    fn non_claim_uris_decode_to_none() {
        let codec = TagCodec::new();
        let msg = TagMessage::new(vec![NdefRecord::uri("tel:+15551234")]);
        assert_eq!(codec.decode(&msg), None);

        let msg = TagMessage::new(vec![NdefRecord::uri("lightning:LNURL1QQQQQQ")]);
        assert_eq!(codec.decode(&msg), None);

        assert_eq!(codec.decode(&TagMessage::empty()), None);
    }

    #[test]
    fn validation_needs_a_withdraw_marker() {
        let codec = TagCodec::new();
        let ok = codec.validate(URL);
        assert!(ok.is_valid);
        assert_eq!(ok.kind, ReferenceKind::Withdraw);

        let other = codec.validate("https://example.com/shop");
        assert!(!other.is_valid);
        assert_eq!(other.url.as_deref(), Some("https://example.com/shop"));

        let garbage = codec.validate("not a reference");
        assert!(!garbage.is_valid);
        assert!(garbage.error.is_some());
    }

    #[test]
    fn describe_reports_broken_images() {
        let codec = TagCodec::new();
        let info = codec.describe(&[0x03, 0x40, 0xD1]);
        assert!(!info.valid);
        assert!(info.error.is_some());

        let bytes = codec.encode(URL, false).unwrap().to_bytes().unwrap();
        let info = codec.describe(&bytes);
        assert!(info.valid);
        assert_eq!(info.records, 1);
        assert_eq!(info.record_types, vec!["uri".to_string()]);
        assert_eq!(info.uri.as_deref(), Some(URL));
    }
}
