// File: lnnfc-core/src/lnbits/mod.rs

pub mod client;

use std::fmt;
use std::time::Duration;

pub use client::LnbitsClient;

/// Wallet API key. Never printed, not even by `{:?}`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Clone)]
pub struct LnbitsSettings {
    /// Instance root, e.g. `https://legend.lnbits.com`, without trailing slash.
    pub base_url: String,
    pub api_key: ApiKey,
    pub timeout: Duration,
    /// Extra attempts for read-only calls after a network error or 5xx.
    pub read_retries: u32,
}

impl LnbitsSettings {
    pub fn new(base_url: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(30),
            read_retries: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_redacted() {
        let key = ApiKey::new("a3f9c0ffee");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
        assert_eq!(key.to_string(), "***");

        let settings = LnbitsSettings::new("https://lnbits.example/", key);
        assert_eq!(settings.base_url, "https://lnbits.example");
        assert!(!format!("{settings:?}").contains("a3f9c0ffee"));
    }
}
