// File: lnnfc-core/src/config.rs
//
// Runtime settings from the environment (optionally seeded from a .env file).

use std::fmt;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use lnnfc_common::error::Error;

use crate::lnbits::{ApiKey, LnbitsSettings};
use crate::services::ProcessorConfig;

pub const DEFAULT_TAG_TITLE: &str = "Lightning Gift Card";
pub const DEFAULT_TRANSPORT: &str = "simulator";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Clone)]
pub struct AppConfig {
    pub lnbits: LnbitsSettings,
    pub nfc_transport: String,
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub log_level: String,
    pub admin_pin: Option<String>,
    pub default_tag_uses: u32,
    pub default_tag_title: String,
    pub use_bech32: bool,
    /// Dedup cooldown for the daemon.
    pub rate_limit: Duration,
    pub poll_interval: Duration,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("lnbits", &self.lnbits)
            .field("nfc_transport", &self.nfc_transport)
            .field("log_level", &self.log_level)
            .field("admin_pin", &self.admin_pin.as_ref().map(|_| "***"))
            .field("default_tag_uses", &self.default_tag_uses)
            .field("default_tag_title", &self.default_tag_title)
            .field("use_bech32", &self.use_bech32)
            .field("rate_limit", &self.rate_limit)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

fn normalize_log_level(raw: &str) -> Result<String, Error> {
    let level = match raw.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" => "error".to_string(),
        other => other.to_string(),
    };
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(Error::Config(format!(
            "LOG_LEVEL must be one of {}, got '{raw}'",
            LOG_LEVELS.join(", ")
        )))
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, Error> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key} must be true or false, got '{raw}'"))),
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, Error> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(|| Error::Config(format!("{key} must be a non-negative number of seconds, got '{raw}'")))
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, Error> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{key} is not a valid number: '{raw}'")))
}

impl AppConfig {
    /// Loads `env_file` (or `./.env` if present) into the process
    /// environment, then reads the settings from it.
    pub fn load(env_file: Option<&Path>) -> Result<Self, Error> {
        match env_file {
            Some(path) => {
                dotenv::from_path(path)
                    .map_err(|e| Error::Config(format!("could not load {}: {e}", path.display())))?;
                debug!("Loaded environment from {}", path.display());
            }
            None => {
                if let Ok(path) = dotenv::dotenv() {
                    debug!("Loaded environment from {}", path.display());
                }
            }
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = get("LNBITS_URL").ok_or_else(|| Error::Config("LNBITS_URL is required".into()))?;
        let parsed = url::Url::parse(base_url.trim())
            .map_err(|e| Error::Config(format!("LNBITS_URL is not a valid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config("LNBITS_URL must start with http:// or https://".into()));
        }

        let api_key = get("LNBITS_API_KEY").ok_or_else(|| Error::Config("LNBITS_API_KEY is required".into()))?;

        let mut lnbits = LnbitsSettings::new(base_url.trim(), ApiKey::new(api_key.trim()));
        if let Some(raw) = get("LNBITS_TIMEOUT_SECS") {
            lnbits.timeout = parse_secs("LNBITS_TIMEOUT_SECS", &raw)?;
            if lnbits.timeout.is_zero() {
                return Err(Error::Config("LNBITS_TIMEOUT_SECS must be positive".into()));
            }
        }
        if let Some(raw) = get("LNBITS_READ_RETRIES") {
            lnbits.read_retries = parse_num("LNBITS_READ_RETRIES", &raw)?;
        }

        let default_tag_uses = match get("DEFAULT_TAG_USES") {
            Some(raw) => parse_num::<u32>("DEFAULT_TAG_USES", &raw)?,
            None => 1,
        };
        if default_tag_uses < 1 {
            return Err(Error::Config("DEFAULT_TAG_USES must be at least 1".into()));
        }

        let poll_interval = match get("POLL_INTERVAL") {
            Some(raw) => parse_secs("POLL_INTERVAL", &raw)?,
            None => Duration::from_millis(500),
        };
        if poll_interval.is_zero() {
            return Err(Error::Config("POLL_INTERVAL must be positive".into()));
        }

        Ok(Self {
            lnbits,
            nfc_transport: get("NFC_TRANSPORT").unwrap_or_else(|| DEFAULT_TRANSPORT.to_string()),
            log_level: normalize_log_level(&get("LOG_LEVEL").unwrap_or_else(|| "info".into()))?,
            admin_pin: get("ADMIN_PIN"),
            default_tag_uses,
            default_tag_title: get("DEFAULT_TAG_TITLE").unwrap_or_else(|| DEFAULT_TAG_TITLE.to_string()),
            use_bech32: match get("LNURL_USE_BECH32") {
                Some(raw) => parse_bool("LNURL_USE_BECH32", &raw)?,
                None => true,
            },
            rate_limit: match get("RATE_LIMIT_SECONDS") {
                Some(raw) => parse_secs("RATE_LIMIT_SECONDS", &raw)?,
                None => Duration::from_secs(2),
            },
            poll_interval,
        })
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            poll_interval: self.poll_interval,
            cooldown: self.rate_limit,
        }
    }

    /// Gate for commands that spend or destroy value. Open when no PIN is set.
    pub fn check_admin_pin(&self, supplied: Option<&str>) -> Result<(), Error> {
        let Some(expected) = self.admin_pin.as_deref() else {
            return Ok(());
        };
        match supplied {
            Some(pin) if pin.trim() == expected => Ok(()),
            Some(_) => Err(Error::Auth("invalid admin PIN".into())),
            None => Err(Error::Auth("this command requires the admin PIN (--pin)".into())),
        }
    }
}
