// File: lnnfc-core/src/lnbits/client.rs
//
// HTTPS client for the LNbits wallet API and its withdraw extension.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use lnnfc_common::error::Error;
use lnnfc_common::models::claim::{ClaimRecord, CreateClaimRequest, WalletInfo, MSAT_PER_SAT};
use lnnfc_common::traits::ClaimService;

use super::LnbitsSettings;

const API_KEY_HEADER: &str = "x-api-key";
const LINKS_PATH: &str = "/withdraw/api/v1/links";
const WALLET_PATH: &str = "/api/v1/wallet";
const DEFAULT_RETRY_PAUSE: Duration = Duration::from_millis(500);

/// Body of `POST /withdraw/api/v1/links`. Amounts are in sats.
#[derive(Debug, Serialize)]
struct CreateLinkBody<'a> {
    title: &'a str,
    min_withdrawable: u64,
    max_withdrawable: u64,
    uses: u32,
    wait_time: u32,
    is_unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_url: Option<&'a str>,
}

/// Withdraw link as LNbits returns it (only the fields we use).
#[derive(Debug, Deserialize)]
struct WithdrawLinkJson {
    id: String,
    #[serde(default)]
    lnurl: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    max_withdrawable: u64,
    #[serde(default)]
    uses: u32,
    #[serde(default)]
    used: u32,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    created_at: Option<DateTime<Utc>>,
}

/// Older releases return a bare array, newer ones paginate.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LinkListJson {
    Bare(Vec<WithdrawLinkJson>),
    Paged {
        data: Vec<WithdrawLinkJson>,
        #[allow(dead_code)]
        total: Option<u64>,
    },
}

#[derive(Debug, Deserialize)]
struct WalletJson {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    /// msat
    #[serde(default)]
    balance: u64,
}

/// Unix seconds, RFC 3339 or `YYYY-MM-DD HH:MM:SS`; anything else is dropped.
fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .map(|n| n.and_utc())
            }),
        _ => None,
    })
}

impl WithdrawLinkJson {
    fn into_record(self) -> Result<ClaimRecord, Error> {
        let reference = match self.lnurl {
            Some(l) if !l.trim().is_empty() => l,
            _ => return Err(Error::remote(format!("withdraw link {} has no LNURL", self.id))),
        };
        if self.used > self.uses {
            return Err(Error::remote(format!(
                "withdraw link {} reports {} uses of {}",
                self.id, self.used, self.uses
            )));
        }
        Ok(ClaimRecord {
            id: self.id,
            redemption_reference: reference,
            amount_msat: self.max_withdrawable.saturating_mul(MSAT_PER_SAT),
            max_uses: self.uses,
            used_count: self.used,
            title: self.title,
            created_at: self.created_at,
        })
    }
}

enum Failure {
    /// Network error or 5xx; a read may be retried.
    Transient(Error),
    Fatal(Error),
}

impl Failure {
    fn into_inner(self) -> Error {
        match self {
            Failure::Transient(e) | Failure::Fatal(e) => e,
        }
    }
}

/// Encapsulates LNbits REST calls authenticated with one wallet key.
#[derive(Clone)]
pub struct LnbitsClient {
    http_client: Client,
    base_url: String,
    read_retries: u32,
    retry_pause: Duration,
}

impl LnbitsClient {
    pub fn new(settings: &LnbitsSettings) -> Result<Self, Error> {
        if settings.api_key.is_empty() {
            return Err(Error::Config("LNbits API key is empty".into()));
        }
        let parsed = url::Url::parse(&settings.base_url)?;
        match parsed.scheme() {
            "https" => {}
            "http" => warn!("LNbits URL {} is not using TLS; the API key travels in clear text", settings.base_url),
            other => return Err(Error::Config(format!("unsupported LNbits URL scheme '{other}'"))),
        }

        let mut key = HeaderValue::from_str(settings.api_key.expose())
            .map_err(|_| Error::Config("LNbits API key contains invalid header characters".into()))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("could not build HTTP client: {e}")))?;

        info!("LnbitsClient initialized for {}", settings.base_url);
        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            read_retries: settings.read_retries,
            retry_pause: DEFAULT_RETRY_PAUSE,
        })
    }

    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Cheap authenticated round trip used by `status`.
    pub async fn check_connection(&self) -> Result<(), Error> {
        self.get_wallet_info().await.map(|_| ())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>, context: &str) -> Result<Response, Failure> {
        let mut request = self.http_client.request(method, self.url(path));
        if let Some(b) = body {
            request = request.json(b);
        }

        let resp = request.send().await.map_err(|e| {
            let err = Error::from(e);
            if matches!(err, Error::RemoteService { status: Some(s), .. } if s < 500) {
                Failure::Fatal(err)
            } else {
                Failure::Transient(err)
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("detail").map(|d| d.as_str().map(str::to_string).unwrap_or_else(|| d.to_string())))
            .unwrap_or_else(|| text.chars().take(200).collect());
        let err = Error::remote_status(
            status.as_u16(),
            format!("LNbits: {context} returned HTTP {status}: {detail}"),
        );
        if status.is_server_error() {
            Err(Failure::Transient(err))
        } else {
            Err(Failure::Fatal(err))
        }
    }

    async fn parse<T: DeserializeOwned>(resp: Response, context: &str) -> Result<T, Failure> {
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await.map_err(|e| Failure::Transient(Error::from(e)))?;
        serde_json::from_slice::<T>(&bytes).map_err(|e| {
            Failure::Fatal(Error::remote_status(status, format!("LNbits: could not parse {context} response => {e}")))
        })
    }

    /// GET with the read-only retry policy.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<T, Error> {
        let mut attempt: u32 = 0;
        loop {
            let result = match self.send(Method::GET, path, None, context).await {
                Ok(resp) => Self::parse::<T>(resp, context).await,
                Err(f) => Err(f),
            };
            match result {
                Ok(v) => return Ok(v),
                Err(Failure::Transient(e)) if attempt < self.read_retries => {
                    attempt += 1;
                    warn!("LNbits: {context} failed ({e}); retry {attempt}/{}", self.read_retries);
                    tokio::time::sleep(self.retry_pause).await;
                }
                Err(f) => {
                    let e = f.into_inner();
                    error!("LNbits: {context} failed: {e}");
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl ClaimService for LnbitsClient {
    async fn create_claim(&self, request: &CreateClaimRequest) -> Result<ClaimRecord, Error> {
        request.validate()?;
        let sats = request.amount_sat();
        debug!("Creating withdraw link: {} sats, {} use(s)", sats, request.max_uses);

        let body = CreateLinkBody {
            title: &request.title,
            min_withdrawable: sats,
            max_withdrawable: sats,
            uses: request.max_uses,
            wait_time: request.wait_time_secs,
            is_unique: true,
            webhook_url: request.webhook_url.as_deref(),
        };
        let body = serde_json::to_value(&body)?;

        let resp = self
            .send(Method::POST, LINKS_PATH, Some(&body), "create withdraw link")
            .await
            .map_err(Failure::into_inner)?;
        let link: WithdrawLinkJson = Self::parse(resp, "create withdraw link")
            .await
            .map_err(Failure::into_inner)?;
        let record = link.into_record()?;

        info!("Created withdraw link: {}", record.id);
        Ok(record)
    }

    async fn delete_claim(&self, id: &str) -> Result<(), Error> {
        debug!("Deleting withdraw link: {id}");
        self.send(Method::DELETE, &format!("{LINKS_PATH}/{id}"), None, "delete withdraw link")
            .await
            .map_err(Failure::into_inner)?;
        info!("Deleted withdraw link: {id}");
        Ok(())
    }

    async fn get_claim(&self, id: &str) -> Result<ClaimRecord, Error> {
        let link: WithdrawLinkJson = self
            .get_json(&format!("{LINKS_PATH}/{id}"), "get withdraw link")
            .await?;
        link.into_record()
    }

    async fn list_claims(&self, limit: usize) -> Result<Vec<ClaimRecord>, Error> {
        let list: LinkListJson = self
            .get_json(&format!("{LINKS_PATH}?limit={limit}"), "list withdraw links")
            .await?;
        let links = match list {
            LinkListJson::Bare(v) => v,
            LinkListJson::Paged { data, .. } => data,
        };

        let records = links
            .into_iter()
            .take(limit)
            .map(WithdrawLinkJson::into_record)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Retrieved {} withdraw link(s)", records.len());
        Ok(records)
    }

    async fn get_wallet_balance(&self) -> Result<u64, Error> {
        let info = self.get_wallet_info().await?;
        debug!("Wallet balance: {} msat", info.balance_msat);
        Ok(info.balance_msat)
    }

    async fn get_wallet_info(&self) -> Result<WalletInfo, Error> {
        let wallet: WalletJson = self.get_json(WALLET_PATH, "get wallet").await?;
        Ok(WalletInfo {
            id: wallet.id,
            name: wallet.name,
            balance_msat: wallet.balance,
        })
    }
}
