// File: lnnfc-core/src/test_utils/helpers.rs

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use lnnfc_common::error::Error;
use lnnfc_common::models::claim::{ClaimRecord, CreateClaimRequest, WalletInfo};
use lnnfc_common::traits::{ClaimService, Clock};

use crate::codec::lnurl;

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_millis(0)
    }
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// `ms` after a fixed epoch, handy for scripting timelines.
    pub fn at_millis(ms: i64) -> Self {
        let start = Utc
            .timestamp_millis_opt(1_700_000_000_000 + ms)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }

    fn lock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    links: BTreeMap<String, ClaimRecord>,
    next_id: u64,
    balance_msat: u64,
    create_calls: usize,
    delete_calls: usize,
    fail_create: Option<u16>,
    fail_delete: Option<u16>,
}

/// Payment service fake that keeps links in memory.
#[derive(Debug)]
pub struct InMemoryClaimService {
    base_url: String,
    state: Mutex<ServiceState>,
}

impl Default for InMemoryClaimService {
    fn default() -> Self {
        Self::new("https://lnbits.test")
    }
}

impl InMemoryClaimService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            state: Mutex::new(ServiceState {
                balance_msat: 1_000_000_000,
                ..ServiceState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every following create answers with this HTTP status.
    pub fn fail_creates(&self, status: Option<u16>) {
        self.state().fail_create = status;
    }

    /// Every following delete answers with this HTTP status.
    pub fn fail_deletes(&self, status: Option<u16>) {
        self.state().fail_delete = status;
    }

    pub fn set_balance_msat(&self, balance_msat: u64) {
        self.state().balance_msat = balance_msat;
    }

    /// Marks one use of a link as redeemed.
    pub fn redeem(&self, id: &str) {
        if let Some(link) = self.state().links.get_mut(id) {
            link.used_count = (link.used_count + 1).min(link.max_uses);
        }
    }

    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.state().delete_calls
    }

    pub fn link_ids(&self) -> Vec<String> {
        self.state().links.keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state().links.contains_key(id)
    }

    /// The plain URL a wallet would resolve for link `id`.
    pub fn link_url(&self, id: &str) -> String {
        format!("{}/withdraw/api/v1/lnurl/{id}", self.base_url)
    }
}

#[async_trait]
impl ClaimService for InMemoryClaimService {
    async fn create_claim(&self, request: &CreateClaimRequest) -> Result<ClaimRecord, Error> {
        request.validate()?;
        let mut state = self.state();
        state.create_calls += 1;
        if let Some(status) = state.fail_create {
            return Err(Error::remote_status(status, "create withdraw link refused"));
        }

        state.next_id += 1;
        let id = format!("link{:04}", state.next_id);
        let reference = lnurl::to_lnurl(&self.link_url(&id))?;
        let record = ClaimRecord {
            id: id.clone(),
            redemption_reference: reference,
            amount_msat: request.amount_msat,
            max_uses: request.max_uses,
            used_count: 0,
            title: request.title.clone(),
            created_at: Some(Utc::now()),
        };
        state.links.insert(id, record.clone());
        Ok(record)
    }

    async fn delete_claim(&self, id: &str) -> Result<(), Error> {
        let mut state = self.state();
        state.delete_calls += 1;
        if let Some(status) = state.fail_delete {
            return Err(Error::remote_status(status, "delete withdraw link refused"));
        }
        match state.links.remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::remote_status(404, format!("withdraw link {id} does not exist"))),
        }
    }

    async fn get_claim(&self, id: &str) -> Result<ClaimRecord, Error> {
        self.state()
            .links
            .get(id)
            .cloned()
            .ok_or_else(|| Error::remote_status(404, format!("withdraw link {id} does not exist")))
    }

    async fn list_claims(&self, limit: usize) -> Result<Vec<ClaimRecord>, Error> {
        Ok(self.state().links.values().take(limit).cloned().collect())
    }

    async fn get_wallet_balance(&self) -> Result<u64, Error> {
        Ok(self.state().balance_msat)
    }

    async fn get_wallet_info(&self) -> Result<WalletInfo, Error> {
        Ok(WalletInfo {
            id: Some("wallet0001".into()),
            name: "In-memory wallet".into(),
            balance_msat: self.state().balance_msat,
        })
    }
}
