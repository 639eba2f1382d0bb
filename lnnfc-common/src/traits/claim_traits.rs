// File: lnnfc-common/src/traits/claim_traits.rs

use async_trait::async_trait;

use crate::error::Error;
use crate::models::claim::{ClaimRecord, CreateClaimRequest, WalletInfo};

/// Remote store of withdrawal claim records.
///
/// Implementations talk to the payment service on every call and never
/// cache. `delete_claim` is attempted exactly once by callers; any retry
/// policy belongs to the caller, not the implementation.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait ClaimService: Send + Sync {
    async fn create_claim(&self, request: &CreateClaimRequest) -> Result<ClaimRecord, Error>;
    async fn delete_claim(&self, id: &str) -> Result<(), Error>;
    async fn get_claim(&self, id: &str) -> Result<ClaimRecord, Error>;
    /// Claims in service order, for display.
    async fn list_claims(&self, limit: usize) -> Result<Vec<ClaimRecord>, Error>;
    async fn get_wallet_balance(&self) -> Result<u64, Error>;
    async fn get_wallet_info(&self) -> Result<WalletInfo, Error>;
}
