// File: lnnfc-common/src/models/claim.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const MSAT_PER_SAT: u64 = 1_000;

/// A withdrawal allowance held by the payment service.
///
/// This is a snapshot of remote state. Fetch it again rather than
/// keeping it around; the service is the only source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub id: String,
    /// LNURL-withdraw string a wallet uses to redeem the claim.
    pub redemption_reference: String,
    pub amount_msat: u64,
    pub max_uses: u32,
    pub used_count: u32,
    pub title: String,
    /// Older service versions do not report a creation time.
    pub created_at: Option<DateTime<Utc>>,
}

impl ClaimRecord {
    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.used_count)
    }

    pub fn is_spent(&self) -> bool {
        self.used_count >= self.max_uses
    }
}

/// Parameters for a new withdraw link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClaimRequest {
    pub amount_msat: u64,
    pub max_uses: u32,
    pub title: String,
    /// Seconds a wallet must wait between two uses of the same link.
    pub wait_time_secs: u32,
    pub webhook_url: Option<String>,
}

impl CreateClaimRequest {
    pub fn new(amount_msat: u64, max_uses: u32, title: impl Into<String>) -> Self {
        Self {
            amount_msat,
            max_uses,
            title: title.into(),
            wait_time_secs: 1,
            webhook_url: None,
        }
    }

    /// Checks everything the service would reject, before any request is made.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_uses < 1 {
            return Err(Error::Validation("max_uses must be at least 1".into()));
        }
        if self.amount_msat == 0 {
            return Err(Error::Validation("amount must be positive".into()));
        }
        if self.amount_msat % MSAT_PER_SAT != 0 {
            return Err(Error::Validation(format!(
                "amount {} msat is not a whole number of sats",
                self.amount_msat
            )));
        }
        if self.title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".into()));
        }
        Ok(())
    }

    pub fn amount_sat(&self) -> u64 {
        self.amount_msat / MSAT_PER_SAT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub id: Option<String>,
    pub name: String,
    pub balance_msat: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_validation_rejects_bad_input() {
        assert!(CreateClaimRequest::new(1_000_000, 1, "Gift").validate().is_ok());

        let zero_uses = CreateClaimRequest::new(1_000, 0, "Gift");
        assert!(matches!(zero_uses.validate(), Err(Error::Validation(_))));

        let zero_amount = CreateClaimRequest::new(0, 1, "Gift");
        assert!(matches!(zero_amount.validate(), Err(Error::Validation(_))));

        let fractional = CreateClaimRequest::new(1_500, 1, "Gift");
        assert!(matches!(fractional.validate(), Err(Error::Validation(_))));

        let untitled = CreateClaimRequest::new(1_000, 1, "  ");
        assert!(matches!(untitled.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn remaining_uses_never_underflows() {
        let claim = ClaimRecord {
            id: "x".into(),
            redemption_reference: "LNURL1".into(),
            amount_msat: 1_000,
            max_uses: 2,
            used_count: 2,
            title: "t".into(),
            created_at: None,
        };
        assert_eq!(claim.remaining_uses(), 0);
        assert!(claim.is_spent());
    }
}
