// File: lnnfc-common/src/models/mod.rs
pub mod claim;
pub mod tag;
pub mod provisioning;

pub use claim::{ClaimRecord, CreateClaimRequest, WalletInfo, MSAT_PER_SAT};
pub use tag::{TagId, TagPresentation};
pub use provisioning::LoadStage;
