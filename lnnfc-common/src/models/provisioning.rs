// File: lnnfc-common/src/models/provisioning.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress of one tag-loading run. Every failure after `ClaimCreated`
/// deletes the claim before it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadStage {
    Start,
    ClaimCreated,
    TagDetected,
    Written,
    Verified,
}

impl LoadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStage::Start => "start",
            LoadStage::ClaimCreated => "claim_created",
            LoadStage::TagDetected => "tag_detected",
            LoadStage::Written => "written",
            LoadStage::Verified => "verified",
        }
    }

    /// Whether a failure from this stage leaves a claim to roll back.
    pub fn holds_claim(&self) -> bool {
        matches!(self, LoadStage::ClaimCreated | LoadStage::TagDetected | LoadStage::Written)
    }
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
