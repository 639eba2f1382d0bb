// File: lnnfc-core/src/services/tag_loader.rs
//
// Operator-side tag workflows. `load_tag` creates a claim, writes it and
// reads it back; any failure after the claim exists deletes it again.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use lnnfc_common::error::Error;
use lnnfc_common::models::claim::CreateClaimRequest;
use lnnfc_common::models::provisioning::LoadStage;
use lnnfc_common::models::tag::TagId;
use lnnfc_common::traits::{ClaimService, SharedTransport, TagTransport};

use crate::codec::{lnurl, DecodedClaim, MessageInfo, ReferenceEncoding, ReferenceValidation, TagCodec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTagRequest {
    pub amount_msat: u64,
    pub uses: u32,
    pub title: String,
    /// Hard deadline for a tag to appear.
    pub timeout: Duration,
    pub wait_time_secs: u32,
    pub webhook_url: Option<String>,
    /// Write `lightning:LNURL1...` instead of the plain URL.
    pub use_alt_encoding: bool,
}

impl LoadTagRequest {
    pub fn new(amount_msat: u64, uses: u32, title: impl Into<String>) -> Self {
        Self {
            amount_msat,
            uses,
            title: title.into(),
            timeout: Duration::from_secs(30),
            wait_time_secs: 1,
            webhook_url: None,
            use_alt_encoding: true,
        }
    }

    fn claim_request(&self) -> CreateClaimRequest {
        CreateClaimRequest {
            amount_msat: self.amount_msat,
            max_uses: self.uses,
            title: self.title.clone(),
            wait_time_secs: self.wait_time_secs,
            webhook_url: self.webhook_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedTag {
    pub tag_id: TagId,
    pub claim_id: String,
    /// Uppercase bech32 LNURL, as the payment service issues it.
    pub redemption_reference: String,
    pub url: String,
    pub encoding: ReferenceEncoding,
    pub amount_msat: u64,
    pub uses: u32,
    pub title: String,
    pub bytes_written: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagReadout {
    pub tag_id: TagId,
    /// Same form as `LoadedTag::redemption_reference`, whatever the encoding.
    pub redemption_reference: Option<String>,
    pub url: Option<String>,
    pub encoding: Option<ReferenceEncoding>,
    pub is_valid: bool,
    pub validation: Option<ReferenceValidation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearedTag {
    pub tag_id: TagId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    pub tag_id: TagId,
    pub uid_length: usize,
    pub message: MessageInfo,
    pub claim: Option<DecodedClaim>,
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagVerification {
    pub claim_id: String,
    pub tag_id: TagId,
    pub expected: String,
    pub found: Option<String>,
    pub verified: bool,
}

pub struct TagLoader {
    claims: Arc<dyn ClaimService>,
    transport: SharedTransport,
    codec: TagCodec,
}

fn check_timeout(timeout: Duration) -> Result<(), Error> {
    if timeout.is_zero() {
        return Err(Error::Validation("timeout must be positive".into()));
    }
    Ok(())
}

/// Waits for a tag; a driver fault here counts as a failed read.
async fn detect(transport: &mut dyn TagTransport, timeout: Duration) -> Result<TagId, Error> {
    info!("Waiting for NFC tag (timeout: {:.1}s)...", timeout.as_secs_f64());
    match transport.wait_for_tag(timeout).await {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(Error::TagTimeout(timeout)),
        Err(e) => Err(Error::TagRead(e.to_string())),
    }
}

async fn read_image(transport: &mut dyn TagTransport) -> Result<Vec<u8>, Error> {
    transport
        .read_message()
        .await
        .map(Option::unwrap_or_default)
        .map_err(|e| Error::TagRead(e.to_string()))
}

impl TagLoader {
    pub fn new(claims: Arc<dyn ClaimService>, transport: SharedTransport) -> Self {
        info!("TagLoader initialized");
        Self {
            claims,
            transport,
            codec: TagCodec::new(),
        }
    }

    pub fn codec(&self) -> &TagCodec {
        &self.codec
    }

    /// Provisions one tag with a fresh claim.
    pub async fn load_tag(&self, request: &LoadTagRequest) -> Result<LoadedTag, Error> {
        if request.amount_msat == 0 {
            return Err(Error::Validation("amount must be positive".into()));
        }
        if request.uses < 1 {
            return Err(Error::Validation("uses must be at least 1".into()));
        }
        check_timeout(request.timeout)?;
        let mut stage = LoadStage::Start;
        let claim_request = request.claim_request();
        claim_request.validate()?;

        info!(
            "Loading tag with {} sats ({} use(s))...",
            claim_request.amount_sat(),
            request.uses
        );
        debug!("Stage {stage}: creating claim");
        let claim = self.claims.create_claim(&claim_request).await?;
        stage = LoadStage::ClaimCreated;
        debug!("Stage {stage}: claim {}", claim.id);

        let encoded = lnurl::to_url(&claim.redemption_reference).and_then(|url| {
            let reference = lnurl::to_lnurl(&url)?;
            let bytes = self
                .codec
                .encode(&url, request.use_alt_encoding)?
                .to_bytes()?;
            Ok((url, reference, bytes))
        });
        let (expected_url, reference, image) = match encoded {
            Ok(v) => v,
            Err(e) => return Err(self.rollback(&claim.id, stage, e).await),
        };

        let mut transport = self.transport.lock().await;
        let outcome = async {
            let tag_id = detect(&mut *transport, request.timeout).await?;
            stage = LoadStage::TagDetected;
            info!("Writing LNURL to tag (UID: {tag_id})...");

            match transport.write_message(&image).await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(Error::TagWrite(format!(
                        "tag {tag_id} rejected {} bytes (write-protected or too small)",
                        image.len()
                    )));
                }
                Err(e) => return Err(Error::TagWrite(e.to_string())),
            }
            stage = LoadStage::Written;

            let found = match transport.read_message().await {
                Ok(Some(bytes)) => match self.codec.decode_bytes(&bytes) {
                    Ok(claim) => claim,
                    Err(e) => {
                        warn!("Read-back of tag {tag_id} is unparsable: {e}");
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    warn!("Read-back of tag {tag_id} failed: {e}");
                    None
                }
            };
            if !found.as_ref().is_some_and(|c| c.matches(&expected_url)) {
                warn!("Tag verification failed - LNURL mismatch");
                return Err(Error::Verification {
                    expected: expected_url.clone(),
                    found: found.map(|c| c.url),
                });
            }
            Ok::<TagId, Error>(tag_id)
        }
        .await;
        drop(transport);

        let tag_id = match outcome {
            Ok(id) => id,
            Err(e) => return Err(self.rollback(&claim.id, stage, e).await),
        };
        stage = LoadStage::Verified;
        debug!("Stage {stage}: tag {tag_id}");
        info!("Successfully loaded tag {tag_id} with {} sats", claim_request.amount_sat());

        Ok(LoadedTag {
            tag_id,
            claim_id: claim.id,
            redemption_reference: reference,
            url: expected_url,
            encoding: if request.use_alt_encoding { ReferenceEncoding::Lnurl } else { ReferenceEncoding::Plain },
            amount_msat: claim.amount_msat,
            uses: claim.max_uses,
            title: claim.title,
            bytes_written: image.len(),
        })
    }

    /// Deletes the claim once. Returns the error the caller should surface.
    async fn rollback(&self, claim_id: &str, stage: LoadStage, cause: Error) -> Error {
        if !stage.holds_claim() {
            return cause;
        }
        warn!("Rolling back claim {claim_id} after failure at stage {stage}: {cause}");
        match self.claims.delete_claim(claim_id).await {
            Ok(()) => {
                info!("Rolled back claim {claim_id}");
                cause
            }
            Err(cleanup) => {
                error!("Failed to clean up claim {claim_id}: {cleanup}; manual cleanup required");
                Error::RollbackFailed {
                    claim_id: claim_id.to_string(),
                    stage,
                    cause: Box::new(cause),
                    cleanup: Box::new(cleanup),
                }
            }
        }
    }

    pub async fn read_tag(&self, timeout: Duration) -> Result<TagReadout, Error> {
        check_timeout(timeout)?;
        let mut transport = self.transport.lock().await;
        let tag_id = detect(&mut *transport, timeout).await?;
        info!("Reading tag (UID: {tag_id})...");
        let image = read_image(&mut *transport).await?;
        drop(transport);

        let Some(claim) = self.codec.decode_bytes(&image)? else {
            warn!("No LNURL found on tag {tag_id}");
            return Ok(TagReadout {
                tag_id,
                redemption_reference: None,
                url: None,
                encoding: None,
                is_valid: false,
                validation: None,
            });
        };

        let validation = self.codec.validate(&claim.url);
        info!("Successfully read LNURL from tag {tag_id}");
        Ok(TagReadout {
            tag_id,
            is_valid: validation.is_valid,
            redemption_reference: Some(claim.lnurl),
            url: Some(claim.url),
            encoding: Some(claim.encoding),
            validation: Some(validation),
        })
    }

    /// Leaves an empty message on the tag. Claims on the service are untouched.
    pub async fn clear_tag(&self, timeout: Duration) -> Result<ClearedTag, Error> {
        check_timeout(timeout)?;
        let mut transport = self.transport.lock().await;
        let tag_id = detect(&mut *transport, timeout).await?;
        info!("Clearing tag (UID: {tag_id})...");

        match transport.clear().await {
            Ok(true) => {
                info!("Successfully cleared tag {tag_id}");
                Ok(ClearedTag { tag_id })
            }
            Ok(false) => Err(Error::TagWrite(format!("tag {tag_id} refused to be cleared"))),
            Err(e) => Err(Error::TagWrite(e.to_string())),
        }
    }

    pub async fn tag_info(&self, timeout: Duration) -> Result<TagInfo, Error> {
        check_timeout(timeout)?;
        let mut transport = self.transport.lock().await;
        let tag_id = detect(&mut *transport, timeout).await?;
        let image = read_image(&mut *transport).await?;
        drop(transport);

        let message = self.codec.describe(&image);
        let claim = self.codec.decode_bytes(&image).ok().flatten();
        let is_valid = claim.as_ref().is_some_and(|c| self.codec.validate(&c.url).is_valid);
        info!("Retrieved info for tag {tag_id}");

        Ok(TagInfo {
            uid_length: tag_id.len(),
            tag_id,
            message,
            claim,
            is_valid,
        })
    }

    /// Compares a tag against the claim the service holds for `claim_id`.
    pub async fn verify_tag(&self, claim_id: &str, timeout: Duration) -> Result<TagVerification, Error> {
        check_timeout(timeout)?;
        info!("Verifying tag for link {claim_id}...");
        let claim = self.claims.get_claim(claim_id).await?;
        let expected = lnurl::to_url(&claim.redemption_reference)?;

        let mut transport = self.transport.lock().await;
        let tag_id = detect(&mut *transport, timeout).await?;
        let image = read_image(&mut *transport).await?;
        drop(transport);

        let decoded = self.codec.decode_bytes(&image)?;
        let verified = decoded.as_ref().is_some_and(|c| c.matches(&expected));
        let found = decoded.map(|c| c.url);
        if verified {
            info!("Tag verification successful for link {claim_id}");
        } else {
            warn!("Tag verification failed - LNURL mismatch");
        }

        Ok(TagVerification {
            claim_id: claim.id,
            tag_id,
            expected,
            found,
            verified,
        })
    }
}
