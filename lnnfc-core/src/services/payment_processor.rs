// File: lnnfc-core/src/services/payment_processor.rs
//
// Unattended redemption side: poll the reader, skip repeat reads of a tag
// still in the field, decode the rest and hand the result to the observer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use lnnfc_common::error::{Error, TransportError};
use lnnfc_common::models::tag::{TagId, TagPresentation};
use lnnfc_common::traits::{Clock, SharedTransport, SystemClock};

use crate::codec::TagCodec;
use crate::eventbus::{PaymentObserver, ProcessorEvent, TagFailure, TagProcessed};
use crate::services::dedup::{DedupDecision, DedupTracker};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorConfig {
    /// Longest single wait for a tag; also the back-off after a fault.
    pub poll_interval: Duration,
    /// Minimum spacing between two processed detections of one tag.
    pub cooldown: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            cooldown: Duration::from_secs(2),
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.poll_interval.is_zero() {
            return Err(Error::Validation("poll interval must be positive".into()));
        }
        Ok(())
    }
}

/// Result of a single `poll_once`.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Idle,
    Suppressed(TagId),
    /// Waiting for a tag failed; nothing was emitted.
    Fault(TransportError),
    Event(ProcessorEvent),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorStats {
    pub cycles: u64,
    pub detections: u64,
    pub processed: u64,
    pub suppressed: u64,
    pub failures: u64,
    pub faults: u64,
    pub tracked_tags: usize,
    pub started_at: Option<DateTime<Utc>>,
}

fn shutdown_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

pub struct PaymentProcessor {
    transport: SharedTransport,
    observer: Arc<dyn PaymentObserver>,
    codec: TagCodec,
    config: ProcessorConfig,
    dedup: DedupTracker,
    clock: Arc<dyn Clock>,
    stats: ProcessorStats,
}

impl PaymentProcessor {
    pub fn new(
        transport: SharedTransport,
        observer: Arc<dyn PaymentObserver>,
        config: ProcessorConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        info!(
            "PaymentProcessor initialized (poll interval {:?}, cooldown {:?})",
            config.poll_interval, config.cooldown
        );
        Ok(Self {
            transport,
            observer,
            codec: TagCodec::new(),
            dedup: DedupTracker::new(config.cooldown),
            config,
            clock: Arc::new(SystemClock),
            stats: ProcessorStats::default(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// One poll cycle. Never fails: faults are reported in the outcome.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        self.stats.cycles += 1;
        let pruned = self.dedup.prune(self.clock.now());
        if pruned > 0 {
            debug!("Pruned {pruned} stale dedup entries");
        }

        let mut transport = self.transport.lock().await;
        let TagPresentation { tag_id, detected_at: now } = match transport.wait_for_tag(self.config.poll_interval).await {
            Ok(Some(id)) => TagPresentation { tag_id: id, detected_at: self.clock.now() },
            Ok(None) => return CycleOutcome::Idle,
            Err(e) => {
                self.stats.faults += 1;
                warn!("Reader fault while polling: {e}");
                return CycleOutcome::Fault(e);
            }
        };
        self.stats.detections += 1;
        if let DedupDecision::Duplicate { remaining } = self.dedup.observe(&tag_id, now) {
            self.stats.suppressed += 1;
            debug!("Tag {tag_id} still cooling down ({remaining:?} left); skipped");
            return CycleOutcome::Suppressed(tag_id);
        }

        info!("Processing tag: {tag_id}");
        let read = transport.read_message().await;
        drop(transport);

        let event = match self.interpret(&tag_id, read, now) {
            Ok(processed) => {
                self.dedup.mark_processed(&tag_id, now);
                self.stats.processed += 1;
                ProcessorEvent::Processed(processed)
            }
            Err(e) => {
                self.stats.failures += 1;
                error!("Failed to process tag {tag_id}: {e}");
                ProcessorEvent::Failed(TagFailure {
                    tag_id: tag_id.clone(),
                    error: e.to_string(),
                    timestamp: now,
                })
            }
        };

        self.observer.on_event(&event).await;
        CycleOutcome::Event(event)
    }

    fn interpret(
        &self,
        tag_id: &TagId,
        read: Result<Option<Vec<u8>>, TransportError>,
        now: DateTime<Utc>,
    ) -> Result<TagProcessed, Error> {
        let bytes = read.map_err(|e| Error::TagRead(e.to_string()))?;
        let claim = match bytes {
            Some(b) => self.codec.decode_bytes(&b)?,
            None => None,
        };

        let (reference, url, encoding, is_valid) = match claim {
            Some(c) => {
                let valid = self.codec.validate(&c.url).is_valid;
                if !valid {
                    warn!("Invalid LNURL on tag {tag_id}");
                }
                (Some(c.lnurl), Some(c.url), Some(c.encoding), valid)
            }
            None => {
                warn!("No LNURL found on tag {tag_id}");
                (None, None, None, false)
            }
        };

        Ok(TagProcessed {
            tag_id: tag_id.clone(),
            redemption_reference: reference,
            url,
            encoding,
            is_valid,
            timestamp: now,
        })
    }

    /// Connects, polls until `shutdown` turns true, then disconnects.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), Error> {
        self.transport.lock().await.connect().await?;
        self.stats.started_at = Some(self.clock.now());
        info!("Starting payment processor daemon...");

        while !shutdown_requested(&shutdown) {
            // a tag resting on the reader is reported again at once; pace those cycles
            let pause = match self.poll_once().await {
                CycleOutcome::Fault(_) | CycleOutcome::Suppressed(_) => true,
                CycleOutcome::Idle | CycleOutcome::Event(_) => false,
            };
            if pause {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = self.transport.lock().await.disconnect().await {
            warn!("Reader disconnect failed: {e}");
        }
        info!(
            "Payment processor stopped after {} cycle(s): {} processed, {} suppressed, {} failed",
            self.stats.cycles, self.stats.processed, self.stats.suppressed, self.stats.failures
        );
        Ok(())
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            tracked_tags: self.dedup.len(),
            ..self.stats.clone()
        }
    }

    /// Forgets every tracked tag; returns how many there were.
    pub fn reset_dedup(&mut self) -> usize {
        let n = self.dedup.reset();
        info!("Reset rate limits for {n} tag(s)");
        n
    }

    pub fn is_suppressed(&self, tag_id: &TagId) -> bool {
        self.dedup.is_suppressed(tag_id, self.clock.now())
    }
}
