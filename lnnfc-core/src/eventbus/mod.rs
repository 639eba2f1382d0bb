//! src/eventbus/mod.rs
//!
//! Delivery of payment-processor events to a single sink. The channel
//! observer uses a bounded MPSC queue, so a slow consumer applies
//! backpressure to the poll loop instead of losing events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use lnnfc_common::models::tag::TagId;

use crate::codec::ReferenceEncoding;

/// A new (non-duplicate) detection that was read and decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagProcessed {
    pub tag_id: TagId,
    /// Uppercase bech32 LNURL, `None` when the tag holds no claim.
    pub redemption_reference: Option<String>,
    /// Decoded URL of the same claim.
    pub url: Option<String>,
    pub encoding: Option<ReferenceEncoding>,
    pub is_valid: bool,
    pub timestamp: DateTime<Utc>,
}

/// A new detection whose read or decode failed. The tag is retried on the
/// next cycle it is seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFailure {
    pub tag_id: TagId,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessorEvent {
    Processed(TagProcessed),
    Failed(TagFailure),
}

impl ProcessorEvent {
    pub fn tag_id(&self) -> &TagId {
        match self {
            ProcessorEvent::Processed(p) => &p.tag_id,
            ProcessorEvent::Failed(f) => &f.tag_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ProcessorEvent::Processed(p) => p.timestamp,
            ProcessorEvent::Failed(f) => f.timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ProcessorEvent::Processed(_) => "tag.processed",
            ProcessorEvent::Failed(_) => "tag.failed",
        }
    }
}

/// Sink for processor events. Called inline from the poll loop.
#[async_trait]
pub trait PaymentObserver: Send + Sync {
    async fn on_event(&self, event: &ProcessorEvent);
}

/// Forwards events into a bounded channel.
#[derive(Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<ProcessorEvent>,
}

/// Default queue depth for `ChannelObserver::channel`.
const DEFAULT_BUFFER_SIZE: usize = 256;

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<ProcessorEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(buffer_size: Option<usize>) -> (Self, mpsc::Receiver<ProcessorEvent>) {
        let (tx, rx) = mpsc::channel(buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PaymentObserver for ChannelObserver {
    async fn on_event(&self, event: &ProcessorEvent) {
        if self.tx.send(event.clone()).await.is_err() {
            warn!("Event receiver dropped; discarding {} for tag {}", event.event_type(), event.tag_id());
        }
    }
}

/// Writes each event to the log; the daemon's default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

#[async_trait]
impl PaymentObserver for LoggingObserver {
    async fn on_event(&self, event: &ProcessorEvent) {
        match event {
            ProcessorEvent::Processed(p) => match &p.url {
                Some(url) if p.is_valid => info!("Payment tag {} presented: {}", p.tag_id, url),
                Some(url) => warn!("Tag {} holds a non-withdraw reference: {}", p.tag_id, url),
                None => warn!("Tag {} holds no claim", p.tag_id),
            },
            ProcessorEvent::Failed(f) => warn!("Tag {} could not be processed: {}", f.tag_id, f.error),
        }
    }
}
