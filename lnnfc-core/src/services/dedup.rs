// File: lnnfc-core/src/services/dedup.rs
//
// Decides whether a tag detection is a fresh interaction or the same tag
// still lying on the reader. No I/O and no clock: callers pass `now`.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use lnnfc_common::models::tag::TagId;

const MIN_PRUNE_HORIZON: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    pub tag_id: TagId,
    pub last_seen_at: DateTime<Utc>,
    /// `None` until a detection of this tag completes processing.
    pub last_processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    New,
    /// Processed less than one cooldown ago.
    Duplicate { remaining: Duration },
}

#[derive(Debug, Clone)]
pub struct DedupTracker {
    cooldown: Duration,
    entries: HashMap<TagId, DedupEntry>,
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    // a clock stepping backwards counts as no time passed
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

impl DedupTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, entries: HashMap::new() }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Entries unseen for longer than this are dropped.
    pub fn prune_horizon(&self) -> Duration {
        (self.cooldown * 10).max(MIN_PRUNE_HORIZON)
    }

    /// Records a detection and classifies it. Does not mark it processed.
    pub fn observe(&mut self, tag_id: &TagId, now: DateTime<Utc>) -> DedupDecision {
        let entry = self
            .entries
            .entry(tag_id.clone())
            .or_insert_with(|| DedupEntry {
                tag_id: tag_id.clone(),
                last_seen_at: now,
                last_processed_at: None,
            });
        entry.last_seen_at = now;

        match entry.last_processed_at {
            Some(at) => {
                let since = elapsed(at, now);
                if since < self.cooldown {
                    DedupDecision::Duplicate { remaining: self.cooldown - since }
                } else {
                    DedupDecision::New
                }
            }
            None => DedupDecision::New,
        }
    }

    pub fn mark_processed(&mut self, tag_id: &TagId, now: DateTime<Utc>) {
        let entry = self
            .entries
            .entry(tag_id.clone())
            .or_insert_with(|| DedupEntry {
                tag_id: tag_id.clone(),
                last_seen_at: now,
                last_processed_at: None,
            });
        entry.last_processed_at = Some(now);
    }

    pub fn is_suppressed(&self, tag_id: &TagId, now: DateTime<Utc>) -> bool {
        self.entries
            .get(tag_id)
            .and_then(|e| e.last_processed_at)
            .is_some_and(|at| elapsed(at, now) < self.cooldown)
    }

    /// Drops stale entries and returns how many went.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let horizon = self.prune_horizon();
        let before = self.entries.len();
        self.entries.retain(|_, e| elapsed(e.last_seen_at, now) <= horizon);
        before - self.entries.len()
    }

    pub fn reset(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn get(&self, tag_id: &TagId) -> Option<&DedupEntry> {
        self.entries.get(tag_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
