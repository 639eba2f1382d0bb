// File: src/services/mod.rs

pub mod dedup;
pub mod payment_processor;
pub mod tag_loader;

pub use dedup::{DedupDecision, DedupEntry, DedupTracker};
pub use payment_processor::{CycleOutcome, PaymentProcessor, ProcessorConfig, ProcessorStats};
pub use tag_loader::{
    ClearedTag, LoadTagRequest, LoadedTag, TagInfo, TagLoader, TagReadout, TagVerification,
};
