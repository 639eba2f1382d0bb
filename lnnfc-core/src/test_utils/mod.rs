// File: lnnfc-core/src/test_utils/mod.rs
//
// Deterministic stand-ins for the clock and the payment service, shared by
// unit and integration tests.

pub mod helpers;

pub use helpers::{InMemoryClaimService, ManualClock};
