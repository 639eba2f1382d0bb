// tests/test_utils/mod.rs
pub mod fake_lnbits;
