// src/lib.rs

pub mod codec;
pub mod config;
pub mod eventbus;
pub mod lnbits;
pub mod services;
pub mod transport;
pub mod test_utils;

pub use config::AppConfig;
pub use lnbits::LnbitsClient;
pub use lnnfc_common::error::Error;
