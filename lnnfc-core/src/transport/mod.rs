// File: lnnfc-core/src/transport/mod.rs

pub mod memory;

use tracing::info;

use lnnfc_common::error::Error;
use lnnfc_common::models::tag::TagId;
use lnnfc_common::traits::{shared, SharedTransport};

pub use memory::{MemoryTag, MemoryTransport, TransportOp};

/// UID of the tag the simulator keeps on its reader.
pub const SIMULATOR_TAG_UID: [u8; 7] = [0x04, 0xA2, 0x3B, 0xC1, 0x5D, 0x80, 0x00];

/// Builds the transport named by `NFC_TRANSPORT`.
///
/// Only the simulator ships in this workspace; hardware drivers implement
/// `TagTransport` in their own crates and are handed to the services directly.
pub fn open_transport(kind: &str) -> Result<SharedTransport, Error> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "simulator" | "memory" => {
            let sim = MemoryTransport::new().with_realtime(true);
            sim.place(TagId::new(SIMULATOR_TAG_UID.to_vec()));
            info!("Using simulated NFC reader");
            Ok(shared(sim))
        }
        other => Err(Error::Config(format!(
            "NFC transport '{other}' is not built into this binary (available: simulator)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_transport_is_a_config_error() {
        assert!(open_transport("Simulator").is_ok());
        assert!(matches!(open_transport("pn532-spi"), Err(Error::Config(_))));
    }
}
